use std::sync::Arc;
use omni_core::ParserLoader;
use crate::cache_env::CacheEnv;
use crate::config::SidecarConfig;

pub mod mock;
pub mod omniparser;

pub use mock::MockParser;
pub use omniparser::{OmniParserBackend, OmniParserLauncher};

/// Loader for the real model; nothing is started until `load` is called.
pub fn create_parser_loader(config: &SidecarConfig, cache_env: CacheEnv) -> Arc<dyn ParserLoader> {
    Arc::new(OmniParserLauncher::new(config, cache_env))
}
