pub mod cache_env;
pub mod config;
pub mod models;
pub mod preflight;

pub use cache_env::CacheEnv;
pub use config::{SidecarConfig, SidecarMode};
pub use models::create_parser_loader;
pub use preflight::{run_preflight, Readiness, ReadinessReason};

pub mod prelude {
    pub use super::config::{SidecarConfig, SidecarMode};
    pub use super::models::{create_parser_loader, MockParser};
    pub use super::preflight::{run_preflight, ImportProbe, PythonImportProbe, Readiness};
    pub use omni_core::{Error, ParseOutput, ParserLoader, Result, ScreenParser};
}
