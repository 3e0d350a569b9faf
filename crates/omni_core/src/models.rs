use async_trait::async_trait;
use std::sync::Arc;
use crate::types::ParseOutput;
use crate::Result;

#[async_trait]
pub trait ScreenParser: Send + Sync {
    fn name(&self) -> &str;

    /// Parse a base64-encoded screenshot into UI elements and an annotated image
    async fn parse(&self, image_base64: &str) -> Result<ParseOutput>;
}

/// Builds the parser handle on first use. Implementations may be slow (model
/// weights, child processes); callers are expected to cache the result.
#[async_trait]
pub trait ParserLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn ScreenParser>>;
}
