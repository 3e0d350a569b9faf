use async_trait::async_trait;
use serde_json::json;
use std::fmt;
use omni_core::{ParseOutput, Result, ScreenParser};

pub const MOCK_MODEL_NAME: &str = "omniparser-mock";

/// Contract double for integration tests: ignores the image and always
/// returns the same two elements.
pub struct MockParser;

impl fmt::Debug for MockParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockParser").finish()
    }
}

#[async_trait]
impl ScreenParser for MockParser {
    fn name(&self) -> &str {
        MOCK_MODEL_NAME
    }

    async fn parse(&self, _image_base64: &str) -> Result<ParseOutput> {
        Ok(ParseOutput {
            som_image_base64: String::new(),
            parsed_content_list: vec![
                json!({"type": "text", "content": "mock text", "score": 0.5}),
                json!({"type": "icon", "content": "mock-icon", "score": 0.2}),
            ],
        })
    }
}
