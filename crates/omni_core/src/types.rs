use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::{Error, Result};

/// Result of one screen parse: the annotated image and the detected elements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseOutput {
    pub som_image_base64: String,
    pub parsed_content_list: Vec<Value>,
}

/// Request body accepted by `/parse`. Either key may carry the image.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParseRequest {
    #[serde(default)]
    pub base64_image: Option<Value>,
    #[serde(default)]
    pub image_base64: Option<Value>,
}

impl ParseRequest {
    /// Decodes a request body. An empty body is treated as `{}`; anything
    /// other than a JSON object is rejected.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        if body.is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(Error::InvalidRequest("body must be a JSON object".to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// The first non-empty string image field, `base64_image` taking precedence.
    pub fn image(&self) -> Option<&str> {
        [&self.base64_image, &self.image_base64]
            .into_iter()
            .filter_map(|field| field.as_ref().and_then(Value::as_str))
            .find(|s| !s.is_empty())
    }
}
