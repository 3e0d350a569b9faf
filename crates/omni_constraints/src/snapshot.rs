use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use omni_core::{Error, Result};

/// Installed-environment snapshot as written by the environment freeze step.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub protected_freeze: Vec<String>,
    #[serde(default)]
    pub torch_version: Option<Value>,
    #[serde(default)]
    pub torchvision_version: Option<Value>,
    #[serde(default)]
    pub torchaudio_version: Option<Value>,
    #[serde(default)]
    pub numpy_version: Option<Value>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let value = read_json(path)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Version recorded for a pinned package. Numbers are accepted as
    /// written; empty strings and other JSON types count as absent.
    pub fn version_of(&self, package: &str) -> Option<String> {
        let version = match package {
            "torch" => self.torch_version.as_ref(),
            "torchvision" => self.torchvision_version.as_ref(),
            "torchaudio" => self.torchaudio_version.as_ref(),
            "numpy" => self.numpy_version.as_ref(),
            _ => None,
        };
        match version? {
            Value::String(v) if !v.is_empty() => Some(v.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Reads a JSON file, tolerating a leading UTF-8 BOM.
pub fn read_json(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    Ok(serde_json::from_str(text)?)
}

/// Package name of a pip freeze line, if the line pins one.
///
/// `name==1.0` and `name @ file:///...` are recognised; anything else
/// (comments, `-e` lines) yields `None`.
pub fn freeze_line_name(line: &str) -> Option<&str> {
    if let Some((name, _)) = line.split_once("==") {
        return Some(name.trim());
    }
    if line.contains(" @") {
        return line.split_once('@').map(|(name, _)| name.trim());
    }
    None
}
