use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;
use omni_core::Result;

/// Cache directories for the Python model stack, redirected under
/// `<weights_root>/../../cache`. Applied to every Python child process; a
/// variable already set in the sidecar's own environment wins.
#[derive(Debug, Clone, Default)]
pub struct CacheEnv {
    vars: Vec<(&'static str, PathBuf)>,
}

impl CacheEnv {
    /// Creates the cache directories and records the variables. Yields an
    /// empty set when there is no weights root or it has fewer than two ancestors.
    pub fn prepare(weights_root: Option<&Path>) -> Result<Self> {
        let Some(base) = weights_root.and_then(Path::parent).and_then(Path::parent) else {
            return Ok(Self::default());
        };
        let cache_root = base.join("cache");
        let hf = cache_root.join("hf");
        let tmp = cache_root.join("tmp");
        let easyocr = cache_root.join("easyocr");
        let paddlex = cache_root.join("paddlex");
        for dir in [&hf, &tmp, &easyocr, &paddlex] {
            fs::create_dir_all(dir)?;
        }
        debug!("cache root {}", cache_root.display());

        Ok(Self {
            vars: vec![
                ("HF_HOME", hf.clone()),
                ("HUGGINGFACE_HUB_CACHE", hf.clone()),
                ("TRANSFORMERS_CACHE", hf),
                ("TMP", tmp.clone()),
                ("TEMP", tmp),
                ("EASYOCR_HOME", easyocr),
                ("PADDLE_PDX_CACHE_HOME", paddlex),
            ],
        })
    }

    /// Variables that will actually be passed on, i.e. not already set.
    pub fn effective(&self) -> impl Iterator<Item = (&'static str, &Path)> + '_ {
        self.vars
            .iter()
            .filter(|(key, _)| env::var_os(key).is_none())
            .map(|(key, path)| (*key, path.as_path()))
    }

    pub fn apply(&self, command: &mut Command) {
        for (key, path) in self.effective() {
            command.env(key, path);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
