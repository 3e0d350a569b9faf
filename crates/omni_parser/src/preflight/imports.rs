use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;
use tracing::warn;
use omni_core::{Error, Result};
use crate::cache_env::CacheEnv;

pub const REQUIRED_IMPORTS: [&str; 10] = [
    "torch",
    "torchvision",
    "cv2",
    "numpy",
    "PIL",
    "supervision",
    "transformers",
    "ultralytics",
    "easyocr",
    "matplotlib",
];

pub const OPTIONAL_IMPORTS: [&str; 2] = ["paddle", "paddleocr"];

const IMPORT_SCRIPT: &str = r#"
import json, sys
out = {}
for name in sys.argv[1:]:
    try:
        module = __import__(name)
        out[name] = {"ok": True, "version": str(getattr(module, "__version__", ""))}
    except Exception as exc:
        out[name] = {"ok": False, "error": type(exc).__name__}
print(json.dumps(out))
"#;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ImportOutcome {
    pub ok: bool,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub error: String,
}

impl ImportOutcome {
    pub fn available(version: &str) -> Self {
        Self { ok: true, version: version.to_string(), error: String::new() }
    }

    pub fn failed(error: &str) -> Self {
        Self { ok: false, version: String::new(), error: error.to_string() }
    }
}

#[async_trait]
pub trait ImportProbe: Send + Sync {
    /// Try to import each module in the model's environment
    async fn probe(&self, modules: &[&str]) -> Result<BTreeMap<String, ImportOutcome>>;
}

/// Imports modules by running the configured interpreter once.
#[derive(Debug, Clone)]
pub struct PythonImportProbe {
    python: String,
    cache_env: CacheEnv,
}

impl PythonImportProbe {
    pub fn new(python: impl Into<String>, cache_env: CacheEnv) -> Self {
        Self { python: python.into(), cache_env }
    }
}

#[async_trait]
impl ImportProbe for PythonImportProbe {
    async fn probe(&self, modules: &[&str]) -> Result<BTreeMap<String, ImportOutcome>> {
        let mut command = Command::new(&self.python);
        command
            .arg("-c")
            .arg(IMPORT_SCRIPT)
            .args(modules)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        self.cache_env.apply(&mut command);

        let output = command
            .output()
            .await
            .map_err(|e| Error::Import(format!("cannot run {}: {}", self.python, e)))?;
        if !output.status.success() {
            return Err(Error::Import(format!(
                "{} exited with {}: {}",
                self.python,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // Heavy imports may print banners; the report is the last line.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let report = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| Error::Import("import probe printed nothing".to_string()))?;
        Ok(serde_json::from_str(report)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// `<module>:<ErrorType>` for each required module that failed
    pub missing: Vec<String>,
    pub optional_missing: Vec<String>,
    pub versions: BTreeMap<String, String>,
}

impl ImportReport {
    pub fn all_required_present(&self) -> bool {
        self.missing.is_empty()
    }
}

pub async fn check_imports(probe: &dyn ImportProbe) -> ImportReport {
    let modules: Vec<&str> = REQUIRED_IMPORTS.iter().chain(OPTIONAL_IMPORTS.iter()).copied().collect();
    let outcomes = match probe.probe(&modules).await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            warn!("import probe failed: {}", e);
            BTreeMap::new()
        }
    };
    let fallback = if outcomes.is_empty() { "InterpreterUnavailable" } else { "NotReported" };

    let mut report = ImportReport::default();
    for (names, missing) in [
        (&REQUIRED_IMPORTS[..], &mut report.missing),
        (&OPTIONAL_IMPORTS[..], &mut report.optional_missing),
    ] {
        for name in names {
            match outcomes.get(*name) {
                Some(outcome) if outcome.ok => {
                    report.versions.insert(name.to_string(), outcome.version.clone());
                }
                Some(outcome) => missing.push(format!("{}:{}", name, outcome.error)),
                None => missing.push(format!("{}:{}", name, fallback)),
            }
        }
    }
    report
}
