//! Readiness checks run once before the sidecar accepts parse requests.
//!
//! Three things must hold for a real-local sidecar to be ready: the model's
//! Python dependencies import, the OmniParser checkout is complete, and every
//! weight file in the manifest exists. The result is a [`Readiness`] snapshot
//! that never changes for the lifetime of the process.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;
use crate::config::{core_module, server_script, SidecarConfig};

pub mod imports;

pub use imports::{check_imports, ImportOutcome, ImportProbe, ImportReport, PythonImportProbe};

/// Logical weight name and its location relative to the weights root.
pub const WEIGHT_MANIFEST: [(&str, &str); 5] = [
    ("icon_detect/train_args.yaml", "icon_detect/train_args.yaml"),
    ("icon_detect/model.pt", "icon_detect/model.pt"),
    ("icon_caption/config.json", "icon_caption_florence/config.json"),
    ("icon_caption/generation_config.json", "icon_caption_florence/generation_config.json"),
    ("icon_caption/model.safetensors", "icon_caption_florence/model.safetensors"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingPrerequisite {
    RealRepo(String),
    ServerScript(PathBuf),
    CoreModule(PathBuf),
    WeightsRoot(String),
}

impl MissingPrerequisite {
    pub fn concerns_repo(&self) -> bool {
        matches!(self, Self::RealRepo(_) | Self::ServerScript(_) | Self::CoreModule(_))
    }
}

impl fmt::Display for MissingPrerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RealRepo(arg) => write!(f, "real_repo_missing:{}", arg),
            Self::ServerScript(path) => write!(f, "omniparserserver_missing:{}", path.display()),
            Self::CoreModule(path) => write!(f, "omniparser_core_missing:{}", path.display()),
            Self::WeightsRoot(arg) => write!(f, "weights_root_missing:{}", arg),
        }
    }
}

impl Serialize for MissingPrerequisite {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn display_arg(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string()).unwrap_or_default()
}

/// Checks the OmniParser checkout and the weights root.
pub fn check_prerequisites(config: &SidecarConfig) -> Vec<MissingPrerequisite> {
    let mut missing = Vec::new();

    match config.real_repo.as_deref().filter(|repo| repo.exists()) {
        None => missing.push(MissingPrerequisite::RealRepo(display_arg(config.real_repo.as_deref()))),
        Some(repo) => {
            let server = server_script(repo);
            if !server.exists() {
                missing.push(MissingPrerequisite::ServerScript(server));
            }
            let core = core_module(repo);
            if !core.exists() {
                missing.push(MissingPrerequisite::CoreModule(core));
            }
        }
    }

    if !config.weights_root.as_deref().is_some_and(Path::exists) {
        missing.push(MissingPrerequisite::WeightsRoot(display_arg(config.weights_root.as_deref())));
    }

    missing
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeightCheck {
    pub missing: Vec<String>,
    pub required: BTreeMap<String, PathBuf>,
}

pub fn required_weight_files(weights_root: &Path) -> BTreeMap<String, PathBuf> {
    WEIGHT_MANIFEST
        .iter()
        .map(|(key, rel)| (key.to_string(), weights_root.join(rel)))
        .collect()
}

pub fn check_weight_files(weights_root: Option<&Path>) -> WeightCheck {
    let Some(root) = weights_root else {
        return WeightCheck::default();
    };
    let required = required_weight_files(root);
    let missing = WEIGHT_MANIFEST
        .iter()
        .filter(|(key, _)| !required[*key].exists())
        .map(|(key, _)| format!("weight_missing:{}", key))
        .collect();
    WeightCheck { missing, required }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessReason {
    Ready,
    ImportsMissing,
    RepoMissing,
    WeightsMissing,
}

#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub preflight_ok: bool,
    pub ready: bool,
    pub reason: ReadinessReason,
    pub missing_imports: Vec<String>,
    pub optional_missing: Vec<String>,
    pub missing_files: Vec<MissingPrerequisite>,
    pub missing_weights: Vec<String>,
    pub required_weights: BTreeMap<String, PathBuf>,
    pub versions: BTreeMap<String, String>,
}

impl Readiness {
    pub fn evaluate(imports: ImportReport, missing_files: Vec<MissingPrerequisite>, weights: WeightCheck) -> Self {
        let preflight_ok = imports.all_required_present();
        let ready = preflight_ok && missing_files.is_empty() && weights.missing.is_empty();

        let reason = if !preflight_ok {
            ReadinessReason::ImportsMissing
        } else if missing_files.iter().any(MissingPrerequisite::concerns_repo) {
            ReadinessReason::RepoMissing
        } else if !missing_files.is_empty() || !weights.missing.is_empty() {
            ReadinessReason::WeightsMissing
        } else {
            ReadinessReason::Ready
        };

        Self {
            preflight_ok,
            ready,
            reason,
            missing_imports: imports.missing,
            optional_missing: imports.optional_missing,
            missing_files,
            missing_weights: weights.missing,
            required_weights: weights.required,
            versions: imports.versions,
        }
    }
}

/// Runs every check once. Call after the cache environment is prepared so
/// the import probe sees the redirected caches.
pub async fn run_preflight(config: &SidecarConfig, probe: &dyn ImportProbe) -> Readiness {
    let imports = check_imports(probe).await;
    let missing_files = check_prerequisites(config);
    let weights = check_weight_files(config.weights_root.as_deref());
    let readiness = Readiness::evaluate(imports, missing_files, weights);
    info!(ready = readiness.ready, reason = ?readiness.reason, "preflight finished");
    readiness
}
