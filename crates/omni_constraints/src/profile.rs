use std::path::{Path, PathBuf};

const OPENCV_PACKAGES: [&str; 2] = ["opencv-python", "opencv-python-headless"];

/// Named rule set deciding which freeze lines get pinned.
///
/// `Untitled` pins numpy as well and keeps OpenCV as a special case rather
/// than through the name predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConstraintProfile {
    /// General environment protection
    Protected,
    /// Step-scoped variant for the untitled deployment
    Untitled,
}

impl ConstraintProfile {
    /// Packages pinned from the snapshot's `<name>_version` fields, in output order.
    pub fn pinned_packages(&self) -> &'static [&'static str] {
        match self {
            Self::Protected => &["torch", "torchvision", "torchaudio"],
            Self::Untitled => &["torch", "torchvision", "torchaudio", "numpy"],
        }
    }

    pub fn is_pinned(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.pinned_packages().iter().any(|p| *p == name)
    }

    /// Whether a freeze line for `name` must be carried into the constraints.
    pub fn keeps(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        match self {
            Self::Protected => {
                matches!(name.as_str(), "torch" | "torchvision" | "torchaudio")
                    || OPENCV_PACKAGES.contains(&name.as_str())
                    || is_cuda_related(&name)
            }
            Self::Untitled => OPENCV_PACKAGES.contains(&name.as_str()) || is_cuda_related(&name),
        }
    }

    pub fn default_input(&self, root: &Path) -> PathBuf {
        match self {
            Self::Protected => root.join("docs").join("protect_pre.json"),
            Self::Untitled => root.join("docs").join("step7_untitled_pre.json"),
        }
    }

    pub fn default_output(&self, root: &Path) -> PathBuf {
        match self {
            Self::Protected => root.join("docs").join("protected_constraints.txt"),
            Self::Untitled => root.join("docs").join("step7_untitled_protected_constraints.txt"),
        }
    }
}

/// GPU vendor packages: `nvidia-*`, `cuda*`, anything mentioning cudnn or tensorrt.
pub fn is_cuda_related(name: &str) -> bool {
    let n = name.to_lowercase();
    n.starts_with("nvidia-") || n.starts_with("cuda") || n.contains("cudnn") || n.contains("tensorrt")
}
