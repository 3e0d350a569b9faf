use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_BACKEND_PORT: u16 = 8010;
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(300);
pub const ERROR_LOG_NAME: &str = "step6_parse_error.log";

/// How the sidecar runs. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SidecarMode {
    /// Canned responses, no model
    #[value(name = "mock")]
    Mock,
    /// Prerequisite check only
    #[value(name = "real")]
    Real,
    #[value(name = "real_local_aliyun39")]
    RealLocalAliyun39,
    #[value(name = "real_local_untitled")]
    RealLocalUntitled,
}

impl SidecarMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Real => "real",
            Self::RealLocalAliyun39 => "real_local_aliyun39",
            Self::RealLocalUntitled => "real_local_untitled",
        }
    }

    pub fn is_real_local(&self) -> bool {
        matches!(self, Self::RealLocalAliyun39 | Self::RealLocalUntitled)
    }
}

impl fmt::Display for SidecarMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SidecarConfig {
    pub mode: SidecarMode,
    pub host: String,
    pub port: u16,
    pub real_repo: Option<PathBuf>,
    pub weights_root: Option<PathBuf>,
    /// Interpreter of the environment OmniParser is installed in
    pub python: String,
    pub device: String,
    /// Port of the OmniParser server launched on first parse
    pub backend_port: u16,
    pub backend_startup_timeout: Duration,
    pub error_log: Option<PathBuf>,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            mode: SidecarMode::Mock,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            real_repo: None,
            weights_root: None,
            python: "python3".to_string(),
            device: "cuda".to_string(),
            backend_port: DEFAULT_BACKEND_PORT,
            backend_startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            error_log: None,
        }
    }
}

impl SidecarConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Explicit `--error-log`, else `<repo>/../../docs/step6_parse_error.log`.
    pub fn error_log_path(&self) -> PathBuf {
        if let Some(path) = &self.error_log {
            return path.clone();
        }
        self.real_repo
            .as_deref()
            .and_then(Path::parent)
            .and_then(Path::parent)
            .map(|base| base.join("docs").join(ERROR_LOG_NAME))
            .unwrap_or_else(|| PathBuf::from(ERROR_LOG_NAME))
    }
}

pub fn server_script(repo: &Path) -> PathBuf {
    repo.join("omnitool").join("omniparserserver").join("omniparserserver.py")
}

pub fn core_module(repo: &Path) -> PathBuf {
    repo.join("util").join("omniparser.py")
}
