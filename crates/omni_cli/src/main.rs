use clap::Parser;
use omni_core::Error;
use omni_parser::config::{DEFAULT_BACKEND_PORT, DEFAULT_HOST, DEFAULT_PORT};
use omni_parser::preflight::{check_prerequisites, PythonImportProbe};
use omni_parser::{create_parser_loader, run_preflight, CacheEnv, SidecarConfig, SidecarMode};
use omni_web::{create_app, create_mock_app, serve, ErrorLog, SidecarState};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn, Level};

mod logging;

#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP sidecar for the OmniParser screen parser", long_about = None)]
struct Cli {
    #[arg(long, value_enum, default_value = "mock", env = "OMNI_SIDECAR_MODE")]
    mode: SidecarMode,
    #[arg(long, default_value = DEFAULT_HOST, env = "OMNI_SIDECAR_HOST")]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT, env = "OMNI_SIDECAR_PORT")]
    port: u16,
    /// OmniParser checkout (contains util/omniparser.py)
    #[arg(long = "real-repo", env = "OMNI_SIDECAR_REAL_REPO")]
    real_repo: Option<PathBuf>,
    #[arg(long = "weights-root", env = "OMNI_SIDECAR_WEIGHTS_ROOT")]
    weights_root: Option<PathBuf>,
    /// Python interpreter of the OmniParser environment
    #[arg(long, default_value = "python3", env = "OMNI_SIDECAR_PYTHON")]
    python: String,
    #[arg(long, default_value = "cuda", env = "OMNI_SIDECAR_DEVICE")]
    device: String,
    #[arg(long, default_value_t = DEFAULT_BACKEND_PORT, env = "OMNI_SIDECAR_BACKEND_PORT")]
    backend_port: u16,
    #[arg(long, default_value_t = 300, env = "OMNI_SIDECAR_BACKEND_STARTUP_TIMEOUT_SECS")]
    backend_startup_timeout_secs: u64,
    /// Defaults to <real-repo>/../../docs/step6_parse_error.log
    #[arg(long, env = "OMNI_SIDECAR_ERROR_LOG")]
    error_log: Option<PathBuf>,
    #[arg(long, default_value = "info", env = "OMNI_SIDECAR_LOG_LEVEL")]
    log_level: Level,
}

impl Cli {
    fn into_config(self) -> SidecarConfig {
        let non_empty = |path: Option<PathBuf>| path.filter(|p| !p.as_os_str().is_empty());
        SidecarConfig {
            mode: self.mode,
            host: self.host,
            port: self.port,
            real_repo: non_empty(self.real_repo),
            weights_root: non_empty(self.weights_root),
            python: self.python,
            device: self.device,
            backend_port: self.backend_port,
            backend_startup_timeout: Duration::from_secs(self.backend_startup_timeout_secs),
            error_log: non_empty(self.error_log),
        }
    }
}

/// Outcome of `--mode real`: printed as one JSON line, then the process exits.
fn real_mode_report(config: &SidecarConfig) -> (Value, i32) {
    let missing: Vec<String> = check_prerequisites(config).iter().map(ToString::to_string).collect();
    if !missing.is_empty() {
        let code = Error::MissingPrerequisite(missing.clone()).exit_code();
        let report = json!({
            "ok": false,
            "mode": SidecarMode::Real,
            "error": "missing_prerequisites",
            "details": missing,
        });
        return (report, code);
    }
    let report = json!({
        "ok": false,
        "mode": SidecarMode::Real,
        "error": "real_sidecar_not_installed",
        "details": [
            "Pass-through is not wired in this mode.",
            "Use --mode real_local_aliyun39 or --mode real_local_untitled to serve the local OmniParser.",
        ],
    });
    (report, 3)
}

async fn run_real_local(config: SidecarConfig) -> anyhow::Result<()> {
    let cache_env = CacheEnv::prepare(config.weights_root.as_deref())?;
    let probe = PythonImportProbe::new(config.python.clone(), cache_env.clone());
    let readiness = run_preflight(&config, &probe).await;
    if !readiness.ready {
        warn!(reason = ?readiness.reason, "sidecar not ready, /parse will answer 503");
    }

    let error_log = ErrorLog::new(config.error_log_path());
    info!("model errors go to {}", error_log.path().display());
    let loader = create_parser_loader(&config, cache_env);
    let state = SidecarState::new(config.mode, readiness, loader, error_log);
    serve(create_app(state), &config.bind_addr()).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level);
    let config = cli.into_config();
    info!(mode = %config.mode, "starting omni sidecar");

    match config.mode {
        SidecarMode::Mock => serve(create_mock_app(), &config.bind_addr()).await?,
        SidecarMode::Real => {
            let (report, code) = real_mode_report(&config);
            println!("{}", report);
            std::process::exit(code);
        }
        SidecarMode::RealLocalAliyun39 | SidecarMode::RealLocalUntitled => run_real_local(config).await?,
    }

    Ok(())
}
