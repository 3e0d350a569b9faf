use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tracing::{debug, info};
use url::Url;
use omni_core::{Error, ParseOutput, ParserLoader, Result, ScreenParser};
use crate::cache_env::CacheEnv;
use crate::config::{server_script, SidecarConfig};

const BOX_THRESHOLD: &str = "0.05";
const CAPTION_MODEL: &str = "florence2";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Serialize)]
struct BackendParseRequest<'a> {
    base64_image: &'a str,
}

#[derive(Deserialize)]
struct BackendParseResponse {
    #[serde(default)]
    som_image_base64: String,
    #[serde(default)]
    parsed_content_list: Vec<Value>,
}

/// Starts the OmniParser repository's own server on a private port.
pub struct OmniParserLauncher {
    client: Client,
    python: String,
    repo: PathBuf,
    weights_root: PathBuf,
    device: String,
    port: u16,
    startup_timeout: Duration,
    cache_env: CacheEnv,
}

impl OmniParserLauncher {
    pub fn new(config: &SidecarConfig, cache_env: CacheEnv) -> Self {
        Self {
            client: Client::new(),
            python: config.python.clone(),
            repo: config.real_repo.clone().unwrap_or_default(),
            weights_root: config.weights_root.clone().unwrap_or_default(),
            device: config.device.clone(),
            port: config.backend_port,
            startup_timeout: config.backend_startup_timeout,
            cache_env,
        }
    }

    fn base_url(&self) -> Result<Url> {
        Url::parse(&format!("http://127.0.0.1:{}/", self.port))
            .map_err(|e| Error::ModelInit(format!("invalid backend address: {}", e)))
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.python);
        command
            .arg(server_script(&self.repo))
            .arg("--som_model_path")
            .arg(self.weights_root.join("icon_detect").join("model.pt"))
            .arg("--caption_model_name")
            .arg(CAPTION_MODEL)
            .arg("--caption_model_path")
            .arg(self.weights_root.join("icon_caption_florence"))
            .arg("--device")
            .arg(&self.device)
            .arg("--BOX_TRESHOLD")
            .arg(BOX_THRESHOLD)
            .arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(self.port.to_string())
            .current_dir(&self.repo)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        self.cache_env.apply(&mut command);
        command
    }

    /// The readiness poll cannot tell processes apart, so the port must be
    /// free before the child is spawned.
    async fn ensure_port_free(&self) -> Result<()> {
        match TcpListener::bind(("127.0.0.1", self.port)).await {
            Ok(listener) => {
                drop(listener);
                Ok(())
            }
            Err(e) => Err(Error::ModelInit(format!(
                "backend port {} is not available: {}",
                self.port, e
            ))),
        }
    }

    async fn wait_until_ready(&self, child: &mut Child, base_url: &Url) -> Result<()> {
        let probe_url = base_url
            .join("probe/")
            .map_err(|e| Error::ModelInit(format!("invalid probe url: {}", e)))?;
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(Error::ModelInit(format!("OmniParser server exited with {} before becoming ready", status)));
            }
            match self.client.get(probe_url.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    if let Some(status) = child.try_wait()? {
                        return Err(Error::ModelInit(format!(
                            "OmniParser server exited with {} while another process answered on port {}",
                            status, self.port
                        )));
                    }
                    return Ok(());
                }
                Ok(response) => debug!("backend probe returned {}", response.status()),
                Err(e) => debug!("backend not up yet: {}", e),
            }
            if started.elapsed() >= self.startup_timeout {
                child.start_kill()?;
                return Err(Error::ModelInit(format!(
                    "OmniParser server not ready after {}s",
                    self.startup_timeout.as_secs()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl fmt::Debug for OmniParserLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OmniParserLauncher")
            .field("python", &self.python)
            .field("repo", &self.repo)
            .field("port", &self.port)
            .finish()
    }
}

#[async_trait]
impl ParserLoader for OmniParserLauncher {
    async fn load(&self) -> Result<Arc<dyn ScreenParser>> {
        let base_url = self.base_url()?;
        self.ensure_port_free().await?;
        info!("launching OmniParser from {} on {}", self.repo.display(), base_url);
        let mut child = self
            .command()
            .spawn()
            .map_err(|e| Error::ModelInit(format!("cannot launch {}: {}", self.python, e)))?;
        self.wait_until_ready(&mut child, &base_url).await?;
        info!("OmniParser server ready");

        let parse_url = base_url
            .join("parse/")
            .map_err(|e| Error::ModelInit(format!("invalid parse url: {}", e)))?;
        Ok(Arc::new(OmniParserBackend {
            client: self.client.clone(),
            parse_url,
            _child: Mutex::new(child),
        }))
    }
}

/// Handle to a running OmniParser server. Dropping it stops the server.
pub struct OmniParserBackend {
    client: Client,
    parse_url: Url,
    _child: Mutex<Child>,
}

impl fmt::Debug for OmniParserBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OmniParserBackend")
            .field("client", &"<reqwest::Client>")
            .field("parse_url", &self.parse_url.as_str())
            .finish()
    }
}

#[async_trait]
impl ScreenParser for OmniParserBackend {
    fn name(&self) -> &str {
        "OmniParser"
    }

    async fn parse(&self, image_base64: &str) -> Result<ParseOutput> {
        let response = self
            .client
            .post(self.parse_url.clone())
            .json(&BackendParseRequest { base64_image: image_base64 })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Parse(format!("OmniParser returned {}: {}", status, body.trim())));
        }
        let parsed = response.json::<BackendParseResponse>().await?;
        Ok(ParseOutput {
            som_image_base64: parsed.som_image_base64,
            parsed_content_list: parsed.parsed_content_list,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::{get, post}, Json, Router};
    use serde_json::json;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn repo_with_script(dir: &TempDir, script: &str) -> PathBuf {
        let repo = dir.path().join("OmniParser");
        let path = server_script(&repo);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, script).unwrap();
        repo
    }

    fn launcher(repo: PathBuf, port: u16, timeout: Duration) -> OmniParserLauncher {
        let config = SidecarConfig {
            real_repo: Some(repo),
            weights_root: Some(PathBuf::from("/weights")),
            python: "sh".to_string(),
            backend_port: port,
            backend_startup_timeout: timeout,
            ..Default::default()
        };
        OmniParserLauncher::new(&config, CacheEnv::default())
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
    }

    async fn fake_omniparser(listener: tokio::net::TcpListener) {
        let app = Router::new()
            .route("/probe/", get(|| async { Json(json!({"message": "Omniparser API ready"})) }))
            .route(
                "/parse/",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "som_image_base64": "U09N",
                        "parsed_content_list": [{"type": "text", "content": body["base64_image"]}],
                        "latency": 0.01,
                    }))
                }),
            );
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    }

    #[test]
    fn test_command_arguments() {
        let dir = tempdir().unwrap();
        let repo = repo_with_script(&dir, "");
        let command = launcher(repo.clone(), 8123, Duration::from_secs(1)).command();
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], server_script(&repo).to_string_lossy());
        assert!(args.windows(2).any(|w| w[0] == "--som_model_path" && w[1] == "/weights/icon_detect/model.pt"));
        assert!(args.windows(2).any(|w| w[0] == "--BOX_TRESHOLD" && w[1] == "0.05"));
        assert!(args.windows(2).any(|w| w[0] == "--port" && w[1] == "8123"));
    }

    #[tokio::test]
    async fn test_load_fails_when_server_exits() {
        let dir = tempdir().unwrap();
        let repo = repo_with_script(&dir, "exit 3\n");

        let err = launcher(repo, free_port(), Duration::from_secs(30)).load().await.err().expect("load should fail");
        assert!(matches!(err, Error::ModelInit(ref msg) if msg.contains("exited")), "{}", err);
    }

    #[tokio::test]
    async fn test_load_fails_without_interpreter() {
        let dir = tempdir().unwrap();
        let repo = repo_with_script(&dir, "");
        let mut launcher = launcher(repo, free_port(), Duration::from_secs(1));
        launcher.python = "/nonexistent/python-for-omni".to_string();

        let err = launcher.load().await.err().expect("load should fail");
        assert!(matches!(err, Error::ModelInit(_)));
    }

    #[tokio::test]
    async fn test_load_and_parse_through_backend() {
        // `sh` cannot listen on a socket, so the script announces its start
        // through a marker file and the test serves the port from then on.
        let dir = tempdir().unwrap();
        let port = free_port();
        let marker = dir.path().join("started");
        let repo = repo_with_script(&dir, &format!("touch '{}'\nsleep 30\n", marker.display()));
        tokio::spawn(async move {
            while !marker.exists() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            fake_omniparser(listener).await;
        });

        let parser = launcher(repo, port, Duration::from_secs(10)).load().await.unwrap();
        assert_eq!(parser.name(), "OmniParser");

        let output = parser.parse("aW1hZ2U=").await.unwrap();
        assert_eq!(output.som_image_base64, "U09N");
        assert_eq!(output.parsed_content_list, vec![json!({"type": "text", "content": "aW1hZ2U="})]);
    }

    #[tokio::test]
    async fn test_load_refuses_occupied_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        fake_omniparser(listener).await;
        let dir = tempdir().unwrap();
        let marker = dir.path().join("started");
        let repo = repo_with_script(&dir, &format!("touch '{}'\nsleep 30\n", marker.display()));

        let err = launcher(repo, port, Duration::from_secs(10)).load().await.err().expect("load should fail");
        assert!(matches!(err, Error::ModelInit(ref msg) if msg.contains("not available")), "{}", err);
        assert!(!marker.exists());
    }
}
