use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use omni_core::{ParserLoader, Result, ScreenParser};
use omni_parser::{Readiness, SidecarMode};
use crate::error_log::ErrorLog;

/// Everything a real-local request handler needs, built once at startup.
pub struct SidecarState {
    pub mode: SidecarMode,
    pub readiness: Readiness,
    pub error_log: ErrorLog,
    loader: Arc<dyn ParserLoader>,
    parser: OnceCell<Arc<dyn ScreenParser>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeStatus {
    pub ok: bool,
    pub mode: SidecarMode,
    #[serde(flatten)]
    pub readiness: Readiness,
}

impl SidecarState {
    pub fn new(mode: SidecarMode, readiness: Readiness, loader: Arc<dyn ParserLoader>, error_log: ErrorLog) -> Self {
        Self {
            mode,
            readiness,
            error_log,
            loader,
            parser: OnceCell::new(),
        }
    }

    pub fn probe_status(&self) -> ProbeStatus {
        ProbeStatus {
            ok: self.readiness.ready,
            mode: self.mode,
            readiness: self.readiness.clone(),
        }
    }

    /// Loads the parser on first call. Concurrent callers wait for the same
    /// initialization; a failed load leaves the cell empty so the next
    /// request tries again.
    pub async fn parser(&self) -> Result<Arc<dyn ScreenParser>> {
        self.parser
            .get_or_try_init(|| self.loader.load())
            .await
            .map(Arc::clone)
    }
}
