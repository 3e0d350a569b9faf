use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("missing snapshot: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("no protected packages found in snapshot")]
    EmptyResult,

    #[error("missing prerequisites: {}", .0.join(", "))]
    MissingPrerequisite(Vec<String>),

    #[error("import failed: {0}")]
    Import(String),

    #[error("model init failed: {0}")]
    ModelInit(String),

    #[error("model invocation failed: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    /// Short name of the failure, used in log blocks and `details` strings.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "IoError",
            Error::Serialization(_) => "SerializationError",
            Error::MissingInput(_) => "MissingInput",
            Error::EmptyResult => "EmptyResult",
            Error::MissingPrerequisite(_) => "MissingPrerequisite",
            Error::Import(_) => "ImportError",
            Error::ModelInit(_) => "ModelInitError",
            Error::Parse(_) => "ParseError",
            Error::InvalidRequest(_) => "InvalidRequest",
            Error::Http(_) => "HttpError",
            Error::External(_) => "ExternalError",
        }
    }

    /// `<Kind>: <message>`
    pub fn summary(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }

    /// Process exit status for command-line tools.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MissingInput(_) => 2,
            Error::MissingPrerequisite(_) => 2,
            Error::EmptyResult => 3,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
