use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::binding::Profile;
use crate::status::Status;

/// All errors produced by vadkit-core.
#[derive(Debug, Error)]
pub enum VadError {
    #[error("failed to load engine library at '{}': {source}", path.display())]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("failed to load '{symbol}': {source}")]
    MissingSymbol {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error(transparent)]
    Engine(#[from] EngineFailure),

    #[error("{context} failed with '{status}' and the engine error stack could not be retrieved ('{retrieval}')")]
    Unexplained {
        context: String,
        status: Status,
        retrieval: Status,
    },

    #[error("invalid frame length: expected {expected} samples, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    #[error("audio format mismatch: {0}")]
    FormatMismatch(String),

    #[error("'{operation}' is not available in the {profile:?} profile")]
    Unsupported {
        operation: &'static str,
        profile: Profile,
    },

    #[error("out of memory: could not allocate {requested} bytes")]
    OutOfMemory { requested: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VadError {
    /// Engine status behind this error, if it came from the engine.
    pub fn status(&self) -> Option<Status> {
        match self {
            VadError::Engine(failure) => Some(failure.status),
            VadError::Unexplained { status, .. } => Some(*status),
            VadError::OutOfMemory { .. } => Some(Status::OutOfMemory),
            _ => None,
        }
    }
}

/// A non-success engine status together with the error stack that explains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    /// Which operation failed, e.g. `"engine construction"`.
    pub context: String,
    pub status: Status,
    /// Engine-rendered status text (`status_to_string`).
    pub status_text: String,
    /// Outer-to-inner cause chain. May be empty.
    pub messages: Vec<String>,
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed with '{}'", self.context, self.status_text)?;
        if !self.messages.is_empty() {
            f.write_str(":")?;
            for (i, message) in self.messages.iter().enumerate() {
                write!(f, "\n  [{i}] {message}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for EngineFailure {}

pub type Result<T> = std::result::Result<T, VadError>;
