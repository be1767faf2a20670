//! Engine status codes.
//!
//! Every engine entry point that can fail reports one of these. A status is
//! an outcome, not an error object: non-success statuses are paired with the
//! engine's error stack by [`crate::engine::report::explain_failure`].

use std::fmt;

use tracing::warn;

/// Closed set of outcomes reported by the engine ABI.
///
/// Discriminants match the native `pv_status_t` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    OutOfMemory = 1,
    IoError = 2,
    InvalidArgument = 3,
    StopIteration = 4,
    KeyError = 5,
    InvalidState = 6,
    RuntimeError = 7,
    ActivationError = 8,
    ActivationLimitReached = 9,
    ActivationThrottled = 10,
    ActivationRefused = 11,
}

impl Status {
    /// Map a raw native code onto the closed set.
    pub fn from_code(code: i32) -> Option<Self> {
        let status = match code {
            0 => Status::Success,
            1 => Status::OutOfMemory,
            2 => Status::IoError,
            3 => Status::InvalidArgument,
            4 => Status::StopIteration,
            5 => Status::KeyError,
            6 => Status::InvalidState,
            7 => Status::RuntimeError,
            8 => Status::ActivationError,
            9 => Status::ActivationLimitReached,
            10 => Status::ActivationThrottled,
            11 => Status::ActivationRefused,
            _ => return None,
        };
        Some(status)
    }

    /// Like [`Status::from_code`], but folds unknown codes into `RuntimeError`.
    ///
    /// A newer engine binary may report codes this build does not know about.
    pub fn from_code_lossy(code: i32) -> Self {
        Self::from_code(code).unwrap_or_else(|| {
            warn!(code, "engine reported an unknown status code");
            Status::RuntimeError
        })
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    /// Credential / licensing failures (desktop builds only).
    pub fn is_activation(self) -> bool {
        matches!(
            self,
            Status::ActivationError
                | Status::ActivationLimitReached
                | Status::ActivationThrottled
                | Status::ActivationRefused
        )
    }

    /// Canonical upper-case name, used when the engine cannot render a status.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::OutOfMemory => "OUT_OF_MEMORY",
            Status::IoError => "IO_ERROR",
            Status::InvalidArgument => "INVALID_ARGUMENT",
            Status::StopIteration => "STOP_ITERATION",
            Status::KeyError => "KEY_ERROR",
            Status::InvalidState => "INVALID_STATE",
            Status::RuntimeError => "RUNTIME_ERROR",
            Status::ActivationError => "ACTIVATION_ERROR",
            Status::ActivationLimitReached => "ACTIVATION_LIMIT_REACHED",
            Status::ActivationThrottled => "ACTIVATION_THROTTLED",
            Status::ActivationRefused => "ACTIVATION_REFUSED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
