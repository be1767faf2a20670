//! Error stack reporting.
//!
//! Called immediately after an engine entry point returns a non-success
//! status. The engine keeps its diagnostic stack per failing call, so the
//! stack is only meaningful right after the call that produced it; this is
//! why the function is crate-private and only reached from the failing
//! call sites.

use tracing::{error, warn};

use crate::binding::Binding;
use crate::error::{EngineFailure, VadError};
use crate::status::Status;

/// Build the error for a failed engine call, explained by its error stack.
///
/// - stack retrieved: `VadError::Engine` carrying the messages (possibly
///   none, in which case display falls back to the status text);
/// - stack retrieval failed: `VadError::Unexplained` with both statuses.
///
/// The native stack is released before this returns.
pub(crate) fn explain_failure(binding: &dyn Binding, status: Status, context: &str) -> VadError {
    let status_text = binding.status_to_string(status);

    match binding.error_stack() {
        Ok(stack) => {
            let messages = stack.release();
            if messages.is_empty() {
                warn!(context, %status, "engine reported an empty error stack");
            }
            let failure = EngineFailure {
                context: context.to_string(),
                status,
                status_text,
                messages,
            };
            error!("{failure}");
            VadError::Engine(failure)
        }
        Err(retrieval) => {
            error!(
                context,
                %status,
                %retrieval,
                "unable to retrieve the engine error stack"
            );
            VadError::Unexplained {
                context: context.to_string(),
                status,
                retrieval,
            }
        }
    }
}
