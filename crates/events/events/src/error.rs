//! Errors raised by lifecycle hooks.

use thiserror::Error;

pub type EventResult<T> = Result<T, EventError>;

/// Why a hook could not finish. The bus logs these and moves on; they
/// never undo the mutation that fired the event.
#[derive(Debug, Error)]
pub enum EventError {
    /// The hook ran and its side effect failed.
    #[error("hook failed: {0}")]
    Hook(String),

    /// The event record did not have the shape the hook expects.
    #[error("unexpected event payload: {0}")]
    UnexpectedPayload(String),

    #[error("payload encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}
