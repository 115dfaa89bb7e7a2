use thiserror::Error; // Import the `Error` derive macro from the `thiserror` crate

use crate::lifecycle::ViewerState;

// Define an enum to represent everything the admission controller can report
#[derive(Debug, Error)] // Automatically implement `Debug` and `Error` traits for the enum
pub enum AdmissionError {
    // Configuration rejected by validation, with a message
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    // A released owner's cleanup reported a failure
    #[error("cleanup for `{id}` failed: {reason}")]
    CleanupFailed { id: String, reason: String },

    // A viewer was asked to move somewhere its current state does not allow
    #[error("viewer `{id}` cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        id: String,
        from: ViewerState,
        to: ViewerState,
    },

    // Replay script is well-formed JSON but not a usable script
    #[error("script error: {0}")]
    Script(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// Type alias for results that use `AdmissionError` as the error type
pub type Result<T> = std::result::Result<T, AdmissionError>;
