pub mod errors;
pub mod context;
pub mod clock;
pub mod registry;   // admission controller
pub mod lifecycle;  // viewer state machine feeding the registry
pub mod script;

use errors::Result;

/// The main entry point: a registry with the default capacity on a monotonic clock.
pub fn default_registry() -> Result<ContextRegistry> {
    ContextRegistry::new(AdmissionConfig::default())
}

/// Re-export the most-used types for callers wiring viewers to the registry.
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use context::{AdmissionConfig, MAX_CONTEXTS, NEAR_LIMIT_MARGIN, PLATFORM_CONTEXT_LIMIT};
pub use errors::AdmissionError;
pub use lifecycle::{PanoramaSurface, ViewerLifecycle, ViewerState};
pub use registry::{Admission, Cleanup, ContextRegistry, OwnerSnapshot};
