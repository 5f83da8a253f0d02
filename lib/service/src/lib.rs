//! Automation management facade for the copper-relay engine.
//!
//! The HTTP/UI layer is out of scope for the engine; this crate exposes the
//! operations that layer needs: validated CRUD over automation graphs,
//! activation toggling, manual trigger invocation, and run history reads.

pub mod automation;
pub mod error;

pub use automation::{AutomationService, ManualInvocation};
pub use error::ServiceError;
