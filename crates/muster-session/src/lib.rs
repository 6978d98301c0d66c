//! Muster Session - command dispatch and the outward fleet API
//!
//! `FleetSession` is the single object consumers hold: it owns the
//! registry, event bus, scanner, and dispatcher, and folds transport
//! lifecycle events into the registry through one mutation path.

pub mod dispatcher;
pub mod session;

pub use dispatcher::{DispatchOutcome, Dispatcher, Operation};
pub use session::FleetSession;
