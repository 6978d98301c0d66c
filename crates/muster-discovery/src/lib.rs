//! Muster Discovery - subnet detection and the fleet scanner
//!
//! Discovery sweeps candidate private subnets for devices listening on the
//! debug port, probing addresses in bounded concurrent batches.

pub mod scanner;
pub mod subnet;

pub use scanner::{ScanConfig, Scanner};
pub use subnet::{detect_local_prefix, FALLBACK_PREFIXES};
