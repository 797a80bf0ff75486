//! Fault injection subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → counter.rs (advance shared counter, tag request with its number)
//!     → injector.rs (number % interval == 0 ? synthetic 500 : delegate)
//!     → upstream handler (registry or proxy)
//! ```
//!
//! # Design Decisions
//! - The counter is an explicit component, never a global
//! - Reset and increment happen in one atomic update
//! - The injector reads the number the counter assigned to *this* request
//! - Injection rule is fixed; the two parameters are compile-time constants

pub mod chain;
pub mod counter;
pub mod injector;

pub use chain::DisruptionChain;
pub use counter::{RequestCounter, RequestNumber};
pub use injector::{FaultInjector, FAILURE_BODY};

/// Counter values above this trigger a soft reset on the next request.
pub const RESET_THRESHOLD: u64 = 100;

/// Every request whose number is a multiple of this fails.
pub const DISRUPTION_INTERVAL: u64 = 50;
