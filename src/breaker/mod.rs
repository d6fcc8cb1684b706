//! Per-artifact circuit breaking.
//!
//! Each artifact gets its own circuit. Failures recorded inside a sliding
//! monitoring window open the circuit once volume and failure-rate thresholds
//! are both met; an open circuit rejects recovery attempts until a recovery
//! timeout elapses, then admits probes in half-open until enough consecutive
//! successes close it again. Every transition is logged, kept in a bounded
//! history, and broadcast to subscribers.

mod manager;
mod types;

pub use manager::CircuitBreakerManager;
pub use types::{BreakerEvent, BreakerSnapshot, CircuitState};
