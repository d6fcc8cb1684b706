//! Render lifecycle state machine.
//!
//! Tracks a rendering artifact through its phases with per-phase timeouts
//! and a bounded retry budget. Phase timers fire `Timeout` automatically; a
//! retry waits out a fixed delay before re-entering `Initializing`. Every
//! transition is timestamped, kept in a bounded history, and broadcast to
//! subscribers.

mod machine;
mod types;

pub use machine::RenderStateMachine;
pub use types::{RenderEvent, RenderMetrics, RenderSnapshot, RenderState, RenderTransition};
