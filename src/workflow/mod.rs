//! End-to-end recovery workflow.
//!
//! [`WorkflowOrchestrator`] wires the breaker, resolver, cache, executor
//! and session registry together and walks one request through
//! prerequisite checks, execution, validation and the final action
//! decision.

mod orchestrator;
mod types;

pub use orchestrator::WorkflowOrchestrator;
pub use types::{NextAction, WorkflowOptions, WorkflowResult};
