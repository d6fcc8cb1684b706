//! Staged recovery execution.
//!
//! The executor runs one recovery attempt as an ordered series of stages:
//! circuit check, error classification, strategy resolution, and an optional
//! external fallback. Each stage leaves a diagnostic; a passing resolution
//! short-circuits the rest. Outcomes feed the artifact's circuit so repeated
//! failures trip it.

mod fallback;
mod pipeline;
mod stage;

pub use fallback::{FallbackFix, FallbackRequest, FallbackService};
pub use pipeline::{RecoveryOutcome, StrategyExecutor};
pub use stage::{StageDiagnostic, StageStatus};
