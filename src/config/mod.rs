//! Engine configuration.
//!
//! All tunables for the recovery engine live in [`RecoveryConfig`]:
//! - `breaker`: circuit-breaker thresholds and windows
//! - `resolver`: strategy acceptance threshold
//! - `executor`: fallback service gating and timeout
//! - `workflow`: end-to-end timeout, apply thresholds, input ceilings
//! - `render`: per-phase timeouts and retry budget
//! - `cache`: resolution memo bounds
//! - `session`: retention and event stream capacity

mod settings;

pub use settings::{
    BreakerConfig, CacheConfig, ExecutorConfig, PhaseTimeouts, RecoveryConfig, RenderConfig,
    ResolverConfig, SessionConfig, WorkflowConfig,
};
