pub mod artifact;
pub mod breaker;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod render;
pub mod resolve;
pub mod session;
pub mod utils;
pub mod workflow;

pub use artifact::{ArtifactLanguage, AuxiliaryBlock, BlockKind, RecoveryRequest};
pub use breaker::{BreakerEvent, BreakerSnapshot, CircuitBreakerManager, CircuitState};
pub use cache::{CacheStats, ResolutionCache};
pub use classify::{Classification, ErrorCategory, ErrorClassifier, HeuristicClassifier};
pub use config::RecoveryConfig;
pub use error::{RecoveryError, Result};
pub use executor::{
    FallbackFix, FallbackRequest, FallbackService, RecoveryOutcome, StageDiagnostic, StageStatus,
    StrategyExecutor,
};
pub use extract::{BlockExtractor, FencedBlockExtractor};
pub use render::{RenderEvent, RenderSnapshot, RenderState, RenderStateMachine};
pub use resolve::{ResolutionResult, ResolutionStrategy, StrategyAttempt, StrategyResolver};
pub use session::{RecoverySession, RecoveryStateManager, SessionEvent, SessionStatus};
pub use workflow::{NextAction, WorkflowOptions, WorkflowOrchestrator, WorkflowResult};
