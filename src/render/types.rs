use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactLanguage;

/// Lifecycle state of a rendering artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderState {
    #[default]
    Idle,
    Initializing,
    Loading,
    Configuring,
    Mounting,
    Bundling,
    Rendering,
    Ready,
    Errored,
    TimedOut,
    /// Waiting out the retry delay before re-entering `Initializing`.
    Retrying,
    Destroyed,
}

impl RenderState {
    pub fn name(&self) -> &'static str {
        match self {
            RenderState::Idle => "idle",
            RenderState::Initializing => "initializing",
            RenderState::Loading => "loading",
            RenderState::Configuring => "configuring",
            RenderState::Mounting => "mounting",
            RenderState::Bundling => "bundling",
            RenderState::Rendering => "rendering",
            RenderState::Ready => "ready",
            RenderState::Errored => "errored",
            RenderState::TimedOut => "timed_out",
            RenderState::Retrying => "retrying",
            RenderState::Destroyed => "destroyed",
        }
    }

    /// Progress phases that carry a timeout.
    pub fn is_phase(&self) -> bool {
        matches!(
            self,
            RenderState::Initializing
                | RenderState::Loading
                | RenderState::Configuring
                | RenderState::Mounting
                | RenderState::Bundling
                | RenderState::Rendering
        )
    }

    /// States a retry may be requested from.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RenderState::Errored | RenderState::TimedOut)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderState::Destroyed)
    }
}

impl std::fmt::Display for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Input to the render state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderEvent {
    Start,
    Initialized,
    Loaded,
    Configured,
    Mounted,
    Bundled,
    Rendered,
    Error,
    Timeout,
    Retry,
    /// Fired internally when the retry delay lapses.
    RetryDelayElapsed,
    Reset,
    Destroy,
}

impl RenderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RenderEvent::Start => "start",
            RenderEvent::Initialized => "initialized",
            RenderEvent::Loaded => "loaded",
            RenderEvent::Configured => "configured",
            RenderEvent::Mounted => "mounted",
            RenderEvent::Bundled => "bundled",
            RenderEvent::Rendered => "rendered",
            RenderEvent::Error => "error",
            RenderEvent::Timeout => "timeout",
            RenderEvent::Retry => "retry",
            RenderEvent::RetryDelayElapsed => "retry_delay_elapsed",
            RenderEvent::Reset => "reset",
            RenderEvent::Destroy => "destroy",
        }
    }
}

impl std::fmt::Display for RenderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The full transition table. `None` marks an invalid pair; the retry
/// budget guard lives in the machine, not here.
pub fn next_state(state: RenderState, event: RenderEvent) -> Option<RenderState> {
    use RenderEvent as E;
    use RenderState as S;
    match (state, event) {
        (S::Idle, E::Start) => Some(S::Initializing),
        (S::Initializing, E::Initialized) => Some(S::Loading),
        (S::Loading, E::Loaded) => Some(S::Configuring),
        (S::Configuring, E::Configured) => Some(S::Mounting),
        (S::Mounting, E::Mounted) => Some(S::Bundling),
        (S::Bundling, E::Bundled) => Some(S::Rendering),
        (S::Rendering, E::Rendered) => Some(S::Ready),
        (s, E::Error) if s != S::Destroyed => Some(S::Errored),
        (s, E::Timeout) if s != S::Destroyed => Some(S::TimedOut),
        (s, E::Retry) if s.is_retryable() => Some(S::Retrying),
        (S::Retrying, E::RetryDelayElapsed) => Some(S::Initializing),
        (s, E::Reset) if s != S::Destroyed => Some(S::Idle),
        (s, E::Destroy) if s != S::Destroyed => Some(S::Destroyed),
        _ => None,
    }
}

/// One applied transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderTransition {
    pub component_id: String,
    pub from: RenderState,
    pub to: RenderState,
    pub event: RenderEvent,
    pub retry_count: u32,
    pub at: DateTime<Utc>,
}

/// Accumulated phase timings. Phase entries add up across retries; the
/// total covers first start to ready.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderMetrics {
    pub phase_ms: BTreeMap<String, u64>,
    pub total_ms: Option<u64>,
}

/// Point-in-time view of one machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSnapshot {
    pub component_id: String,
    /// Content type of the rendered artifact.
    pub language: ArtifactLanguage,
    pub state: RenderState,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub metrics: RenderMetrics,
}
