use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Circuit state for one artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; requests flow.
    #[default]
    Closed,
    /// Tripped; requests are rejected until the recovery timeout elapses.
    Open,
    /// Probing; limited requests admitted to test recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether a recovery attempt may proceed in this state.
    pub fn allows_requests(&self) -> bool {
        !self.is_open()
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        write!(f, "{}", s)
    }
}

/// One circuit transition, kept for diagnostics and broadcast to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerEvent {
    pub artifact_id: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub reason: String,
    pub at: DateTime<Utc>,
}

impl BreakerEvent {
    pub fn new(
        artifact_id: impl Into<String>,
        from: CircuitState,
        to: CircuitState,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            from,
            to,
            reason: reason.into(),
            at: Utc::now(),
        }
    }
}

/// Point-in-time view of one circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub artifact_id: String,
    pub state: CircuitState,
    /// Outcomes currently inside the monitoring window.
    pub window_volume: usize,
    pub failure_rate: f64,
    /// Mean recorded latency across the window, in milliseconds.
    pub avg_latency_ms: f64,
    /// Consecutive half-open probe successes.
    pub consecutive_successes: u32,
}
