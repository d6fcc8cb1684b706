use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resolve::ResolutionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, no stage has run yet.
    #[default]
    Idle,
    /// Classifying the failure.
    Analyzing,
    /// Walking the strategy ladder or waiting on the fallback.
    Recovering,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::Analyzing => "Analyzing",
            SessionStatus::Recovering => "Recovering",
            SessionStatus::Completed => "Completed",
            SessionStatus::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

/// One observable recovery run for an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySession {
    pub id: String,
    pub artifact_id: String,
    pub status: SessionStatus,
    /// Name of the workflow stage most recently entered.
    pub stage: String,
    /// Completion estimate, `0..=100`.
    pub progress: u8,
    pub result: Option<ResolutionResult>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl RecoverySession {
    pub fn new(artifact_id: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            artifact_id: artifact_id.into(),
            status: SessionStatus::Idle,
            stage: stage.into(),
            progress: 0,
            result: None,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Partial session update; unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
    pub stage: Option<String>,
    pub progress: Option<u8>,
    pub error: Option<String>,
}

impl SessionUpdate {
    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Snapshot broadcast after every session mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub artifact_id: String,
    pub status: SessionStatus,
    pub stage: String,
    pub progress: u8,
    pub at: DateTime<Utc>,
}

impl SessionEvent {
    pub(crate) fn from_session(session: &RecoverySession) -> Self {
        Self {
            session_id: session.id.clone(),
            artifact_id: session.artifact_id.clone(),
            status: session.status,
            stage: session.stage.clone(),
            progress: session.progress,
            at: Utc::now(),
        }
    }
}
