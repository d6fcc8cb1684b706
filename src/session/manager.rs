use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::error::{RecoveryError, Result};
use crate::resolve::ResolutionResult;
use crate::session::types::{RecoverySession, SessionEvent, SessionStatus, SessionUpdate};
use crate::utils::error_snippet;

/// Stored failure reasons are bounded; full errors live in stage diagnostics.
const MAX_REASON_BYTES: usize = 500;

/// Sessions plus the artifact index, guarded together so the index can
/// never disagree with the table.
#[derive(Default)]
struct SessionTable {
    sessions: HashMap<String, RecoverySession>,
    /// Artifact id to ids of its non-terminal sessions.
    active_by_artifact: HashMap<String, HashSet<String>>,
}

impl SessionTable {
    fn drop_from_index(&mut self, artifact_id: &str, session_id: &str) {
        if let Some(active) = self.active_by_artifact.get_mut(artifact_id) {
            active.remove(session_id);
            if active.is_empty() {
                self.active_by_artifact.remove(artifact_id);
            }
        }
    }
}

/// Registry of recovery sessions with update broadcast.
///
/// Terminal sessions ignore further updates; a sweep removes them once they
/// outlive the configured retention.
pub struct RecoveryStateManager {
    table: RwLock<SessionTable>,
    events: Mutex<VecDeque<SessionEvent>>,
    event_tx: broadcast::Sender<SessionEvent>,
    config: SessionConfig,
}

impl RecoveryStateManager {
    pub fn new(config: SessionConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(16));
        Self {
            table: RwLock::new(SessionTable::default()),
            events: Mutex::new(VecDeque::with_capacity(config.event_capacity)),
            event_tx,
            config,
        }
    }

    /// Creates an idle session for the artifact and returns its id.
    pub fn start_session(
        &self,
        artifact_id: impl Into<String>,
        stage: impl Into<String>,
    ) -> String {
        let session = RecoverySession::new(artifact_id, stage);
        let id = session.id.clone();
        {
            let mut table = self.table.write();
            table
                .active_by_artifact
                .entry(session.artifact_id.clone())
                .or_default()
                .insert(id.clone());
            table.sessions.insert(id.clone(), session.clone());
        }
        info!(
            session_id = %id,
            artifact_id = %session.artifact_id,
            "Recovery session started"
        );
        self.emit(&session);
        id
    }

    /// Applies a partial update. Updates to a terminal session are ignored
    /// with a warning rather than treated as errors.
    pub fn update_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<RecoverySession> {
        let snapshot = {
            let mut guard = self.table.write();
            let table = &mut *guard;
            let Some(session) = table.sessions.get_mut(session_id) else {
                return Err(RecoveryError::SessionNotFound(session_id.to_string()));
            };
            if session.status.is_terminal() {
                warn!(
                    session_id = %session_id,
                    status = %session.status,
                    "Ignoring update to terminal session"
                );
                return Ok(session.clone());
            }

            if let Some(status) = update.status {
                session.status = status;
            }
            if let Some(stage) = update.stage {
                session.stage = stage;
            }
            if let Some(progress) = update.progress {
                session.progress = progress.min(100);
            }
            if let Some(error) = update.error {
                session.error = Some(error_snippet(&error, MAX_REASON_BYTES));
            }
            if session.status.is_terminal() {
                session.ended_at = Some(Utc::now());
            }
            let snapshot = session.clone();
            if snapshot.status.is_terminal() {
                table.drop_from_index(&snapshot.artifact_id, session_id);
            }
            snapshot
        };
        self.emit(&snapshot);
        Ok(snapshot)
    }

    /// Finishes a session from a resolution result: `Completed` when the
    /// resolution succeeded, `Failed` otherwise. Calling this on an already
    /// terminal session is a no-op.
    pub fn complete_session(
        &self,
        session_id: &str,
        result: ResolutionResult,
    ) -> Result<RecoverySession> {
        let snapshot = {
            let mut guard = self.table.write();
            let table = &mut *guard;
            let Some(session) = table.sessions.get_mut(session_id) else {
                return Err(RecoveryError::SessionNotFound(session_id.to_string()));
            };
            if session.status.is_terminal() {
                warn!(
                    session_id = %session_id,
                    status = %session.status,
                    "Ignoring completion of terminal session"
                );
                return Ok(session.clone());
            }

            session.status = if result.success {
                SessionStatus::Completed
            } else {
                SessionStatus::Failed
            };
            session.progress = 100;
            if !result.success && session.error.is_none() {
                let reason = result
                    .attempts
                    .iter()
                    .rev()
                    .find_map(|a| a.failure.clone())
                    .unwrap_or_else(|| "no strategy produced an acceptable fix".to_string());
                session.error = Some(error_snippet(&reason, MAX_REASON_BYTES));
            }
            session.result = Some(result);
            session.ended_at = Some(Utc::now());
            let snapshot = session.clone();
            table.drop_from_index(&snapshot.artifact_id, session_id);
            snapshot
        };
        info!(
            session_id = %session_id,
            status = %snapshot.status,
            "Recovery session finished"
        );
        self.emit(&snapshot);
        Ok(snapshot)
    }

    /// Marks a session failed with an explicit reason.
    pub fn fail_session(
        &self,
        session_id: &str,
        reason: impl Into<String>,
    ) -> Result<RecoverySession> {
        self.update_session(
            session_id,
            SessionUpdate::status(SessionStatus::Failed).with_error(reason),
        )
    }

    pub fn session(&self, session_id: &str) -> Option<RecoverySession> {
        self.table.read().sessions.get(session_id).cloned()
    }

    /// All sessions for the artifact, terminal included, oldest first.
    pub fn sessions_for_artifact(&self, artifact_id: &str) -> Vec<RecoverySession> {
        let table = self.table.read();
        let mut sessions: Vec<_> = table
            .sessions
            .values()
            .filter(|s| s.artifact_id == artifact_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    /// Non-terminal sessions for the artifact, oldest first, resolved
    /// through the index rather than a table scan.
    pub fn active_sessions(&self, artifact_id: &str) -> Vec<RecoverySession> {
        let table = self.table.read();
        let Some(active) = table.active_by_artifact.get(artifact_id) else {
            return Vec::new();
        };
        let mut sessions: Vec<_> = active
            .iter()
            .filter_map(|id| table.sessions.get(id).cloned())
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    pub fn has_active_recovery(&self, artifact_id: &str) -> bool {
        self.table
            .read()
            .active_by_artifact
            .contains_key(artifact_id)
    }

    /// Fails every non-terminal session for the artifact. Safe to call when
    /// nothing is running; returns the number of sessions cancelled.
    pub fn cancel_artifact_recovery(&self, artifact_id: &str) -> usize {
        let cancelled = {
            let mut guard = self.table.write();
            let table = &mut *guard;
            let Some(active) = table.active_by_artifact.remove(artifact_id) else {
                return 0;
            };
            let mut cancelled = Vec::with_capacity(active.len());
            for session_id in active {
                if let Some(session) = table.sessions.get_mut(&session_id) {
                    session.status = SessionStatus::Failed;
                    session.error = Some("cancelled".to_string());
                    session.ended_at = Some(Utc::now());
                    cancelled.push(session.clone());
                }
            }
            cancelled
        };
        for session in &cancelled {
            info!(
                session_id = %session.id,
                artifact_id = %artifact_id,
                "Recovery session cancelled"
            );
            self.emit(session);
        }
        cancelled.len()
    }

    /// Removes terminal sessions older than the retention period. Returns
    /// the number purged.
    pub fn purge_expired(&self) -> usize {
        let retention = chrono::Duration::seconds(self.config.retention_secs as i64);
        let now = Utc::now();
        let mut table = self.table.write();
        let before = table.sessions.len();
        table.sessions.retain(|_, s| {
            let expired = s.status.is_terminal()
                && s.ended_at
                    .map_or(false, |ended| now.signed_duration_since(ended) >= retention);
            !expired
        });
        before - table.sessions.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Retained session events, oldest first.
    pub fn recent_events(&self) -> Vec<SessionEvent> {
        self.events.lock().iter().cloned().collect()
    }

    fn emit(&self, session: &RecoverySession) {
        let event = SessionEvent::from_session(session);
        {
            let mut events = self.events.lock();
            while events.len() >= self.config.event_capacity.max(1) {
                events.pop_front();
            }
            events.push_back(event.clone());
        }
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RecoveryStateManager {
        RecoveryStateManager::new(SessionConfig::default())
    }

    fn success_result() -> ResolutionResult {
        ResolutionResult::resolved(
            "const a = 1;",
            Vec::new(),
            0.9,
            "CSS_MODULE_INLINE",
            5,
            Vec::new(),
        )
    }

    #[test]
    fn test_start_session_is_idle_and_indexed() {
        let manager = manager();
        let id = manager.start_session("artifact-1", "prerequisites");

        let session = manager.session(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Idle);
        assert!(manager.has_active_recovery("artifact-1"));
        assert!(!manager.has_active_recovery("artifact-2"));
    }

    #[test]
    fn test_update_unknown_session_errors() {
        let manager = manager();
        let err = manager
            .update_session("missing", SessionUpdate::status(SessionStatus::Analyzing))
            .unwrap_err();
        assert!(matches!(err, RecoveryError::SessionNotFound(_)));
    }

    #[test]
    fn test_update_applies_partial_fields() {
        let manager = manager();
        let id = manager.start_session("artifact-1", "prerequisites");

        let session = manager
            .update_session(
                &id,
                SessionUpdate::status(SessionStatus::Recovering)
                    .with_stage("strategy_execution")
                    .with_progress(60),
            )
            .unwrap();

        assert_eq!(session.status, SessionStatus::Recovering);
        assert_eq!(session.stage, "strategy_execution");
        assert_eq!(session.progress, 60);
        assert!(session.error.is_none());
    }

    #[test]
    fn test_progress_clamped_to_100() {
        let manager = manager();
        let id = manager.start_session("artifact-1", "prerequisites");
        let session = manager
            .update_session(&id, SessionUpdate::default().with_progress(250))
            .unwrap();
        assert_eq!(session.progress, 100);
    }

    #[test]
    fn test_complete_session_success() {
        let manager = manager();
        let id = manager.start_session("artifact-1", "prerequisites");

        let session = manager.complete_session(&id, success_result()).unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.progress, 100);
        assert!(session.ended_at.is_some());
        assert!(session.result.is_some());
        assert!(!manager.has_active_recovery("artifact-1"));
    }

    #[test]
    fn test_complete_session_failure_carries_reason() {
        let manager = manager();
        let id = manager.start_session("artifact-1", "prerequisites");

        let result = ResolutionResult::unresolved(3, Vec::new());
        let session = manager.complete_session(&id, result).unwrap();

        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.error.is_some());
    }

    #[test]
    fn test_terminal_session_ignores_further_updates() {
        let manager = manager();
        let id = manager.start_session("artifact-1", "prerequisites");
        manager.complete_session(&id, success_result()).unwrap();

        let session = manager
            .update_session(&id, SessionUpdate::status(SessionStatus::Recovering))
            .unwrap();
        assert_eq!(session.status, SessionStatus::Completed);

        // Completing again is a no-op as well.
        let session = manager
            .complete_session(&id, ResolutionResult::unresolved(1, Vec::new()))
            .unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[test]
    fn test_sessions_for_artifact_ordered_and_scoped() {
        let manager = manager();
        let first = manager.start_session("artifact-1", "prerequisites");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let _other = manager.start_session("artifact-2", "prerequisites");
        let second = manager.start_session("artifact-1", "prerequisites");

        let sessions = manager.sessions_for_artifact("artifact-1");
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, first);
        assert_eq!(sessions[1].id, second);
    }

    #[test]
    fn test_active_sessions_scoped_to_artifact() {
        let manager = manager();
        let first = manager.start_session("artifact-1", "prerequisites");
        let _second = manager.start_session("artifact-1", "prerequisites");
        let _other = manager.start_session("artifact-2", "prerequisites");
        manager.complete_session(&first, success_result()).unwrap();

        let active = manager.active_sessions("artifact-1");
        assert_eq!(active.len(), 1);
        assert!(active.iter().all(|s| s.artifact_id == "artifact-1"));
        assert!(manager.active_sessions("artifact-3").is_empty());
    }

    #[test]
    fn test_cancel_artifact_recovery_fails_active_sessions() {
        let manager = manager();
        let first = manager.start_session("artifact-1", "prerequisites");
        let second = manager.start_session("artifact-1", "prerequisites");
        manager.complete_session(&first, success_result()).unwrap();

        let cancelled = manager.cancel_artifact_recovery("artifact-1");
        assert_eq!(cancelled, 1);

        let completed = manager.session(&first).unwrap();
        assert_eq!(completed.status, SessionStatus::Completed);
        let failed = manager.session(&second).unwrap();
        assert_eq!(failed.status, SessionStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("cancelled"));

        // Nothing left to cancel.
        assert_eq!(manager.cancel_artifact_recovery("artifact-1"), 0);
    }

    #[test]
    fn test_purge_expired_removes_only_old_terminal_sessions() {
        let manager = RecoveryStateManager::new(SessionConfig {
            retention_secs: 0,
            ..SessionConfig::default()
        });
        let done = manager.start_session("artifact-1", "prerequisites");
        let _live = manager.start_session("artifact-1", "prerequisites");
        manager.complete_session(&done, success_result()).unwrap();

        // Zero retention: terminal sessions expire immediately.
        assert_eq!(manager.purge_expired(), 1);
        assert!(manager.session(&done).is_none());
        assert_eq!(manager.active_sessions("artifact-1").len(), 1);
    }

    #[test]
    fn test_events_broadcast_and_bounded() {
        let manager = RecoveryStateManager::new(SessionConfig {
            event_capacity: 2,
            ..SessionConfig::default()
        });
        let mut rx = manager.subscribe();

        let id = manager.start_session("artifact-1", "prerequisites");
        manager
            .update_session(&id, SessionUpdate::status(SessionStatus::Analyzing))
            .unwrap();
        manager.complete_session(&id, success_result()).unwrap();

        assert_eq!(rx.try_recv().unwrap().status, SessionStatus::Idle);
        assert_eq!(rx.try_recv().unwrap().status, SessionStatus::Analyzing);
        assert_eq!(rx.try_recv().unwrap().status, SessionStatus::Completed);

        let retained = manager.recent_events();
        assert_eq!(retained.len(), 2);
        assert_eq!(retained[1].status, SessionStatus::Completed);
    }
}
