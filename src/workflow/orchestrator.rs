use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::artifact::RecoveryRequest;
use crate::breaker::CircuitBreakerManager;
use crate::cache::ResolutionCache;
use crate::config::RecoveryConfig;
use crate::error::RecoveryError;
use crate::executor::{FallbackService, StageDiagnostic, StrategyExecutor};
use crate::resolve::{check_balance, ResolutionResult, StrategyResolver};
use crate::session::{RecoveryStateManager, SessionStatus, SessionUpdate};
use crate::workflow::types::{NextAction, WorkflowOptions, WorkflowResult};

/// Top-level façade sequencing one recovery request end to end.
///
/// Stage order: prerequisite validation, circuit check, classification,
/// strategy execution, result validation, interaction assessment,
/// completion. The middle three run inside [`StrategyExecutor`] and
/// contribute their diagnostics to the trace. A failed stage aborts the
/// rest; `run` itself never fails, every outcome is a structured
/// [`WorkflowResult`].
pub struct WorkflowOrchestrator {
    executor: StrategyExecutor,
    breaker: Arc<CircuitBreakerManager>,
    sessions: Arc<RecoveryStateManager>,
    last_sweep: Mutex<Instant>,
    config: RecoveryConfig,
}

impl WorkflowOrchestrator {
    pub fn new(config: RecoveryConfig) -> Self {
        let breaker = Arc::new(CircuitBreakerManager::new(config.breaker.clone()));
        let resolver = Arc::new(StrategyResolver::new(&config.resolver));
        let cache = Arc::new(ResolutionCache::new(&config.cache));
        let executor = StrategyExecutor::new(
            Arc::clone(&breaker),
            resolver,
            cache,
            config.executor.clone(),
        );
        let sessions = Arc::new(RecoveryStateManager::new(config.session.clone()));
        Self {
            executor,
            breaker,
            sessions,
            last_sweep: Mutex::new(Instant::now()),
            config,
        }
    }

    pub fn with_fallback(mut self, service: Arc<dyn FallbackService>) -> Self {
        self.executor = self.executor.with_fallback(service);
        self
    }

    /// Breaker handle, for event subscription and manual control.
    pub fn breaker(&self) -> Arc<CircuitBreakerManager> {
        Arc::clone(&self.breaker)
    }

    /// Session registry handle, for observation and cancellation.
    pub fn sessions(&self) -> Arc<RecoveryStateManager> {
        Arc::clone(&self.sessions)
    }

    /// Runs one request through the full workflow.
    pub async fn run(
        &self,
        request: &RecoveryRequest,
        options: &WorkflowOptions,
    ) -> WorkflowResult {
        let started = Instant::now();
        let mut stages: Vec<StageDiagnostic> = Vec::new();

        self.maybe_sweep_sessions();

        info!(
            artifact_id = %request.artifact_id,
            attempt_id = %request.attempt_id,
            "Starting recovery workflow"
        );

        // Prerequisites run before any side effect. A malformed request must
        // leave no breaker record and no session behind.
        let stage_started = Instant::now();
        if let Err(reason) = self.check_prerequisites(request) {
            let message = RecoveryError::InvalidRequest(reason).to_string();
            warn!(
                artifact_id = %request.artifact_id,
                error = %message,
                "Prerequisite validation failed"
            );
            stages.push(StageDiagnostic::failed(
                "prerequisite_validation",
                elapsed_ms(stage_started),
                message.as_str(),
            ));
            return WorkflowResult {
                success: false,
                session_id: None,
                resolution: None,
                elapsed_ms: elapsed_ms(started),
                stages,
                requires_interaction: true,
                next_action: NextAction::ManualIntervention,
                errors: vec![message],
            };
        }
        stages.push(StageDiagnostic::passed(
            "prerequisite_validation",
            elapsed_ms(stage_started),
        ));

        let session_id = self
            .sessions
            .start_session(&request.artifact_id, "circuit_check");
        let _ = self.sessions.update_session(
            &session_id,
            SessionUpdate::status(SessionStatus::Analyzing)
                .with_stage("strategy_execution")
                .with_progress(25),
        );

        // Circuit check, classification, resolution and fallback run inside
        // the executor; its diagnostics join the trace.
        let stage_started = Instant::now();
        let budget = self.config.workflow.workflow_timeout();
        let outcome = match tokio::time::timeout(budget, self.executor.execute(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let message = RecoveryError::StageTimeout {
                    stage: "strategy_execution".to_string(),
                    elapsed_ms: elapsed_ms(stage_started),
                }
                .to_string();
                warn!(artifact_id = %request.artifact_id, "Workflow timed out");
                self.breaker.record(
                    &request.artifact_id,
                    false,
                    stage_started.elapsed(),
                    Some(message.as_str()),
                );
                stages.push(StageDiagnostic::failed(
                    "strategy_execution",
                    elapsed_ms(stage_started),
                    message.as_str(),
                ));
                let _ = self.sessions.fail_session(&session_id, message.as_str());
                return WorkflowResult {
                    success: false,
                    session_id: Some(session_id),
                    resolution: None,
                    elapsed_ms: elapsed_ms(started),
                    stages,
                    requires_interaction: true,
                    next_action: NextAction::ManualIntervention,
                    errors: vec![message],
                };
            }
        };
        stages.extend(outcome.stages.iter().cloned());

        if outcome.circuit_open {
            let errors = stage_errors(&stages);
            let _ = self.sessions.fail_session(
                &session_id,
                errors.last().map_or("circuit open", |e| e.as_str()),
            );
            return WorkflowResult {
                success: false,
                session_id: Some(session_id),
                resolution: Some(outcome.resolution),
                elapsed_ms: elapsed_ms(started),
                stages,
                requires_interaction: true,
                next_action: NextAction::WaitAndRetry,
                errors,
            };
        }

        let mut resolution = outcome.resolution;
        if !outcome.success {
            let errors = stage_errors(&stages);
            let _ = self.sessions.complete_session(&session_id, resolution.clone());
            return WorkflowResult {
                success: false,
                session_id: Some(session_id),
                resolution: Some(resolution),
                elapsed_ms: elapsed_ms(started),
                stages,
                requires_interaction: true,
                next_action: NextAction::ManualIntervention,
                errors,
            };
        }

        let _ = self.sessions.update_session(
            &session_id,
            SessionUpdate::status(SessionStatus::Recovering)
                .with_stage("result_validation")
                .with_progress(70),
        );

        let stage_started = Instant::now();
        let validation_errors = self.validate_result(request, &resolution);
        if !validation_errors.is_empty() {
            let message = validation_errors.join("; ");
            warn!(
                artifact_id = %request.artifact_id,
                error = %message,
                "Result validation failed"
            );
            stages.push(StageDiagnostic::failed(
                "result_validation",
                elapsed_ms(stage_started),
                message,
            ));
            resolution.success = false;
            resolution.validation_errors = validation_errors.clone();
            let _ = self.sessions.complete_session(&session_id, resolution.clone());
            return WorkflowResult {
                success: false,
                session_id: Some(session_id),
                resolution: Some(resolution),
                elapsed_ms: elapsed_ms(started),
                stages,
                requires_interaction: true,
                next_action: NextAction::ManualIntervention,
                errors: validation_errors,
            };
        }
        stages.push(
            StageDiagnostic::passed("result_validation", elapsed_ms(stage_started)).with_detail(
                format!(
                    "{} change(s), confidence {:.2}",
                    resolution.changes.len(),
                    resolution.confidence
                ),
            ),
        );

        let stage_started = Instant::now();
        let confirmation_floor = options
            .confirmation_threshold
            .unwrap_or(self.config.workflow.auto_apply_threshold);
        let requires_interaction =
            !options.auto_apply || resolution.confidence < confirmation_floor;
        let detail = if !options.auto_apply {
            "confirmation required: auto-apply disabled by caller".to_string()
        } else if requires_interaction {
            format!(
                "confirmation required: confidence {:.2} below floor {:.2}",
                resolution.confidence, confirmation_floor
            )
        } else {
            format!(
                "auto-apply approved at confidence {:.2}",
                resolution.confidence
            )
        };
        stages.push(
            StageDiagnostic::passed("interaction_assessment", elapsed_ms(stage_started))
                .with_detail(detail),
        );

        let stage_started = Instant::now();
        let _ = self.sessions.complete_session(&session_id, resolution.clone());
        let next_action = if requires_interaction {
            NextAction::ConfirmAndApply
        } else {
            NextAction::AutoApply
        };
        stages.push(
            StageDiagnostic::passed("completion", elapsed_ms(stage_started))
                .with_detail(next_action.as_str()),
        );

        info!(
            artifact_id = %request.artifact_id,
            session_id = %session_id,
            strategy = resolution.strategy_used.as_deref().unwrap_or("none"),
            confidence = resolution.confidence,
            next_action = %next_action,
            "Workflow completed"
        );

        WorkflowResult {
            success: true,
            session_id: Some(session_id),
            resolution: Some(resolution),
            elapsed_ms: elapsed_ms(started),
            stages,
            requires_interaction,
            next_action,
            errors: Vec::new(),
        }
    }

    /// Cancels all active sessions for an artifact. Safe when none exist.
    pub fn cancel_artifact(&self, artifact_id: &str) -> usize {
        self.sessions.cancel_artifact_recovery(artifact_id)
    }

    /// Runs the retention sweep at most once per configured interval.
    fn maybe_sweep_sessions(&self) {
        {
            let mut last = self.last_sweep.lock();
            if last.elapsed() < self.config.session.sweep_interval() {
                return;
            }
            *last = Instant::now();
        }
        let purged = self.sessions.purge_expired();
        if purged > 0 {
            info!(purged, "Purged expired recovery sessions");
        }
    }

    fn check_prerequisites(&self, request: &RecoveryRequest) -> Result<(), String> {
        if request.artifact_id.trim().is_empty() {
            return Err("artifact_id must not be empty".to_string());
        }
        if request.source.trim().is_empty() {
            return Err("source must not be empty".to_string());
        }
        if request.error_message.trim().is_empty() {
            return Err("error_message must not be empty".to_string());
        }
        let limits = &self.config.workflow;
        if request.source.len() > limits.max_source_bytes {
            return Err(format!(
                "source exceeds size ceiling ({} > {} bytes)",
                request.source.len(),
                limits.max_source_bytes
            ));
        }
        if request.message_text.len() > limits.max_message_bytes {
            return Err(format!(
                "message text exceeds size ceiling ({} > {} bytes)",
                request.message_text.len(),
                limits.max_message_bytes
            ));
        }
        Ok(())
    }

    /// Output gates applied after a successful resolution.
    fn validate_result(
        &self,
        request: &RecoveryRequest,
        resolution: &ResolutionResult,
    ) -> Vec<String> {
        let mut errors = Vec::new();
        if resolution.output.trim().is_empty() {
            errors.push("resolved output is empty".to_string());
        }
        let floor = self.config.resolver.acceptance_threshold;
        if resolution.confidence < floor {
            errors.push(format!(
                "confidence {:.2} below acceptance floor {:.2}",
                resolution.confidence, floor
            ));
        }
        if let Err(reason) = check_balance(&resolution.output) {
            errors.push(format!("structural balance check failed: {}", reason));
        }
        if resolution.output == request.source {
            errors.push("resolved output is identical to the failing source".to_string());
        }
        errors
    }
}

fn stage_errors(stages: &[StageDiagnostic]) -> Vec<String> {
    stages.iter().filter_map(|s| s.error.clone()).collect()
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
