use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::RecoveryRequest;
use crate::breaker::CircuitBreakerManager;
use crate::cache::ResolutionCache;
use crate::classify::{Classification, ErrorClassifier, HeuristicClassifier};
use crate::config::ExecutorConfig;
use crate::error::RecoveryError;
use crate::executor::fallback::{FallbackRequest, FallbackService};
use crate::executor::stage::StageDiagnostic;
use crate::resolve::{check_balance, ResolutionResult, StrategyResolver};

/// Result of one staged recovery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub resolution: ResolutionResult,
    pub stages: Vec<StageDiagnostic>,
    /// Absent when the circuit rejected the attempt before classification.
    pub classification: Option<Classification>,
    pub circuit_open: bool,
    pub elapsed_ms: u64,
}

/// Runs one recovery attempt through its stages, consulting the artifact's
/// circuit first and feeding the outcome back into it.
pub struct StrategyExecutor {
    breaker: Arc<CircuitBreakerManager>,
    resolver: Arc<StrategyResolver>,
    cache: Arc<ResolutionCache>,
    classifier: Box<dyn ErrorClassifier>,
    fallback: Option<Arc<dyn FallbackService>>,
    config: ExecutorConfig,
}

impl StrategyExecutor {
    pub fn new(
        breaker: Arc<CircuitBreakerManager>,
        resolver: Arc<StrategyResolver>,
        cache: Arc<ResolutionCache>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            breaker,
            resolver,
            cache,
            classifier: Box::new(HeuristicClassifier),
            fallback: None,
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_fallback(mut self, service: Arc<dyn FallbackService>) -> Self {
        self.fallback = Some(service);
        self
    }

    pub async fn execute(&self, request: &RecoveryRequest) -> RecoveryOutcome {
        let started = Instant::now();
        let mut stages = Vec::new();

        debug!(
            artifact_id = %request.artifact_id,
            attempt_id = %request.attempt_id,
            "Executing recovery attempt"
        );

        // Stage: circuit check. An open circuit rejects before any work.
        let stage_started = Instant::now();
        let state = self.breaker.check(&request.artifact_id);
        if !state.allows_requests() {
            warn!(
                artifact_id = %request.artifact_id,
                "Recovery rejected by open circuit"
            );
            stages.push(StageDiagnostic::failed(
                "circuit_check",
                elapsed_ms(stage_started),
                RecoveryError::CircuitOpen {
                    artifact_id: request.artifact_id.clone(),
                }
                .to_string(),
            ));
            return RecoveryOutcome {
                success: false,
                resolution: ResolutionResult::unresolved(elapsed_ms(started), Vec::new()),
                stages,
                classification: None,
                circuit_open: true,
                elapsed_ms: elapsed_ms(started),
            };
        }
        stages.push(
            StageDiagnostic::passed("circuit_check", elapsed_ms(stage_started))
                .with_detail(state.to_string()),
        );

        // Stage: classification. Purely diagnostic; it cannot fail the run.
        let stage_started = Instant::now();
        let classification = self
            .classifier
            .classify(&request.error_message, &request.source);
        stages.push(
            StageDiagnostic::passed("classification", elapsed_ms(stage_started)).with_detail(
                format!(
                    "{} (confidence {:.2})",
                    classification.category, classification.confidence
                ),
            ),
        );

        // Stage: strategy resolution, memoized by request fingerprint.
        let stage_started = Instant::now();
        let ladder_result = self.cache.get_or_resolve(&self.resolver, request);
        if ladder_result.success {
            stages.push(
                StageDiagnostic::passed("resolution", elapsed_ms(stage_started)).with_detail(
                    format!(
                        "{} (confidence {:.2})",
                        ladder_result.strategy_used.as_deref().unwrap_or("unknown"),
                        ladder_result.confidence
                    ),
                ),
            );
            self.breaker
                .record(&request.artifact_id, true, stage_started.elapsed(), None);
            info!(
                artifact_id = %request.artifact_id,
                strategy = ladder_result.strategy_used.as_deref().unwrap_or("unknown"),
                "Recovery resolved by strategy ladder"
            );
            return RecoveryOutcome {
                success: true,
                resolution: (*ladder_result).clone(),
                stages,
                classification: Some(classification),
                circuit_open: false,
                elapsed_ms: elapsed_ms(started),
            };
        }
        let failure_summary = ladder_result
            .attempts
            .iter()
            .rev()
            .find_map(|a| a.failure.clone())
            .unwrap_or_else(|| "no strategy matched".to_string());
        stages.push(
            StageDiagnostic::failed("resolution", elapsed_ms(stage_started), failure_summary)
                .with_detail(format!(
                    "{} strategy attempt(s)",
                    ladder_result.attempts.len()
                )),
        );

        // Stage: external fallback, bounded by its own timeout.
        let mut resolution = (*ladder_result).clone();
        match &self.fallback {
            Some(service) if self.config.fallback_enabled => {
                let stage_started = Instant::now();
                let fallback_request = FallbackRequest::from(request);
                let attempt = tokio::time::timeout(
                    self.config.fallback_timeout(),
                    service.attempt_fix(&fallback_request),
                )
                .await;
                match attempt {
                    Err(_) => {
                        let elapsed = elapsed_ms(stage_started);
                        stages.push(StageDiagnostic::failed(
                            "fallback",
                            elapsed,
                            RecoveryError::StageTimeout {
                                stage: "fallback".to_string(),
                                elapsed_ms: elapsed,
                            }
                            .to_string(),
                        ));
                    }
                    Ok(Err(error)) => {
                        stages.push(StageDiagnostic::failed(
                            "fallback",
                            elapsed_ms(stage_started),
                            error.to_string(),
                        ));
                    }
                    Ok(Ok(fix)) => match check_balance(&fix.transformed) {
                        Err(reason) => {
                            stages.push(StageDiagnostic::failed(
                                "fallback",
                                elapsed_ms(stage_started),
                                format!("fix failed structural balance check: {}", reason),
                            ));
                        }
                        Ok(()) => {
                            stages.push(
                                StageDiagnostic::passed("fallback", elapsed_ms(stage_started))
                                    .with_detail(format!(
                                        "{} (confidence {:.2})",
                                        fix.strategy, fix.confidence
                                    )),
                            );
                            resolution.success = true;
                            resolution.output = fix.transformed;
                            resolution.confidence = fix.confidence;
                            resolution.strategy_used = Some(fix.strategy);
                            resolution.elapsed_ms = elapsed_ms(started);
                            self.breaker.record(
                                &request.artifact_id,
                                true,
                                stage_started.elapsed(),
                                None,
                            );
                            info!(
                                artifact_id = %request.artifact_id,
                                "Recovery resolved by fallback service"
                            );
                            return RecoveryOutcome {
                                success: true,
                                resolution,
                                stages,
                                classification: Some(classification),
                                circuit_open: false,
                                elapsed_ms: elapsed_ms(started),
                            };
                        }
                    },
                }
            }
            Some(_) => {
                stages.push(StageDiagnostic::skipped("fallback", "fallback disabled"));
            }
            None => {
                stages.push(StageDiagnostic::skipped(
                    "fallback",
                    "no fallback service configured",
                ));
            }
        }

        let failure_reason = stages
            .iter()
            .rev()
            .find_map(|s| s.error.as_deref())
            .unwrap_or("all stages exhausted");
        self.breaker.record(
            &request.artifact_id,
            false,
            started.elapsed(),
            Some(failure_reason),
        );
        warn!(
            artifact_id = %request.artifact_id,
            attempts = resolution.attempts.len(),
            "Recovery attempt exhausted all stages"
        );
        RecoveryOutcome {
            success: false,
            resolution,
            stages,
            classification: Some(classification),
            circuit_open: false,
            elapsed_ms: elapsed_ms(started),
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
