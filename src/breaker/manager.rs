use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::breaker::types::{BreakerEvent, BreakerSnapshot, CircuitState};
use crate::config::BreakerConfig;
use crate::utils::error_snippet;

/// Event reasons quote caller-supplied errors; keep them compact.
const MAX_REASON_BYTES: usize = 200;

/// One recorded outcome inside the sliding window.
struct Outcome {
    at: Instant,
    success: bool,
    latency: Duration,
}

struct ArtifactCircuit {
    state: CircuitState,
    window: VecDeque<Outcome>,
    opened_at: Option<Instant>,
    half_open_successes: u32,
}

impl ArtifactCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::new(),
            opened_at: None,
            half_open_successes: 0,
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.window.front() {
            if now.duration_since(front.at) > window {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|o| !o.success).count();
        failures as f64 / self.window.len() as f64
    }

    fn avg_latency_ms(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let total: u128 = self.window.iter().map(|o| o.latency.as_millis()).sum();
        total as f64 / self.window.len() as f64
    }
}

/// Tracks a circuit per artifact and applies all transitions synchronously
/// on the recording thread, so a check immediately after a record sees the
/// new state.
pub struct CircuitBreakerManager {
    config: BreakerConfig,
    circuits: DashMap<String, ArtifactCircuit>,
    events: Mutex<VecDeque<BreakerEvent>>,
    event_tx: broadcast::Sender<BreakerEvent>,
}

impl CircuitBreakerManager {
    pub fn new(config: BreakerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_history.max(16));
        Self {
            circuits: DashMap::new(),
            events: Mutex::new(VecDeque::with_capacity(config.event_history)),
            event_tx,
            config,
        }
    }

    /// Current state for the artifact, applying the open-to-half-open
    /// transition when the recovery timeout has elapsed.
    ///
    /// An artifact with no recorded history reports `Closed` without
    /// allocating a circuit.
    pub fn check(&self, artifact_id: &str) -> CircuitState {
        let Some(mut circuit) = self.circuits.get_mut(artifact_id) else {
            return CircuitState::Closed;
        };
        let mut transition = None;
        if circuit.state == CircuitState::Open {
            let elapsed = circuit
                .opened_at
                .map_or(true, |t| t.elapsed() >= self.config.recovery_timeout());
            if elapsed {
                circuit.state = CircuitState::HalfOpen;
                circuit.half_open_successes = 0;
                transition = Some((
                    CircuitState::Open,
                    CircuitState::HalfOpen,
                    "recovery timeout elapsed, admitting probes".to_string(),
                ));
            }
        }
        let state = circuit.state;
        drop(circuit);
        if let Some((from, to, reason)) = transition {
            self.record_event(artifact_id, from, to, reason);
        }
        state
    }

    /// Records one outcome for the artifact and applies any resulting
    /// transition before returning.
    ///
    /// `error` feeds the transition reason when the outcome trips the
    /// circuit.
    pub fn record(
        &self,
        artifact_id: &str,
        success: bool,
        latency: Duration,
        error: Option<&str>,
    ) {
        let now = Instant::now();
        let mut circuit = self
            .circuits
            .entry(artifact_id.to_string())
            .or_insert_with(ArtifactCircuit::new);

        circuit.prune(now, self.config.monitoring_window());
        circuit.window.push_back(Outcome {
            at: now,
            success,
            latency,
        });

        let transition = match (circuit.state, success) {
            (CircuitState::Closed, false) => {
                let volume = circuit.window.len();
                let rate = circuit.failure_rate();
                if volume >= self.config.min_request_volume
                    && rate >= self.config.failure_rate_threshold
                {
                    circuit.state = CircuitState::Open;
                    circuit.opened_at = Some(now);
                    let mut reason = format!(
                        "failure rate {:.2} over {} request(s) reached threshold {:.2}",
                        rate, volume, self.config.failure_rate_threshold
                    );
                    if let Some(error) = error {
                        reason.push_str(": ");
                        reason.push_str(&error_snippet(error, MAX_REASON_BYTES));
                    }
                    Some((CircuitState::Closed, CircuitState::Open, reason))
                } else {
                    None
                }
            }
            (CircuitState::HalfOpen, true) => {
                circuit.half_open_successes += 1;
                if circuit.half_open_successes >= self.config.success_threshold {
                    let successes = circuit.half_open_successes;
                    circuit.state = CircuitState::Closed;
                    circuit.opened_at = None;
                    circuit.half_open_successes = 0;
                    // Old failures must not immediately re-open a recovered circuit.
                    circuit.window.clear();
                    Some((
                        CircuitState::HalfOpen,
                        CircuitState::Closed,
                        format!("{} consecutive probe success(es)", successes),
                    ))
                } else {
                    None
                }
            }
            (CircuitState::HalfOpen, false) => {
                circuit.state = CircuitState::Open;
                circuit.opened_at = Some(now);
                circuit.half_open_successes = 0;
                let reason = match error {
                    Some(error) => {
                        format!("probe failed: {}", error_snippet(error, MAX_REASON_BYTES))
                    }
                    None => "probe failed".to_string(),
                };
                Some((CircuitState::HalfOpen, CircuitState::Open, reason))
            }
            _ => None,
        };

        drop(circuit);
        if let Some((from, to, reason)) = transition {
            self.record_event(artifact_id, from, to, reason);
        }
    }

    pub fn snapshot(&self, artifact_id: &str) -> Option<BreakerSnapshot> {
        let mut circuit = self.circuits.get_mut(artifact_id)?;
        circuit.prune(Instant::now(), self.config.monitoring_window());
        Some(BreakerSnapshot {
            artifact_id: artifact_id.to_string(),
            state: circuit.state,
            window_volume: circuit.window.len(),
            failure_rate: circuit.failure_rate(),
            avg_latency_ms: circuit.avg_latency_ms(),
            consecutive_successes: circuit.half_open_successes,
        })
    }

    /// Drops the artifact's circuit entirely, forgetting its history.
    pub fn reset(&self, artifact_id: &str) {
        if let Some((_, circuit)) = self.circuits.remove(artifact_id) {
            if circuit.state != CircuitState::Closed {
                self.record_event(
                    artifact_id,
                    circuit.state,
                    CircuitState::Closed,
                    "manual reset".to_string(),
                );
            }
        }
    }

    /// Trips the circuit regardless of recorded outcomes.
    pub fn force_open(&self, artifact_id: &str, reason: impl Into<String>) {
        let mut circuit = self
            .circuits
            .entry(artifact_id.to_string())
            .or_insert_with(ArtifactCircuit::new);
        let from = circuit.state;
        circuit.state = CircuitState::Open;
        circuit.opened_at = Some(Instant::now());
        circuit.half_open_successes = 0;
        drop(circuit);
        if from != CircuitState::Open {
            self.record_event(artifact_id, from, CircuitState::Open, reason.into());
        }
    }

    /// Closes the circuit regardless of recorded outcomes, keeping the
    /// entry but discarding its window.
    pub fn force_close(&self, artifact_id: &str) {
        let Some(mut circuit) = self.circuits.get_mut(artifact_id) else {
            return;
        };
        let from = circuit.state;
        circuit.state = CircuitState::Closed;
        circuit.opened_at = None;
        circuit.half_open_successes = 0;
        circuit.window.clear();
        drop(circuit);
        if from != CircuitState::Closed {
            self.record_event(
                artifact_id,
                from,
                CircuitState::Closed,
                "forced closed".to_string(),
            );
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.event_tx.subscribe()
    }

    /// Retained transition events, oldest first.
    pub fn recent_events(&self) -> Vec<BreakerEvent> {
        self.events.lock().iter().cloned().collect()
    }

    fn record_event(
        &self,
        artifact_id: &str,
        from: CircuitState,
        to: CircuitState,
        reason: String,
    ) {
        info!(
            artifact_id = %artifact_id,
            from = %from,
            to = %to,
            reason = %reason,
            "Circuit transition"
        );
        let event = BreakerEvent::new(artifact_id, from, to, reason);
        {
            let mut events = self.events.lock();
            while events.len() >= self.config.event_history.max(1) {
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

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            recovery_timeout_secs: 0,
            ..BreakerConfig::default()
        }
    }

    fn succeed(manager: &CircuitBreakerManager, artifact_id: &str) {
        manager.record(artifact_id, true, Duration::from_millis(5), None);
    }

    fn fail(manager: &CircuitBreakerManager, artifact_id: &str) {
        manager.record(artifact_id, false, Duration::from_millis(5), None);
    }

    fn open_circuit(manager: &CircuitBreakerManager, artifact_id: &str) {
        for _ in 0..manager.config.min_request_volume {
            fail(manager, artifact_id);
        }
    }

    #[test]
    fn test_unknown_artifact_reports_closed_without_allocating() {
        let manager = CircuitBreakerManager::new(BreakerConfig::default());
        assert_eq!(manager.check("never-seen"), CircuitState::Closed);
        assert!(manager.snapshot("never-seen").is_none());
    }

    #[test]
    fn test_opens_once_volume_and_rate_thresholds_met() {
        let manager = CircuitBreakerManager::new(BreakerConfig::default());
        for _ in 0..4 {
            fail(&manager, "a-1");
            assert_eq!(manager.check("a-1"), CircuitState::Closed);
        }
        fail(&manager, "a-1");
        assert_eq!(manager.check("a-1"), CircuitState::Open);
    }

    #[test]
    fn test_low_failure_rate_keeps_circuit_closed() {
        let manager = CircuitBreakerManager::new(BreakerConfig::default());
        for _ in 0..8 {
            succeed(&manager, "a-1");
        }
        for _ in 0..2 {
            fail(&manager, "a-1");
        }
        // 2 failures over 10 requests is below the 0.5 threshold.
        assert_eq!(manager.check("a-1"), CircuitState::Closed);
    }

    #[test]
    fn test_open_transitions_to_half_open_after_recovery_timeout() {
        let manager = CircuitBreakerManager::new(fast_config());
        open_circuit(&manager, "a-1");
        // Zero recovery timeout: the next check admits probes.
        assert_eq!(manager.check("a-1"), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_closes_after_success_threshold() {
        let manager = CircuitBreakerManager::new(fast_config());
        open_circuit(&manager, "a-1");
        assert_eq!(manager.check("a-1"), CircuitState::HalfOpen);

        succeed(&manager, "a-1");
        succeed(&manager, "a-1");
        assert_eq!(manager.check("a-1"), CircuitState::HalfOpen);
        succeed(&manager, "a-1");
        assert_eq!(manager.check("a-1"), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let manager = CircuitBreakerManager::new(fast_config());
        open_circuit(&manager, "a-1");
        assert_eq!(manager.check("a-1"), CircuitState::HalfOpen);

        fail(&manager, "a-1");
        let snapshot = manager.snapshot("a-1").unwrap();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.consecutive_successes, 0);
    }

    #[test]
    fn test_circuits_are_independent_per_artifact() {
        let manager = CircuitBreakerManager::new(BreakerConfig::default());
        open_circuit(&manager, "a-1");
        assert_eq!(manager.check("a-1"), CircuitState::Open);
        assert_eq!(manager.check("a-2"), CircuitState::Closed);
    }

    #[test]
    fn test_window_prunes_outcomes_older_than_monitoring_window() {
        let config = BreakerConfig {
            monitoring_window_secs: 1,
            ..BreakerConfig::default()
        };
        let manager = CircuitBreakerManager::new(config);
        for _ in 0..4 {
            fail(&manager, "a-1");
        }
        std::thread::sleep(Duration::from_millis(1100));
        fail(&manager, "a-1");
        let snapshot = manager.snapshot("a-1").unwrap();
        // The four old failures fell out of the window.
        assert_eq!(snapshot.window_volume, 1);
        assert_eq!(snapshot.state, CircuitState::Closed);
    }

    #[test]
    fn test_events_recorded_and_bounded() {
        let config = BreakerConfig {
            recovery_timeout_secs: 0,
            event_history: 2,
            ..BreakerConfig::default()
        };
        let manager = CircuitBreakerManager::new(config);

        open_circuit(&manager, "a-1"); // closed -> open
        manager.check("a-1"); // open -> half_open
        fail(&manager, "a-1"); // half_open -> open

        let events = manager.recent_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].to, CircuitState::Open);
    }

    #[test]
    fn test_subscribers_receive_transitions() {
        let manager = CircuitBreakerManager::new(BreakerConfig::default());
        let mut rx = manager.subscribe();
        open_circuit(&manager, "a-1");

        let event = rx.try_recv().unwrap();
        assert_eq!(event.artifact_id, "a-1");
        assert_eq!(event.from, CircuitState::Closed);
        assert_eq!(event.to, CircuitState::Open);
    }

    #[test]
    fn test_reset_forgets_history() {
        let manager = CircuitBreakerManager::new(BreakerConfig::default());
        open_circuit(&manager, "a-1");
        manager.reset("a-1");
        assert_eq!(manager.check("a-1"), CircuitState::Closed);
        assert!(manager.snapshot("a-1").is_none());
    }

    #[test]
    fn test_force_open_trips_without_outcomes() {
        let manager = CircuitBreakerManager::new(BreakerConfig::default());
        manager.force_open("a-1", "manual trip");
        assert_eq!(manager.check("a-1"), CircuitState::Open);
        let events = manager.recent_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, "manual trip");
    }

    #[test]
    fn test_force_close_restores_traffic_and_clears_window() {
        let manager = CircuitBreakerManager::new(BreakerConfig::default());
        open_circuit(&manager, "a-1");
        assert_eq!(manager.check("a-1"), CircuitState::Open);

        manager.force_close("a-1");
        assert_eq!(manager.check("a-1"), CircuitState::Closed);
        let snapshot = manager.snapshot("a-1").unwrap();
        assert_eq!(snapshot.window_volume, 0);
        let events = manager.recent_events();
        assert_eq!(events.last().unwrap().to, CircuitState::Closed);
    }

    #[test]
    fn test_force_close_on_unknown_artifact_is_a_no_op() {
        let manager = CircuitBreakerManager::new(BreakerConfig::default());
        manager.force_close("never-seen");
        assert!(manager.snapshot("never-seen").is_none());
        assert!(manager.recent_events().is_empty());
    }

    #[test]
    fn test_open_reason_carries_error_snippet() {
        let manager = CircuitBreakerManager::new(BreakerConfig::default());
        for _ in 0..4 {
            fail(&manager, "a-1");
        }
        manager.record(
            "a-1",
            false,
            Duration::from_millis(5),
            Some("Cannot find module './theme.css'"),
        );

        let events = manager.recent_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].reason.contains("Cannot find module './theme.css'"));
    }

    #[test]
    fn test_snapshot_reports_average_latency() {
        let manager = CircuitBreakerManager::new(BreakerConfig::default());
        manager.record("a-1", true, Duration::from_millis(10), None);
        manager.record("a-1", true, Duration::from_millis(30), None);

        let snapshot = manager.snapshot("a-1").unwrap();
        assert!((snapshot.avg_latency_ms - 20.0).abs() < 1e-9);
    }
}
