use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::artifact::ArtifactLanguage;
use crate::config::{PhaseTimeouts, RenderConfig};
use crate::error::{RecoveryError, Result};
use crate::render::types::{
    next_state, RenderEvent, RenderMetrics, RenderSnapshot, RenderState, RenderTransition,
};

const MAX_TRANSITION_HISTORY: usize = 100;

struct MachineState {
    state: RenderState,
    retry_count: u32,
    last_error: Option<String>,
    /// Entry instant of the current phase, for metrics.
    phase_entered: Instant,
    /// First `Start`; survives retries, cleared by `Reset`.
    started_at: Option<Instant>,
    metrics: RenderMetrics,
    /// Bumped on every transition; stale timers check it and stand down.
    generation: u64,
    timer: Option<JoinHandle<()>>,
    history: VecDeque<RenderTransition>,
}

struct Inner {
    component_id: String,
    config: RenderConfig,
    machine: Mutex<MachineState>,
    event_tx: broadcast::Sender<RenderTransition>,
}

/// What to schedule after a transition: fire `event` after `delay` unless
/// the generation has moved on.
struct ArmSpec {
    delay: Duration,
    event: RenderEvent,
    generation: u64,
}

/// Render lifecycle machine for one component.
///
/// All transitions go through the table in [`next_state`]; the machine adds
/// the retry budget guard, per-phase timeout timers, metrics, and the
/// transition broadcast. Timers only run inside a tokio runtime; without
/// one, transitions still work but phases never time out on their own.
pub struct RenderStateMachine {
    inner: Arc<Inner>,
    language: ArtifactLanguage,
}

impl RenderStateMachine {
    pub fn new(component_id: impl Into<String>, config: RenderConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(16));
        Self {
            inner: Arc::new(Inner {
                component_id: component_id.into(),
                config,
                machine: Mutex::new(MachineState {
                    state: RenderState::Idle,
                    retry_count: 0,
                    last_error: None,
                    phase_entered: Instant::now(),
                    started_at: None,
                    metrics: RenderMetrics::default(),
                    generation: 0,
                    timer: None,
                    history: VecDeque::new(),
                }),
                event_tx,
            }),
            language: ArtifactLanguage::default(),
        }
    }

    /// Tags the machine with the rendered artifact's content type.
    pub fn with_language(mut self, language: ArtifactLanguage) -> Self {
        self.language = language;
        self
    }

    /// Applies one event, returning the new state or an error when the
    /// transition is invalid from the current state.
    pub fn apply(&self, event: RenderEvent) -> Result<RenderState> {
        Inner::apply(&self.inner, event)
    }

    pub fn start(&self) -> Result<RenderState> {
        self.apply(RenderEvent::Start)
    }

    /// Records the error message and moves to `Errored`.
    pub fn report_error(&self, message: impl Into<String>) -> Result<RenderState> {
        self.inner.machine.lock().last_error = Some(message.into());
        self.apply(RenderEvent::Error)
    }

    /// Requests a retry. Rejected once the retry budget is spent; otherwise
    /// the machine waits out the retry delay and re-enters `Initializing`.
    pub fn retry(&self) -> Result<RenderState> {
        self.apply(RenderEvent::Retry)
    }

    pub fn reset(&self) -> Result<RenderState> {
        self.apply(RenderEvent::Reset)
    }

    /// Destroys the machine. Idempotent; a destroyed machine accepts no
    /// further events.
    pub fn destroy(&self) {
        if self.state().is_terminal() {
            return;
        }
        let _ = self.apply(RenderEvent::Destroy);
    }

    pub fn state(&self) -> RenderState {
        self.inner.machine.lock().state
    }

    pub fn snapshot(&self) -> RenderSnapshot {
        let machine = self.inner.machine.lock();
        RenderSnapshot {
            component_id: self.inner.component_id.clone(),
            language: self.language.clone(),
            state: machine.state,
            retry_count: machine.retry_count,
            max_retries: self.inner.config.max_retries,
            last_error: machine.last_error.clone(),
            metrics: machine.metrics.clone(),
        }
    }

    pub fn metrics(&self) -> RenderMetrics {
        self.inner.machine.lock().metrics.clone()
    }

    /// Applied transitions, oldest first.
    pub fn history(&self) -> Vec<RenderTransition> {
        self.inner.machine.lock().history.iter().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RenderTransition> {
        self.inner.event_tx.subscribe()
    }
}

impl Drop for RenderStateMachine {
    fn drop(&mut self) {
        // Abort any armed timer so it cannot outlive the machine's owner.
        if let Some(timer) = self.inner.machine.lock().timer.take() {
            timer.abort();
        }
    }
}

impl Inner {
    fn apply(self: &Arc<Self>, event: RenderEvent) -> Result<RenderState> {
        let (transition, arm) = {
            let mut machine = self.machine.lock();
            self.apply_locked(&mut machine, event)?
        };
        self.after_transition(transition.clone(), arm);
        Ok(transition.to)
    }

    /// Core transition under the machine lock. Returns the applied
    /// transition and what, if anything, to schedule next.
    fn apply_locked(
        &self,
        machine: &mut MachineState,
        event: RenderEvent,
    ) -> Result<(RenderTransition, Option<ArmSpec>)> {
        let from = machine.state;
        let Some(to) = next_state(from, event) else {
            return Err(RecoveryError::InvalidRenderTransition {
                from: from.to_string(),
                event: event.to_string(),
            });
        };

        if event == RenderEvent::Retry && machine.retry_count >= self.config.max_retries {
            warn!(
                component_id = %self.component_id,
                retry_count = machine.retry_count,
                "Retry rejected, budget exhausted"
            );
            return Err(RecoveryError::RetryBudgetExhausted {
                component_id: self.component_id.clone(),
                max_retries: self.config.max_retries,
            });
        }

        let now = Instant::now();

        // Close out the phase being left.
        if from.is_phase() {
            let elapsed = now.duration_since(machine.phase_entered).as_millis() as u64;
            *machine
                .metrics
                .phase_ms
                .entry(from.name().to_string())
                .or_insert(0) += elapsed;
        }

        match event {
            RenderEvent::Start => {
                machine.started_at = Some(now);
            }
            RenderEvent::Retry => {
                machine.retry_count += 1;
            }
            RenderEvent::Timeout => {
                machine.last_error = Some(match phase_timeout(&self.config.phase_timeouts, from) {
                    Some(budget) => format!(
                        "phase '{}' timed out after {}ms",
                        from.name(),
                        budget.as_millis() as u64
                    ),
                    // Watchdog timeouts arrive outside the timed phases.
                    None => format!("timed out in '{}'", from.name()),
                });
            }
            RenderEvent::Rendered => {
                machine.metrics.total_ms = machine
                    .started_at
                    .map(|s| now.duration_since(s).as_millis() as u64);
            }
            RenderEvent::Reset => {
                machine.retry_count = 0;
                machine.last_error = None;
                machine.started_at = None;
                machine.metrics = RenderMetrics::default();
            }
            _ => {}
        }

        machine.state = to;
        machine.phase_entered = now;
        machine.generation += 1;
        if let Some(timer) = machine.timer.take() {
            timer.abort();
        }

        let transition = RenderTransition {
            component_id: self.component_id.clone(),
            from,
            to,
            event,
            retry_count: machine.retry_count,
            at: Utc::now(),
        };
        if machine.history.len() >= MAX_TRANSITION_HISTORY {
            machine.history.pop_front();
        }
        machine.history.push_back(transition.clone());

        debug!(
            component_id = %self.component_id,
            from = %from,
            to = %to,
            event = %event,
            "Render transition"
        );

        let arm = self.arm_spec_for(to, machine.generation);
        Ok((transition, arm))
    }

    /// Timeout for phases, retry delay for `Retrying`.
    fn arm_spec_for(&self, state: RenderState, generation: u64) -> Option<ArmSpec> {
        if let Some(delay) = phase_timeout(&self.config.phase_timeouts, state) {
            return Some(ArmSpec {
                delay,
                event: RenderEvent::Timeout,
                generation,
            });
        }
        if state == RenderState::Retrying {
            return Some(ArmSpec {
                delay: self.config.retry_delay(),
                event: RenderEvent::RetryDelayElapsed,
                generation,
            });
        }
        None
    }

    fn after_transition(self: &Arc<Self>, transition: RenderTransition, arm: Option<ArmSpec>) {
        let _ = self.event_tx.send(transition);
        let Some(spec) = arm else {
            return;
        };
        // Timers need a runtime; without one the machine is event-driven only.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let weak = Arc::downgrade(self);
        let task = handle.spawn(async move {
            tokio::time::sleep(spec.delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire_scheduled(spec.generation, spec.event);
            }
        });
        let mut machine = self.machine.lock();
        if machine.generation == spec.generation {
            machine.timer = Some(task);
        } else {
            task.abort();
        }
    }

    /// Fires a scheduled event if the machine has not moved on since the
    /// timer was armed. The generation check and the transition happen under
    /// one lock, so a stale timer can never race a fresh transition.
    fn fire_scheduled(self: &Arc<Self>, generation: u64, event: RenderEvent) {
        let applied = {
            let mut machine = self.machine.lock();
            if machine.generation != generation {
                return;
            }
            self.apply_locked(&mut machine, event)
        };
        if let Ok((transition, arm)) = applied {
            self.after_transition(transition, arm);
        }
    }
}

fn phase_timeout(timeouts: &PhaseTimeouts, state: RenderState) -> Option<Duration> {
    let ms = match state {
        RenderState::Initializing => timeouts.initializing_ms,
        RenderState::Loading => timeouts.loading_ms,
        RenderState::Configuring => timeouts.configuring_ms,
        RenderState::Mounting => timeouts.mounting_ms,
        RenderState::Bundling => timeouts.bundling_ms,
        RenderState::Rendering => timeouts.rendering_ms,
        _ => return None,
    };
    Some(Duration::from_millis(ms))
}
