use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{RecoveryError, Result};

const CONFIG_FILE: &str = "recovery.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub breaker: BreakerConfig,
    pub resolver: ResolverConfig,
    pub executor: ExecutorConfig,
    pub workflow: WorkflowConfig,
    pub render: RenderConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
}

impl RecoveryConfig {
    pub async fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, dir: &Path) -> Result<()> {
        self.validate()?;
        let config_path = dir.join(CONFIG_FILE);
        let content =
            toml::to_string_pretty(self).map_err(|e| RecoveryError::Config(e.to_string()))?;
        fs::write(&config_path, content).await?;
        Ok(())
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        // Breaker validation
        if !(0.0..=1.0).contains(&self.breaker.failure_rate_threshold) {
            errors.push("breaker.failure_rate_threshold must be between 0.0 and 1.0");
        }
        if self.breaker.min_request_volume == 0 {
            errors.push("breaker.min_request_volume must be greater than 0");
        }
        if self.breaker.recovery_timeout_secs == 0 {
            errors.push("breaker.recovery_timeout_secs must be greater than 0");
        }
        if self.breaker.success_threshold == 0 {
            errors.push("breaker.success_threshold must be greater than 0");
        }
        if self.breaker.monitoring_window_secs == 0 {
            errors.push("breaker.monitoring_window_secs must be greater than 0");
        }

        // Resolver validation
        if !(0.0..=1.0).contains(&self.resolver.acceptance_threshold) {
            errors.push("resolver.acceptance_threshold must be between 0.0 and 1.0");
        }

        // Executor validation
        if self.executor.fallback_timeout_secs == 0 {
            errors.push("executor.fallback_timeout_secs must be greater than 0");
        }

        // Workflow validation
        if !(0.0..=1.0).contains(&self.workflow.auto_apply_threshold) {
            errors.push("workflow.auto_apply_threshold must be between 0.0 and 1.0");
        }
        if self.workflow.workflow_timeout_secs == 0 {
            errors.push("workflow.workflow_timeout_secs must be greater than 0");
        }
        if self.workflow.workflow_timeout_secs < self.executor.fallback_timeout_secs {
            errors.push("workflow.workflow_timeout_secs must be >= executor.fallback_timeout_secs");
        }
        if self.workflow.max_source_bytes == 0 {
            errors.push("workflow.max_source_bytes must be greater than 0");
        }
        if self.workflow.max_message_bytes < self.workflow.max_source_bytes {
            errors.push("workflow.max_message_bytes must be >= workflow.max_source_bytes");
        }

        // Render validation
        if self.render.retry_delay_ms == 0 {
            errors.push("render.retry_delay_ms must be greater than 0");
        }
        if self.render.event_capacity == 0 {
            errors.push("render.event_capacity must be greater than 0");
        }
        let timeouts = &self.render.phase_timeouts;
        if timeouts.initializing_ms == 0
            || timeouts.loading_ms == 0
            || timeouts.configuring_ms == 0
            || timeouts.mounting_ms == 0
            || timeouts.bundling_ms == 0
            || timeouts.rendering_ms == 0
        {
            errors.push("render.phase_timeouts entries must all be greater than 0");
        }

        // Cache validation
        if self.cache.max_entries == 0 {
            errors.push("cache.max_entries must be greater than 0");
        }
        if self.cache.entry_ttl_secs == 0 {
            errors.push("cache.entry_ttl_secs must be greater than 0");
        }
        if self.cache.resolution_budget_ms == 0 {
            errors.push("cache.resolution_budget_ms must be greater than 0");
        }

        // Session validation
        if self.session.event_capacity == 0 {
            errors.push("session.event_capacity must be greater than 0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RecoveryError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failure rate within the monitoring window at which a circuit opens.
    pub failure_rate_threshold: f64,
    /// Minimum windowed request volume before a circuit may open.
    pub min_request_volume: usize,
    /// Seconds an open circuit waits before allowing a half-open probe.
    pub recovery_timeout_secs: u64,
    /// Consecutive half-open successes required to close the circuit.
    pub success_threshold: u32,
    /// Sliding window over which the failure rate is computed.
    pub monitoring_window_secs: u64,
    /// Transition events retained for diagnostics.
    pub event_history: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            min_request_volume: 5,
            recovery_timeout_secs: 60,
            success_threshold: 3,
            monitoring_window_secs: 300, // 5 minutes
            event_history: 100,
        }
    }
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    pub fn monitoring_window(&self) -> Duration {
        Duration::from_secs(self.monitoring_window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Confidence a strategy must exceed for its output to win.
    pub acceptance_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Whether the external auto-fix fallback runs when resolution fails.
    pub fallback_enabled: bool,
    /// Timeout for a single fallback call.
    pub fallback_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            fallback_timeout_secs: 20,
        }
    }
}

impl ExecutorConfig {
    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Confidence below which a successful result still requires confirmation.
    pub auto_apply_threshold: f64,
    /// Ceiling for one end-to-end workflow run.
    pub workflow_timeout_secs: u64,
    /// Size ceiling for the failing source text.
    pub max_source_bytes: usize,
    /// Size ceiling for the surrounding message text.
    pub max_message_bytes: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            auto_apply_threshold: 0.8,
            workflow_timeout_secs: 30,
            max_source_bytes: 512 * 1024,
            max_message_bytes: 1024 * 1024,
        }
    }
}

impl WorkflowConfig {
    pub fn workflow_timeout(&self) -> Duration {
        Duration::from_secs(self.workflow_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Retry budget for a render attempt.
    pub max_retries: u32,
    /// Fixed delay before a retry re-enters initializing.
    pub retry_delay_ms: u64,
    /// Capacity of the transition broadcast stream.
    pub event_capacity: usize,
    pub phase_timeouts: PhaseTimeouts,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1500,
            event_capacity: 64,
            phase_timeouts: PhaseTimeouts::default(),
        }
    }
}

impl RenderConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Per-phase timeouts for the render state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseTimeouts {
    pub initializing_ms: u64,
    pub loading_ms: u64,
    pub configuring_ms: u64,
    pub mounting_ms: u64,
    pub bundling_ms: u64,
    pub rendering_ms: u64,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        Self {
            initializing_ms: 10_000,
            loading_ms: 15_000,
            configuring_ms: 10_000,
            mounting_ms: 10_000,
            bundling_ms: 30_000,
            rendering_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum memoized resolution results.
    pub max_entries: u64,
    /// Per-entry time-to-live.
    pub entry_ttl_secs: u64,
    /// Wall-clock budget for one resolution pass.
    pub resolution_budget_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            entry_ttl_secs: 300, // 5 minutes
            resolution_budget_ms: 5_000,
        }
    }
}

impl CacheConfig {
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_ttl_secs)
    }

    pub fn resolution_budget(&self) -> Duration {
        Duration::from_millis(self.resolution_budget_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Terminal sessions older than this are purged by the sweep. Zero
    /// purges them at the next sweep.
    pub retention_secs: u64,
    /// Minimum spacing between retention sweeps.
    pub sweep_interval_secs: u64,
    /// Capacity of the session-update broadcast stream.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
            sweep_interval_secs: 60,
            event_capacity: 128,
        }
    }
}

impl SessionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
