use serde::{Deserialize, Serialize};

use crate::executor::StageDiagnostic;
use crate::resolve::ResolutionResult;

/// Caller preferences for one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowOptions {
    /// When false, every successful result still requires confirmation.
    pub auto_apply: bool,
    /// Per-run override of the configured auto-apply confidence floor.
    pub confirmation_threshold: Option<f64>,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            auto_apply: true,
            confirmation_threshold: None,
        }
    }
}

impl WorkflowOptions {
    pub fn with_auto_apply(mut self, auto_apply: bool) -> Self {
        self.auto_apply = auto_apply;
        self
    }

    pub fn with_confirmation_threshold(mut self, threshold: f64) -> Self {
        self.confirmation_threshold = Some(threshold);
        self
    }
}

/// Recommended follow-up for the caller, from a fixed decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    /// Result is trustworthy enough to apply without asking.
    AutoApply,
    /// Result succeeded but the caller must confirm before applying.
    ConfirmAndApply,
    /// Recovery was refused by an open circuit; back off and retry later.
    WaitAndRetry,
    /// Nothing automatic worked; a human has to look at the artifact.
    ManualIntervention,
}

impl NextAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NextAction::AutoApply => "auto_apply",
            NextAction::ConfirmAndApply => "confirm_and_apply",
            NextAction::WaitAndRetry => "wait_and_retry",
            NextAction::ManualIntervention => "manual_intervention",
        }
    }
}

impl std::fmt::Display for NextAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Externally visible outcome of one end-to-end workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    /// Absent when prerequisites failed before a session was created.
    pub session_id: Option<String>,
    pub resolution: Option<ResolutionResult>,
    pub elapsed_ms: u64,
    /// Ordered trace of every stage that ran.
    pub stages: Vec<StageDiagnostic>,
    /// Whether the caller must confirm before the result may be applied.
    pub requires_interaction: bool,
    pub next_action: NextAction,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_action_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&NextAction::ConfirmAndApply).unwrap(),
            "\"confirm_and_apply\""
        );
        assert_eq!(NextAction::WaitAndRetry.to_string(), "wait_and_retry");
    }

    #[test]
    fn test_options_default_to_auto_apply() {
        let options = WorkflowOptions::default();
        assert!(options.auto_apply);
        assert!(options.confirmation_threshold.is_none());

        let options = WorkflowOptions::default()
            .with_auto_apply(false)
            .with_confirmation_threshold(0.95);
        assert!(!options.auto_apply);
        assert_eq!(options.confirmation_threshold, Some(0.95));
    }
}
