use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Passed,
    Failed,
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Passed => "passed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Record of one pipeline stage, kept on the outcome for auditability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostic {
    pub stage: String,
    pub status: StageStatus,
    pub elapsed_ms: u64,
    pub detail: Option<String>,
    pub error: Option<String>,
}

impl StageDiagnostic {
    pub fn passed(stage: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Passed,
            elapsed_ms,
            detail: None,
            error: None,
        }
    }

    pub fn failed(stage: impl Into<String>, elapsed_ms: u64, error: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Failed,
            elapsed_ms,
            detail: None,
            error: Some(error.into()),
        }
    }

    pub fn skipped(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Skipped,
            elapsed_ms: 0,
            detail: Some(reason.into()),
            error: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.status == StageStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_constructors() {
        let passed = StageDiagnostic::passed("resolution", 12).with_detail("CSS_MODULE_INLINE");
        assert_eq!(passed.status, StageStatus::Passed);
        assert_eq!(passed.detail.as_deref(), Some("CSS_MODULE_INLINE"));
        assert!(!passed.is_failure());

        let failed = StageDiagnostic::failed("fallback", 20_000, "timed out");
        assert!(failed.is_failure());
        assert_eq!(failed.error.as_deref(), Some("timed out"));

        let skipped = StageDiagnostic::skipped("fallback", "disabled");
        assert_eq!(skipped.status, StageStatus::Skipped);
        assert_eq!(skipped.elapsed_ms, 0);
    }

    #[test]
    fn test_stage_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StageStatus::Skipped).unwrap(),
            "\"skipped\""
        );
    }
}
