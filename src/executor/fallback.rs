use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::artifact::RecoveryRequest;
use crate::error::Result;

/// Payload handed to an external auto-fix service when every strategy on the
/// ladder has been exhausted.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FallbackRequest {
    pub artifact_id: String,
    pub source: String,
    pub error_message: String,
    pub message_text: String,
    /// Language tag of the failing source, e.g. `jsx`.
    pub language: String,
}

impl From<&RecoveryRequest> for FallbackRequest {
    fn from(request: &RecoveryRequest) -> Self {
        Self {
            artifact_id: request.artifact_id.clone(),
            source: request.source.clone(),
            error_message: request.error_message.clone(),
            message_text: request.message_text.clone(),
            language: request.language.as_tag().to_string(),
        }
    }
}

/// Fix proposed by the fallback service.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FallbackFix {
    /// Full replacement source.
    pub transformed: String,
    pub confidence: f64,
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

fn default_strategy() -> String {
    "FALLBACK_SERVICE".to_string()
}

/// External service of last resort. Implementations wrap whatever transport
/// reaches the actual fixer; the executor owns the timeout.
#[async_trait]
pub trait FallbackService: Send + Sync {
    async fn attempt_fix(&self, request: &FallbackRequest) -> Result<FallbackFix>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_request_carries_language_tag() {
        let request = RecoveryRequest::new("a-1", "const a = 1;", "boom");
        let fallback = FallbackRequest::from(&request);
        assert_eq!(fallback.language, "jsx");
        assert_eq!(fallback.artifact_id, "a-1");
    }

    #[test]
    fn test_fallback_fix_strategy_defaults() {
        let fix: FallbackFix =
            serde_json::from_str(r#"{"transformed": "const a = 1;", "confidence": 0.75}"#).unwrap();
        assert_eq!(fix.strategy, "FALLBACK_SERVICE");
    }
}
