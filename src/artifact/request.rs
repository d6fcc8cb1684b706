use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Content-type tag for failing artifact source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactLanguage {
    #[default]
    Jsx,
    Tsx,
    Javascript,
    Typescript,
    Html,
    Svg,
    Other(String),
}

impl ArtifactLanguage {
    /// Parse a fence info tag ("jsx", "tsx", ...) into a language.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "jsx" | "react" => Self::Jsx,
            "tsx" => Self::Tsx,
            "js" | "javascript" => Self::Javascript,
            "ts" | "typescript" => Self::Typescript,
            "html" => Self::Html,
            "svg" => Self::Svg,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            Self::Jsx => "jsx",
            Self::Tsx => "tsx",
            Self::Javascript => "javascript",
            Self::Typescript => "typescript",
            Self::Html => "html",
            Self::Svg => "svg",
            Self::Other(tag) => tag,
        }
    }

    /// Whether the source is a script-family language that can carry imports.
    pub fn is_script(&self) -> bool {
        matches!(
            self,
            Self::Jsx | Self::Tsx | Self::Javascript | Self::Typescript
        )
    }
}

impl std::fmt::Display for ArtifactLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

/// Immutable description of one artifact-execution failure.
///
/// Created once per failure event and never mutated. The `attempt_id` labels
/// this particular recovery attempt for sessions and telemetry; it does not
/// participate in [`fingerprint`](Self::fingerprint), so retries of identical
/// inputs share a memo entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryRequest {
    pub artifact_id: String,
    /// The failing source text.
    pub source: String,
    /// The error message that triggered recovery.
    pub error_message: String,
    /// Full surrounding message text, searched for auxiliary blocks.
    pub message_text: String,
    pub language: ArtifactLanguage,
    pub attempt_id: String,
    pub created_at: DateTime<Utc>,
}

impl RecoveryRequest {
    pub fn new(
        artifact_id: impl Into<String>,
        source: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            source: source.into(),
            error_message: error_message.into(),
            message_text: String::new(),
            language: ArtifactLanguage::default(),
            attempt_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn with_message_text(mut self, message_text: impl Into<String>) -> Self {
        self.message_text = message_text.into();
        self
    }

    pub fn with_language(mut self, language: ArtifactLanguage) -> Self {
        self.language = language;
        self
    }

    pub fn with_attempt_id(mut self, attempt_id: impl Into<String>) -> Self {
        self.attempt_id = attempt_id.into();
        self
    }

    /// Stable digest over the resolution inputs, used as the memo cache key.
    ///
    /// Fields are length-prefixed so adjacent fields cannot alias
    /// ("ab" + "c" vs "a" + "bc").
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.source.as_str(),
            self.message_text.as_str(),
            self.language.as_tag(),
            self.error_message.as_str(),
        ] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(out, "{:02x}", byte);
        }
        out
    }
}
