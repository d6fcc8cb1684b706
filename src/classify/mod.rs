//! Heuristic error classification.
//!
//! Categorizes the failure that triggered recovery (stylesheet reference,
//! missing reference, malformed syntax, generic). Classification routes
//! diagnostics only; it never changes which strategies run or in what order.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static QUOTED_MODULE_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Module path quoted inside an error message, e.g.
/// `Cannot find module './Button.module.css'`.
fn quoted_module_pattern() -> &'static Regex {
    QUOTED_MODULE_PATTERN.get_or_init(|| {
        Regex::new(r#"['"]([^'"]+\.[A-Za-z0-9]+)['"]"#).expect("valid quoted-module pattern")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    StylesheetReference,
    MissingReference,
    MalformedSyntax,
    Generic,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StylesheetReference => write!(f, "stylesheet_reference"),
            Self::MissingReference => write!(f, "missing_reference"),
            Self::MalformedSyntax => write!(f, "malformed_syntax"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// Category plus confidence, with the referenced module path when one could
/// be pulled out of the error text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub confidence: f64,
    pub referenced_path: Option<String>,
}

impl Classification {
    pub fn new(category: ErrorCategory, confidence: f64) -> Self {
        Self {
            category,
            confidence,
            referenced_path: None,
        }
    }

    pub fn with_referenced_path(mut self, path: impl Into<String>) -> Self {
        self.referenced_path = Some(path.into());
        self
    }
}

/// Seam for error categorization.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error_message: &str, source: &str) -> Classification;
}

/// Default classifier matching only unambiguous, structured patterns.
/// Everything ambiguous lands in the generic bucket rather than guessing.
#[derive(Debug, Default, Clone)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self
    }

    fn extract_referenced_path(error_message: &str) -> Option<String> {
        quoted_module_pattern()
            .captures(error_message)
            .map(|caps| caps[1].to_string())
    }

    fn is_stylesheet_path(path: &str) -> bool {
        let lower = path.to_ascii_lowercase();
        lower.ends_with(".css")
            || lower.ends_with(".scss")
            || lower.ends_with(".sass")
            || lower.ends_with(".less")
    }

    fn mentions_missing_module(error_message: &str) -> bool {
        let lower = error_message.to_ascii_lowercase();
        lower.contains("cannot find module")
            || lower.contains("could not resolve")
            || lower.contains("failed to resolve")
            || lower.contains("module not found")
            || lower.contains("is not defined")
    }

    fn mentions_syntax_error(error_message: &str) -> bool {
        error_message.contains("SyntaxError")
            || error_message.contains("Unexpected token")
            || error_message.contains("Unexpected end of input")
            || error_message.contains("Unterminated string")
    }
}

impl ErrorClassifier for HeuristicClassifier {
    fn classify(&self, error_message: &str, source: &str) -> Classification {
        let referenced = Self::extract_referenced_path(error_message);

        if let Some(path) = &referenced {
            if Self::is_stylesheet_path(path) {
                let mut confidence = 0.85;
                // The source importing the same path corroborates the category.
                if source.contains(path.as_str()) {
                    confidence = 0.95;
                }
                return Classification::new(ErrorCategory::StylesheetReference, confidence)
                    .with_referenced_path(path.clone());
            }
            if Self::mentions_missing_module(error_message) {
                let classification = Classification::new(ErrorCategory::MissingReference, 0.85);
                return classification.with_referenced_path(path.clone());
            }
        }

        if Self::mentions_missing_module(error_message) {
            return Classification::new(ErrorCategory::MissingReference, 0.7);
        }

        if Self::mentions_syntax_error(error_message) {
            return Classification::new(ErrorCategory::MalformedSyntax, 0.8);
        }

        Classification::new(ErrorCategory::Generic, 0.3)
    }
}
