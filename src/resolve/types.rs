use serde::{Deserialize, Serialize};

use crate::artifact::{AuxiliaryBlock, BlockKind, RecoveryRequest};
use crate::resolve::reference::ModuleReference;

/// What a single applied change did to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    StyleInline,
    StyleInjection,
    DataInline,
    ImportRemoval,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeKind::StyleInline => "style_inline",
            ChangeKind::StyleInjection => "style_injection",
            ChangeKind::DataInline => "data_inline",
            ChangeKind::ImportRemoval => "import_removal",
        };
        write!(f, "{}", s)
    }
}

/// One concrete edit a strategy made, kept for auditability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedChange {
    pub kind: ChangeKind,
    pub original: String,
    pub replacement: String,
    pub description: String,
    pub confidence: f64,
}

impl AppliedChange {
    pub fn new(
        kind: ChangeKind,
        original: impl Into<String>,
        replacement: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            kind,
            original: original.into(),
            replacement: replacement.into(),
            description: description.into(),
            confidence,
        }
    }
}

/// Per-strategy diagnostic recorded while walking the ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: String,
    /// Whether the strategy's predicate matched the context.
    pub matched: bool,
    pub confidence: f64,
    pub elapsed_ms: u64,
    pub failure: Option<String>,
}

impl StrategyAttempt {
    pub fn no_match(strategy: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            strategy: strategy.into(),
            matched: false,
            confidence: 0.0,
            elapsed_ms,
            failure: None,
        }
    }

    pub fn failed(strategy: impl Into<String>, elapsed_ms: u64, failure: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            matched: true,
            confidence: 0.0,
            elapsed_ms,
            failure: Some(failure.into()),
        }
    }

    pub fn below_threshold(
        strategy: impl Into<String>,
        confidence: f64,
        threshold: f64,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            strategy: strategy.into(),
            matched: true,
            confidence,
            elapsed_ms,
            failure: Some(format!(
                "confidence {:.2} did not exceed acceptance threshold {:.2}",
                confidence, threshold
            )),
        }
    }

    pub fn accepted(strategy: impl Into<String>, confidence: f64, elapsed_ms: u64) -> Self {
        Self {
            strategy: strategy.into(),
            matched: true,
            confidence,
            elapsed_ms,
            failure: None,
        }
    }

    pub fn skipped(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            matched: false,
            confidence: 0.0,
            elapsed_ms: 0,
            failure: Some(reason.into()),
        }
    }
}

/// Final outcome of a resolution pass over the strategy ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub success: bool,
    /// Transformed source on success, empty otherwise.
    pub output: String,
    pub changes: Vec<AppliedChange>,
    pub confidence: f64,
    pub strategy_used: Option<String>,
    pub elapsed_ms: u64,
    pub attempts: Vec<StrategyAttempt>,
    pub validation_errors: Vec<String>,
}

impl ResolutionResult {
    pub fn resolved(
        output: impl Into<String>,
        changes: Vec<AppliedChange>,
        confidence: f64,
        strategy_used: impl Into<String>,
        elapsed_ms: u64,
        attempts: Vec<StrategyAttempt>,
    ) -> Self {
        Self {
            success: true,
            output: output.into(),
            changes,
            confidence,
            strategy_used: Some(strategy_used.into()),
            elapsed_ms,
            attempts,
            validation_errors: Vec::new(),
        }
    }

    pub fn unresolved(elapsed_ms: u64, attempts: Vec<StrategyAttempt>) -> Self {
        Self {
            success: false,
            output: String::new(),
            changes: Vec::new(),
            confidence: 0.0,
            strategy_used: None,
            elapsed_ms,
            attempts,
            validation_errors: Vec::new(),
        }
    }
}

/// What a strategy produced before the resolver accepts or rejects it.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub output: String,
    pub changes: Vec<AppliedChange>,
    pub confidence: f64,
}

impl StrategyOutcome {
    pub fn new(output: impl Into<String>, changes: Vec<AppliedChange>, confidence: f64) -> Self {
        Self {
            output: output.into(),
            changes,
            confidence,
        }
    }
}

/// Read-only view of everything a strategy may consult.
pub struct ResolutionContext<'a> {
    pub request: &'a RecoveryRequest,
    pub blocks: &'a [AuxiliaryBlock],
    pub references: &'a [ModuleReference],
}

impl<'a> ResolutionContext<'a> {
    pub fn new(
        request: &'a RecoveryRequest,
        blocks: &'a [AuxiliaryBlock],
        references: &'a [ModuleReference],
    ) -> Self {
        Self {
            request,
            blocks,
            references,
        }
    }

    /// First non-malformed block of the given kind, in message order.
    pub fn usable_block(&self, kind: &BlockKind) -> Option<&'a AuxiliaryBlock> {
        self.blocks.iter().find(|b| b.is_usable_as(kind))
    }

    /// References the error message names, by path or by file name.
    pub fn references_in_error(&self) -> Vec<&'a ModuleReference> {
        let error = &self.request.error_message;
        self.references
            .iter()
            .filter(|r| error.contains(&r.path) || r.file_name().is_some_and(|f| error.contains(f)))
            .collect()
    }
}
