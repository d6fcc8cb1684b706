//! Priority-ordered strategy resolution.
//!
//! The resolver walks a ranked ladder of transformation strategies over a
//! failing artifact source, handing each one the auxiliary blocks found in
//! the surrounding message. The first strategy whose predicate matches and
//! whose produced confidence clears the acceptance threshold wins; everything
//! below it is skipped. Candidate output must pass a structural balance check
//! before it can win.
//!
//! Canonical ladder, highest priority first:
//! - 100 `CSS_MODULE_INLINE`: rewrite a stylesheet-module import into an
//!   inlined, case-converted style mapping
//! - 90 `STYLESHEET_INJECTION`: replace a stylesheet import with a runtime
//!   `<style>` injection carrying the block verbatim
//! - 80 `DATA_INLINE`: inline a matched structured-data block in place of a
//!   data import
//! - 10 `IMPORT_REMOVAL`: remove the unresolved import entirely

mod balance;
mod reference;
mod resolver;
mod strategies;
mod stylesheet;
mod types;

pub use balance::{check_balance, is_balanced};
pub use reference::{parse_references, ModuleReference, ReferenceKind};
pub use resolver::StrategyResolver;
pub use strategies::{CssModuleInline, DataInline, ImportRemoval, StylesheetInjection};
pub use types::{
    AppliedChange, ChangeKind, ResolutionContext, ResolutionResult, StrategyAttempt,
    StrategyOutcome,
};

use crate::error::Result;

/// A named, priority-ranked transformation rule.
///
/// Strategies are registered once at resolver construction; priority is a
/// total order with ties broken by registration order. `applies` must be a
/// cheap predicate; `apply` does the actual rewrite and reports a confidence
/// in `[0, 1]`.
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn priority(&self) -> u32;

    fn applies(&self, ctx: &ResolutionContext<'_>) -> bool;

    fn apply(&self, ctx: &ResolutionContext<'_>) -> Result<StrategyOutcome>;
}
