use std::time::Instant;

use tracing::{debug, info};

use crate::artifact::RecoveryRequest;
use crate::config::ResolverConfig;
use crate::extract::{BlockExtractor, FencedBlockExtractor};
use crate::resolve::balance::check_balance;
use crate::resolve::reference::parse_references;
use crate::resolve::strategies::{CssModuleInline, DataInline, ImportRemoval, StylesheetInjection};
use crate::resolve::types::{ResolutionContext, ResolutionResult, StrategyAttempt};
use crate::resolve::ResolutionStrategy;

/// Walks the strategy ladder over a failing artifact and returns the first
/// acceptable transformation.
///
/// Resolution is pure with respect to the request: the same request always
/// yields the same result, which is what makes results safe to memoize.
pub struct StrategyResolver {
    strategies: Vec<Box<dyn ResolutionStrategy>>,
    extractor: Box<dyn BlockExtractor>,
    acceptance_threshold: f64,
}

impl StrategyResolver {
    /// Resolver with the canonical ladder registered.
    pub fn new(config: &ResolverConfig) -> Self {
        let mut resolver = Self::empty(config);
        resolver.register(Box::new(CssModuleInline));
        resolver.register(Box::new(StylesheetInjection));
        resolver.register(Box::new(DataInline));
        resolver.register(Box::new(ImportRemoval));
        resolver
    }

    /// Resolver with no strategies, for callers assembling their own ladder.
    pub fn empty(config: &ResolverConfig) -> Self {
        Self {
            strategies: Vec::new(),
            extractor: Box::new(FencedBlockExtractor::new()),
            acceptance_threshold: config.acceptance_threshold,
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn BlockExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Registers a strategy, keeping the ladder sorted by descending
    /// priority. The sort is stable, so equal priorities keep registration
    /// order.
    pub fn register(&mut self, strategy: Box<dyn ResolutionStrategy>) {
        self.strategies.push(strategy);
        self.strategies
            .sort_by_key(|s| std::cmp::Reverse(s.priority()));
    }

    /// Registered strategy names in evaluation order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn resolve(&self, request: &RecoveryRequest) -> ResolutionResult {
        self.resolve_with_deadline(request, None)
    }

    /// Resolves with an optional deadline. The deadline is checked between
    /// strategies, never mid-strategy; remaining strategies are recorded as
    /// skipped.
    pub fn resolve_with_deadline(
        &self,
        request: &RecoveryRequest,
        deadline: Option<Instant>,
    ) -> ResolutionResult {
        let started = Instant::now();
        let blocks = self.extractor.extract(&request.message_text);
        // Import rewrites only make sense for script-family sources; other
        // artifact text that happens to look like an import stays untouched.
        let references = if request.language.is_script() {
            parse_references(&request.source)
        } else {
            Vec::new()
        };
        let ctx = ResolutionContext::new(request, &blocks, &references);

        debug!(
            artifact_id = %request.artifact_id,
            blocks = blocks.len(),
            references = references.len(),
            "Starting strategy resolution"
        );

        let mut attempts = Vec::new();
        for strategy in &self.strategies {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                attempts.push(StrategyAttempt::skipped(
                    strategy.name(),
                    "resolution budget exhausted",
                ));
                continue;
            }

            let strategy_started = Instant::now();
            if !strategy.applies(&ctx) {
                attempts.push(StrategyAttempt::no_match(
                    strategy.name(),
                    elapsed_ms(strategy_started),
                ));
                continue;
            }

            match strategy.apply(&ctx) {
                Err(error) => {
                    debug!(
                        strategy = strategy.name(),
                        error = %error,
                        "Strategy failed to apply"
                    );
                    attempts.push(StrategyAttempt::failed(
                        strategy.name(),
                        elapsed_ms(strategy_started),
                        error.to_string(),
                    ));
                }
                Ok(outcome) => {
                    if let Err(reason) = check_balance(&outcome.output) {
                        attempts.push(StrategyAttempt::failed(
                            strategy.name(),
                            elapsed_ms(strategy_started),
                            format!("structural balance check failed: {}", reason),
                        ));
                        continue;
                    }
                    if outcome.confidence > self.acceptance_threshold {
                        attempts.push(StrategyAttempt::accepted(
                            strategy.name(),
                            outcome.confidence,
                            elapsed_ms(strategy_started),
                        ));
                        info!(
                            artifact_id = %request.artifact_id,
                            strategy = strategy.name(),
                            confidence = outcome.confidence,
                            "Resolution strategy accepted"
                        );
                        return ResolutionResult::resolved(
                            outcome.output,
                            outcome.changes,
                            outcome.confidence,
                            strategy.name(),
                            elapsed_ms(started),
                            attempts,
                        );
                    }
                    attempts.push(StrategyAttempt::below_threshold(
                        strategy.name(),
                        outcome.confidence,
                        self.acceptance_threshold,
                        elapsed_ms(strategy_started),
                    ));
                }
            }
        }

        info!(
            artifact_id = %request.artifact_id,
            attempts = attempts.len(),
            "No strategy produced an acceptable resolution"
        );
        ResolutionResult::unresolved(elapsed_ms(started), attempts)
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactLanguage, AuxiliaryBlock, BlockKind};
    use crate::error::{RecoveryError, Result};
    use crate::resolve::types::StrategyOutcome;

    struct FixedStrategy {
        name: &'static str,
        priority: u32,
        applies: bool,
        confidence: f64,
        output: &'static str,
    }

    impl ResolutionStrategy for FixedStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        fn applies(&self, _ctx: &ResolutionContext<'_>) -> bool {
            self.applies
        }

        fn apply(&self, _ctx: &ResolutionContext<'_>) -> Result<StrategyOutcome> {
            Ok(StrategyOutcome::new(self.output, Vec::new(), self.confidence))
        }
    }

    struct FailingStrategy;

    impl ResolutionStrategy for FailingStrategy {
        fn name(&self) -> &'static str {
            "ALWAYS_FAILS"
        }

        fn priority(&self) -> u32 {
            95
        }

        fn applies(&self, _ctx: &ResolutionContext<'_>) -> bool {
            true
        }

        fn apply(&self, _ctx: &ResolutionContext<'_>) -> Result<StrategyOutcome> {
            Err(RecoveryError::Strategy("deliberate".to_string()))
        }
    }

    /// Treats the whole message as one stylesheet, fenced or not.
    struct WholeMessageStylesheet;

    impl BlockExtractor for WholeMessageStylesheet {
        fn extract(&self, message_text: &str) -> Vec<AuxiliaryBlock> {
            vec![AuxiliaryBlock::new(BlockKind::Stylesheet, message_text)]
        }
    }

    fn request() -> RecoveryRequest {
        RecoveryRequest::new("artifact-1", "const a = 1;\n", "boom")
    }

    #[test]
    fn test_ladder_sorted_by_descending_priority() {
        let resolver = StrategyResolver::new(&ResolverConfig::default());
        assert_eq!(
            resolver.strategy_names(),
            vec![
                "CSS_MODULE_INLINE",
                "STYLESHEET_INJECTION",
                "DATA_INLINE",
                "IMPORT_REMOVAL"
            ]
        );
    }

    #[test]
    fn test_registration_order_breaks_priority_ties() {
        let mut resolver = StrategyResolver::empty(&ResolverConfig::default());
        resolver.register(Box::new(FixedStrategy {
            name: "FIRST",
            priority: 50,
            applies: false,
            confidence: 0.0,
            output: "",
        }));
        resolver.register(Box::new(FixedStrategy {
            name: "SECOND",
            priority: 50,
            applies: false,
            confidence: 0.0,
            output: "",
        }));
        assert_eq!(resolver.strategy_names(), vec!["FIRST", "SECOND"]);
    }

    #[test]
    fn test_first_acceptable_strategy_wins() {
        let mut resolver = StrategyResolver::empty(&ResolverConfig::default());
        resolver.register(Box::new(FixedStrategy {
            name: "LOW",
            priority: 10,
            applies: true,
            confidence: 0.99,
            output: "low",
        }));
        resolver.register(Box::new(FixedStrategy {
            name: "HIGH",
            priority: 90,
            applies: true,
            confidence: 0.8,
            output: "high",
        }));

        let result = resolver.resolve(&request());
        assert!(result.success);
        assert_eq!(result.strategy_used.as_deref(), Some("HIGH"));
        assert_eq!(result.output, "high");
        // LOW was never evaluated.
        assert_eq!(result.attempts.len(), 1);
    }

    #[test]
    fn test_below_threshold_falls_through() {
        let mut resolver = StrategyResolver::empty(&ResolverConfig::default());
        resolver.register(Box::new(FixedStrategy {
            name: "WEAK",
            priority: 90,
            applies: true,
            confidence: 0.5,
            output: "weak",
        }));
        resolver.register(Box::new(FixedStrategy {
            name: "STRONG",
            priority: 10,
            applies: true,
            confidence: 0.9,
            output: "strong",
        }));

        let result = resolver.resolve(&request());
        assert!(result.success);
        assert_eq!(result.strategy_used.as_deref(), Some("STRONG"));
        assert_eq!(result.attempts.len(), 2);
        assert!(result.attempts[0].failure.as_deref().is_some_and(|f| f.contains("threshold")));
    }

    #[test]
    fn test_strategy_error_recorded_and_ladder_continues() {
        let mut resolver = StrategyResolver::empty(&ResolverConfig::default());
        resolver.register(Box::new(FailingStrategy));
        resolver.register(Box::new(FixedStrategy {
            name: "BACKUP",
            priority: 10,
            applies: true,
            confidence: 0.9,
            output: "backup",
        }));

        let result = resolver.resolve(&request());
        assert!(result.success);
        assert_eq!(result.strategy_used.as_deref(), Some("BACKUP"));
        assert_eq!(result.attempts[0].failure.as_deref(), Some("Strategy error: deliberate"));
    }

    #[test]
    fn test_unbalanced_output_is_a_strategy_failure() {
        let mut resolver = StrategyResolver::empty(&ResolverConfig::default());
        resolver.register(Box::new(FixedStrategy {
            name: "BROKEN",
            priority: 90,
            applies: true,
            confidence: 0.99,
            output: "function f() { return 1;",
        }));

        let result = resolver.resolve(&request());
        assert!(!result.success);
        assert!(result.attempts[0]
            .failure
            .as_deref()
            .is_some_and(|f| f.contains("balance")));
    }

    #[test]
    fn test_no_match_produces_failure_result() {
        let resolver = StrategyResolver::new(&ResolverConfig::default());
        let result = resolver.resolve(&request());
        assert!(!result.success);
        assert!(result.output.is_empty());
        assert!(result.strategy_used.is_none());
        assert_eq!(result.attempts.len(), 4);
        assert!(result.attempts.iter().all(|a| !a.matched));
    }

    #[test]
    fn test_expired_deadline_skips_all_strategies() {
        let mut resolver = StrategyResolver::empty(&ResolverConfig::default());
        resolver.register(Box::new(FixedStrategy {
            name: "NEVER_RUN",
            priority: 90,
            applies: true,
            confidence: 0.99,
            output: "x",
        }));

        let deadline = Instant::now() - std::time::Duration::from_millis(1);
        let result = resolver.resolve_with_deadline(&request(), Some(deadline));
        assert!(!result.success);
        assert!(result.attempts[0]
            .failure
            .as_deref()
            .is_some_and(|f| f.contains("budget")));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = StrategyResolver::new(&ResolverConfig::default());
        let request = RecoveryRequest::new(
            "artifact-9",
            "import styles from './x.module.css';\nconst a = styles.primary;\n",
            "Cannot find module './x.module.css'",
        )
        .with_message_text("```css\n.primary { color: red; }\n```");

        let first = resolver.resolve(&request);
        let second = resolver.resolve(&request);
        assert!(first.success);
        assert_eq!(first.output, second.output);
        assert_eq!(first.strategy_used, second.strategy_used);
    }

    #[test]
    fn test_injected_extractor_feeds_the_ladder() {
        let request = RecoveryRequest::new(
            "artifact-1",
            "import styles from './x.module.css';\nconst a = styles.primary;\n",
            "Cannot find module './x.module.css'",
        )
        .with_message_text(".primary { color: red; }");

        // Unfenced CSS is invisible to the default extractor, so only
        // removal can fire.
        let resolver = StrategyResolver::new(&ResolverConfig::default());
        let result = resolver.resolve(&request);
        assert_eq!(result.strategy_used.as_deref(), Some("IMPORT_REMOVAL"));

        let resolver = StrategyResolver::new(&ResolverConfig::default())
            .with_extractor(Box::new(WholeMessageStylesheet));
        let result = resolver.resolve(&request);
        assert_eq!(result.strategy_used.as_deref(), Some("CSS_MODULE_INLINE"));
        assert!(result.output.contains("primary: { color: \"red\" }"));
    }

    #[test]
    fn test_non_script_artifact_gets_no_import_references() {
        let resolver = StrategyResolver::new(&ResolverConfig::default());
        // A diagram label that happens to look like an import statement.
        let request = RecoveryRequest::new(
            "artifact-9",
            "graph TD\n  A[import data from './data.json';] --> B\n",
            "Cannot find module './data.json'",
        )
        .with_language(ArtifactLanguage::from_tag("mermaid"));

        let result = resolver.resolve(&request);
        assert!(!result.success);
        assert!(result.attempts.iter().all(|a| !a.matched));
    }
}
