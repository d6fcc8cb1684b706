use std::collections::BTreeSet;

use crate::artifact::BlockKind;
use crate::error::{RecoveryError, Result};
use crate::resolve::reference::{identifier_prefix, ModuleReference, ReferenceKind};
use crate::resolve::stylesheet::{
    class_style_map, escape_template, kebab_to_camel, parse_stylesheet, render_style_object,
};
use crate::resolve::types::{AppliedChange, ChangeKind, ResolutionContext, StrategyOutcome};
use crate::resolve::ResolutionStrategy;

const INLINE_BASE_CONFIDENCE: f64 = 0.6;
const INLINE_COVERAGE_WEIGHT: f64 = 0.35;
const INJECTION_CONFIDENCE: f64 = 0.85;
const JSON_INLINE_CONFIDENCE: f64 = 0.9;
const CSV_INLINE_CONFIDENCE: f64 = 0.8;
const REMOVAL_CONFIDENCE: f64 = 0.8;

/// Rewrites a stylesheet-module import into an inlined style object with
/// camel-cased class keys, so `styles.primary` lookups keep working without
/// the module system.
pub struct CssModuleInline;

impl ResolutionStrategy for CssModuleInline {
    fn name(&self) -> &'static str {
        "CSS_MODULE_INLINE"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn applies(&self, ctx: &ResolutionContext<'_>) -> bool {
        ctx.references
            .iter()
            .any(|r| r.kind == ReferenceKind::StylesheetModule && r.binding.is_some())
            && ctx.usable_block(&BlockKind::Stylesheet).is_some()
    }

    fn apply(&self, ctx: &ResolutionContext<'_>) -> Result<StrategyOutcome> {
        let reference = ctx
            .references
            .iter()
            .find(|r| r.kind == ReferenceKind::StylesheetModule && r.binding.is_some())
            .ok_or_else(|| {
                RecoveryError::Strategy("no bound stylesheet-module reference".to_string())
            })?;
        let block = ctx.usable_block(&BlockKind::Stylesheet).ok_or_else(|| {
            RecoveryError::Strategy("no usable stylesheet block in message".to_string())
        })?;
        let binding = reference.binding.clone().unwrap_or_default();

        let map = class_style_map(&parse_stylesheet(&block.text));
        if map.is_empty() {
            return Err(RecoveryError::Strategy(
                "stylesheet block has no inlineable class rules".to_string(),
            ));
        }

        let object = render_style_object(&binding, &map);
        let output = splice(&ctx.request.source, reference, &object);

        let referenced = referenced_style_keys(&ctx.request.source, &binding);
        let coverage = if referenced.is_empty() {
            1.0
        } else {
            let resolved = referenced.iter().filter(|k| map.contains_key(*k)).count();
            resolved as f64 / referenced.len() as f64
        };
        let confidence = INLINE_BASE_CONFIDENCE + INLINE_COVERAGE_WEIGHT * coverage;

        let change = AppliedChange::new(
            ChangeKind::StyleInline,
            &reference.statement,
            &object,
            format!(
                "Inlined {} class rule(s) from '{}' as `{}`",
                map.len(),
                reference.path,
                binding
            ),
            confidence,
        );
        Ok(StrategyOutcome::new(output, vec![change], confidence))
    }
}

/// Replaces a stylesheet import with a snippet that injects the stylesheet
/// text into the document head at runtime. When the import bound a name, a
/// pass-through mapping keeps `styles.<class>` lookups returning the raw
/// class name.
pub struct StylesheetInjection;

impl ResolutionStrategy for StylesheetInjection {
    fn name(&self) -> &'static str {
        "STYLESHEET_INJECTION"
    }

    fn priority(&self) -> u32 {
        90
    }

    fn applies(&self, ctx: &ResolutionContext<'_>) -> bool {
        ctx.references.iter().any(|r| {
            matches!(
                r.kind,
                ReferenceKind::Stylesheet | ReferenceKind::StylesheetModule
            )
        }) && ctx.usable_block(&BlockKind::Stylesheet).is_some()
    }

    fn apply(&self, ctx: &ResolutionContext<'_>) -> Result<StrategyOutcome> {
        let reference = ctx
            .references
            .iter()
            .find(|r| {
                matches!(
                    r.kind,
                    ReferenceKind::Stylesheet | ReferenceKind::StylesheetModule
                )
            })
            .ok_or_else(|| RecoveryError::Strategy("no stylesheet reference".to_string()))?;
        let block = ctx.usable_block(&BlockKind::Stylesheet).ok_or_else(|| {
            RecoveryError::Strategy("no usable stylesheet block in message".to_string())
        })?;

        let snippet = injection_snippet(
            reference.binding.as_deref(),
            &block.text,
            &ctx.request.artifact_id,
        );
        let output = splice(&ctx.request.source, reference, &snippet);

        let change = AppliedChange::new(
            ChangeKind::StyleInjection,
            &reference.statement,
            &snippet,
            format!(
                "Replaced import of '{}' with a runtime <style> injection",
                reference.path
            ),
            INJECTION_CONFIDENCE,
        );
        Ok(StrategyOutcome::new(
            output,
            vec![change],
            INJECTION_CONFIDENCE,
        ))
    }
}

/// Inlines a structured-data block in place of a data import. JSON is
/// validated and re-serialized; CSV is carried verbatim in a template
/// literal.
pub struct DataInline;

impl ResolutionStrategy for DataInline {
    fn name(&self) -> &'static str {
        "DATA_INLINE"
    }

    fn priority(&self) -> u32 {
        80
    }

    fn applies(&self, ctx: &ResolutionContext<'_>) -> bool {
        ctx.references.iter().any(|r| {
            r.kind == ReferenceKind::Data && ctx.usable_block(&data_block_kind(r)).is_some()
        })
    }

    fn apply(&self, ctx: &ResolutionContext<'_>) -> Result<StrategyOutcome> {
        let reference = ctx
            .references
            .iter()
            .find(|r| {
                r.kind == ReferenceKind::Data && ctx.usable_block(&data_block_kind(r)).is_some()
            })
            .ok_or_else(|| {
                RecoveryError::Strategy("no data reference with a matching block".to_string())
            })?;
        let block_kind = data_block_kind(reference);
        let block = ctx
            .usable_block(&block_kind)
            .ok_or_else(|| RecoveryError::Strategy("no usable data block in message".to_string()))?;
        let binding = reference.binding.as_deref().unwrap_or("data");

        let (literal, confidence) = match block_kind {
            BlockKind::Json => {
                let value: serde_json::Value =
                    serde_json::from_str(&block.text).map_err(|e| {
                        RecoveryError::Strategy(format!("data block failed to parse as JSON: {}", e))
                    })?;
                (serde_json::to_string_pretty(&value)?, JSON_INLINE_CONFIDENCE)
            }
            _ => (
                format!("`{}`", escape_template(block.text.trim())),
                CSV_INLINE_CONFIDENCE,
            ),
        };
        let statement = format!("const {} = {};", binding, literal);
        let output = splice(&ctx.request.source, reference, &statement);

        let change = AppliedChange::new(
            ChangeKind::DataInline,
            &reference.statement,
            &statement,
            format!("Inlined data block in place of import of '{}'", reference.path),
            confidence,
        );
        Ok(StrategyOutcome::new(output, vec![change], confidence))
    }
}

/// Last resort: removes unresolved imports outright. Prefers the references
/// the error message names, then all relative references.
pub struct ImportRemoval;

impl ResolutionStrategy for ImportRemoval {
    fn name(&self) -> &'static str {
        "IMPORT_REMOVAL"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn applies(&self, ctx: &ResolutionContext<'_>) -> bool {
        !ctx.references.is_empty()
    }

    fn apply(&self, ctx: &ResolutionContext<'_>) -> Result<StrategyOutcome> {
        let mut targets = ctx.references_in_error();
        if targets.is_empty() {
            targets = ctx.references.iter().filter(|r| r.is_relative()).collect();
        }
        if targets.is_empty() {
            targets = ctx.references.iter().collect();
        }
        // Back-to-front so earlier spans stay valid while splicing.
        targets.sort_by_key(|r| std::cmp::Reverse(r.span.start));

        let mut output = ctx.request.source.clone();
        let mut changes = Vec::new();
        for reference in &targets {
            let mut end = reference.span.end;
            if output[end..].starts_with('\n') {
                end += 1;
            }
            output.replace_range(reference.span.start..end, "");
            changes.push(AppliedChange::new(
                ChangeKind::ImportRemoval,
                &reference.statement,
                "",
                format!("Removed unresolved import of '{}'", reference.path),
                REMOVAL_CONFIDENCE,
            ));
        }
        changes.reverse();
        Ok(StrategyOutcome::new(output, changes, REMOVAL_CONFIDENCE))
    }
}

fn splice(source: &str, reference: &ModuleReference, replacement: &str) -> String {
    let mut out = String::with_capacity(source.len() + replacement.len());
    out.push_str(&source[..reference.span.start]);
    out.push_str(replacement);
    out.push_str(&source[reference.span.end..]);
    out
}

fn data_block_kind(reference: &ModuleReference) -> BlockKind {
    if reference.path.to_ascii_lowercase().ends_with(".csv") {
        BlockKind::Csv
    } else {
        BlockKind::Json
    }
}

/// Style keys the source looks up on the binding, camel-normalized.
/// Covers `styles.primary` and `styles["primary-button"]`.
fn referenced_style_keys(source: &str, binding: &str) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    if binding.is_empty() {
        return keys;
    }
    for (start, _) in source.match_indices(binding) {
        let boundary = source[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'));
        if !boundary {
            continue;
        }
        let after = &source[start + binding.len()..];
        if let Some(rest) = after.strip_prefix('.') {
            if let Some(ident) = identifier_prefix(rest) {
                keys.insert(ident);
            }
        } else if let Some(rest) = after.strip_prefix('[') {
            let rest = rest.trim_start();
            if let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') {
                let body = &rest[1..];
                if let Some(end) = body.find(quote) {
                    keys.insert(kebab_to_camel(&body[..end]));
                }
            }
        }
    }
    keys
}

fn injection_snippet(binding: Option<&str>, css: &str, artifact_id: &str) -> String {
    let tag_id = style_tag_id(artifact_id);
    let mut snippet = String::new();
    if let Some(binding) = binding {
        // Class-name pass-through so existing lookups resolve to themselves.
        snippet.push_str(&format!(
            "const {} = new Proxy({{}}, {{ get: (_, name) => String(name) }});\n",
            binding
        ));
    }
    snippet.push_str(&format!("const __inlinedCss = `{}`;\n", escape_template(css)));
    snippet.push_str(&format!(
        "if (typeof document !== \"undefined\" && !document.getElementById(\"{}\")) {{\n",
        tag_id
    ));
    snippet.push_str("  const styleTag = document.createElement(\"style\");\n");
    snippet.push_str(&format!("  styleTag.id = \"{}\";\n", tag_id));
    snippet.push_str("  styleTag.textContent = __inlinedCss;\n");
    snippet.push_str("  document.head.appendChild(styleTag);\n");
    snippet.push_str("}");
    snippet
}

fn style_tag_id(artifact_id: &str) -> String {
    let sanitized: String = artifact_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("artifact-style-{}", sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{AuxiliaryBlock, RecoveryRequest};
    use crate::resolve::balance::is_balanced;
    use crate::resolve::reference::parse_references;

    fn stylesheet_block(text: &str) -> AuxiliaryBlock {
        AuxiliaryBlock::new(BlockKind::Stylesheet, text)
    }

    #[test]
    fn test_css_module_inline_full_coverage() {
        let request = RecoveryRequest::new(
            "artifact-1",
            "import styles from './Button.module.css';\n\
             export default function Button() {\n  return <button className={styles.primary}>Go</button>;\n}\n",
            "Cannot find module './Button.module.css'",
        );
        let blocks = vec![stylesheet_block(
            ".primary { background-color: blue; padding: 8px 16px; }",
        )];
        let references = parse_references(&request.source);
        let ctx = ResolutionContext::new(&request, &blocks, &references);

        let strategy = CssModuleInline;
        assert!(strategy.applies(&ctx));
        let outcome = strategy.apply(&ctx).unwrap();

        assert!(outcome.confidence >= 0.9);
        assert!(outcome.output.contains("const styles = {"));
        assert!(outcome.output.contains("backgroundColor: \"blue\""));
        assert!(!outcome.output.contains("import styles"));
        assert!(is_balanced(&outcome.output));
    }

    #[test]
    fn test_css_module_inline_partial_coverage_lowers_confidence() {
        let request = RecoveryRequest::new(
            "artifact-1",
            "import styles from './x.module.css';\n\
             const a = styles.primary;\nconst b = styles.missing;\n",
            "Cannot find module './x.module.css'",
        );
        let blocks = vec![stylesheet_block(".primary { color: red; }")];
        let references = parse_references(&request.source);
        let ctx = ResolutionContext::new(&request, &blocks, &references);

        let outcome = CssModuleInline.apply(&ctx).unwrap();
        // One of two referenced keys resolves.
        assert!((outcome.confidence - 0.775).abs() < 1e-9);
    }

    #[test]
    fn test_css_module_inline_bracket_access_counts() {
        let request = RecoveryRequest::new(
            "artifact-1",
            "import styles from './x.module.css';\nconst a = styles[\"primary-button\"];\n",
            "Cannot find module './x.module.css'",
        );
        let blocks = vec![stylesheet_block(".primary-button { color: red; }")];
        let references = parse_references(&request.source);
        let ctx = ResolutionContext::new(&request, &blocks, &references);

        let outcome = CssModuleInline.apply(&ctx).unwrap();
        assert!(outcome.confidence > 0.9);
    }

    #[test]
    fn test_css_module_inline_requires_class_rules() {
        let request = RecoveryRequest::new(
            "artifact-1",
            "import styles from './x.module.css';\n",
            "Cannot find module './x.module.css'",
        );
        let blocks = vec![stylesheet_block("body { margin: 0; }")];
        let references = parse_references(&request.source);
        let ctx = ResolutionContext::new(&request, &blocks, &references);

        assert!(CssModuleInline.apply(&ctx).is_err());
    }

    #[test]
    fn test_stylesheet_injection_carries_css_verbatim() {
        let request = RecoveryRequest::new(
            "artifact-2",
            "import './theme.css';\nexport default function App() {\n  return <div className=\"hero\" />;\n}\n",
            "Failed to resolve './theme.css'",
        );
        let blocks = vec![stylesheet_block(".hero { display: flex; }")];
        let references = parse_references(&request.source);
        let ctx = ResolutionContext::new(&request, &blocks, &references);

        let strategy = StylesheetInjection;
        assert!(strategy.applies(&ctx));
        let outcome = strategy.apply(&ctx).unwrap();

        assert!((outcome.confidence - INJECTION_CONFIDENCE).abs() < 1e-9);
        assert!(outcome.output.contains(".hero { display: flex; }"));
        assert!(outcome.output.contains("document.createElement(\"style\")"));
        // No binding on a side-effect import, so no pass-through mapping.
        assert!(!outcome.output.contains("new Proxy"));
        assert!(is_balanced(&outcome.output));
    }

    #[test]
    fn test_stylesheet_injection_adds_passthrough_for_binding() {
        let request = RecoveryRequest::new(
            "artifact-3",
            "import styles from './x.module.css';\nconst c = styles.primary;\n",
            "Cannot find module './x.module.css'",
        );
        let blocks = vec![stylesheet_block(".primary:hover { color: red; }")];
        let references = parse_references(&request.source);
        let ctx = ResolutionContext::new(&request, &blocks, &references);

        let outcome = StylesheetInjection.apply(&ctx).unwrap();
        assert!(outcome.output.contains("const styles = new Proxy"));
        assert!(is_balanced(&outcome.output));
    }

    #[test]
    fn test_data_inline_json() {
        let request = RecoveryRequest::new(
            "artifact-4",
            "import rows from './rows.json';\nconsole.log(rows.length);\n",
            "Cannot find module './rows.json'",
        );
        let blocks = vec![AuxiliaryBlock::new(
            BlockKind::Json,
            "[{\"id\": 1}, {\"id\": 2}]",
        )];
        let references = parse_references(&request.source);
        let ctx = ResolutionContext::new(&request, &blocks, &references);

        let strategy = DataInline;
        assert!(strategy.applies(&ctx));
        let outcome = strategy.apply(&ctx).unwrap();

        assert!((outcome.confidence - JSON_INLINE_CONFIDENCE).abs() < 1e-9);
        assert!(outcome.output.starts_with("const rows = ["));
        assert!(is_balanced(&outcome.output));
    }

    #[test]
    fn test_data_inline_csv_uses_template_literal() {
        let request = RecoveryRequest::new(
            "artifact-5",
            "import table from './table.csv';\n",
            "Cannot find module './table.csv'",
        );
        let blocks = vec![AuxiliaryBlock::new(BlockKind::Csv, "id,name\n1,alpha\n")];
        let references = parse_references(&request.source);
        let ctx = ResolutionContext::new(&request, &blocks, &references);

        let outcome = DataInline.apply(&ctx).unwrap();
        assert!((outcome.confidence - CSV_INLINE_CONFIDENCE).abs() < 1e-9);
        assert!(outcome.output.starts_with("const table = `id,name"));
    }

    #[test]
    fn test_data_inline_rejects_malformed_json_block() {
        let request = RecoveryRequest::new(
            "artifact-6",
            "import rows from './rows.json';\n",
            "Cannot find module './rows.json'",
        );
        let blocks = vec![AuxiliaryBlock::new(BlockKind::Json, "{ nope").with_malformed(true)];
        let references = parse_references(&request.source);
        let ctx = ResolutionContext::new(&request, &blocks, &references);

        assert!(!DataInline.applies(&ctx));
    }

    #[test]
    fn test_import_removal_prefers_error_named_reference() {
        let request = RecoveryRequest::new(
            "artifact-7",
            "import styles from './x.module.css';\nimport helper from './helper';\nconst a = 1;\n",
            "Cannot find module './x.module.css'",
        );
        let references = parse_references(&request.source);
        let ctx = ResolutionContext::new(&request, &[], &references);

        let strategy = ImportRemoval;
        assert!(strategy.applies(&ctx));
        let outcome = strategy.apply(&ctx).unwrap();

        assert!((outcome.confidence - REMOVAL_CONFIDENCE).abs() < 1e-9);
        assert!(!outcome.output.contains("x.module.css"));
        assert!(outcome.output.contains("./helper"));
        assert_eq!(outcome.changes.len(), 1);
    }

    #[test]
    fn test_import_removal_falls_back_to_relative_references() {
        let request = RecoveryRequest::new(
            "artifact-8",
            "import React from 'react';\nimport a from './a';\nimport b from './b';\nconst x = 1;\n",
            "Something went wrong",
        );
        let references = parse_references(&request.source);
        let ctx = ResolutionContext::new(&request, &[], &references);

        let outcome = ImportRemoval.apply(&ctx).unwrap();
        assert!(outcome.output.contains("'react'"));
        assert!(!outcome.output.contains("'./a'"));
        assert!(!outcome.output.contains("'./b'"));
        assert_eq!(outcome.changes.len(), 2);
        // Changes reported in source order.
        assert!(outcome.changes[0].original.contains("'./a'"));
    }

    #[test]
    fn test_referenced_style_keys_word_boundary() {
        let keys = referenced_style_keys(
            "const a = styles.primary; const b = mystyles.other; styles[\"card-title\"];",
            "styles",
        );
        assert!(keys.contains("primary"));
        assert!(keys.contains("cardTitle"));
        assert!(!keys.contains("other"));
    }
}
