use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

static IMPORT_FROM_PATTERN: OnceLock<Regex> = OnceLock::new();
static IMPORT_BARE_PATTERN: OnceLock<Regex> = OnceLock::new();
static REQUIRE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn import_from_pattern() -> &'static Regex {
    IMPORT_FROM_PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?m)^[ \t]*import\s+(?P<clause>[^'";]+?)\s+from\s+['"](?P<path>[^'"]+)['"]\s*;?[ \t]*$"#,
        )
        .expect("valid import-from pattern")
    })
}

fn import_bare_pattern() -> &'static Regex {
    IMPORT_BARE_PATTERN.get_or_init(|| {
        Regex::new(r#"(?m)^[ \t]*import\s+['"](?P<path>[^'"]+)['"]\s*;?[ \t]*$"#)
            .expect("valid bare-import pattern")
    })
}

fn require_pattern() -> &'static Regex {
    REQUIRE_PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?m)^[ \t]*(?:const|let|var)\s+(?P<binding>[A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*require\(\s*['"](?P<path>[^'"]+)['"]\s*\)\s*;?[ \t]*$"#,
        )
        .expect("valid require pattern")
    })
}

/// What the referenced path points at, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `.module.css` / `.module.scss`, imported for its class-name mapping.
    StylesheetModule,
    /// Plain stylesheet imported for its side effect.
    Stylesheet,
    /// Structured data (`.json`, `.csv`).
    Data,
    /// Anything else, including bare package names.
    Script,
}

/// A module reference parsed out of the artifact source.
///
/// `span` is the byte range of the whole statement, suitable for splicing a
/// replacement into the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    pub statement: String,
    pub span: Range<usize>,
    /// Default or namespace binding introduced by the statement, if any.
    pub binding: Option<String>,
    pub path: String,
    pub kind: ReferenceKind,
}

impl ModuleReference {
    /// Relative paths are the ones an artifact runtime cannot resolve.
    pub fn is_relative(&self) -> bool {
        self.path.starts_with("./") || self.path.starts_with("../")
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

/// Parses import and require statements out of source text, in source order.
///
/// The parser is line oriented. Multi-line import clauses are out of scope;
/// the statements artifact sources carry are overwhelmingly single line.
pub fn parse_references(source: &str) -> Vec<ModuleReference> {
    let mut references = Vec::new();

    for captures in import_from_pattern().captures_iter(source) {
        let whole = match captures.get(0) {
            Some(m) => m,
            None => continue,
        };
        let path = captures["path"].to_string();
        references.push(ModuleReference {
            statement: whole.as_str().to_string(),
            span: whole.range(),
            binding: binding_from_clause(&captures["clause"]),
            kind: kind_for_path(&path),
            path,
        });
    }

    for captures in import_bare_pattern().captures_iter(source) {
        let whole = match captures.get(0) {
            Some(m) => m,
            None => continue,
        };
        let path = captures["path"].to_string();
        references.push(ModuleReference {
            statement: whole.as_str().to_string(),
            span: whole.range(),
            binding: None,
            kind: kind_for_path(&path),
            path,
        });
    }

    for captures in require_pattern().captures_iter(source) {
        let whole = match captures.get(0) {
            Some(m) => m,
            None => continue,
        };
        let path = captures["path"].to_string();
        references.push(ModuleReference {
            statement: whole.as_str().to_string(),
            span: whole.range(),
            binding: Some(captures["binding"].to_string()),
            kind: kind_for_path(&path),
            path,
        });
    }

    references.sort_by_key(|r| r.span.start);
    references
}

/// Extracts the usable binding name from an import clause.
///
/// `styles` and `* as styles` yield a binding; a pure named-import clause
/// (`{ a, b }`) does not, since no single identifier covers it.
fn binding_from_clause(clause: &str) -> Option<String> {
    let clause = clause.trim();
    if let Some(rest) = clause.strip_prefix('*') {
        let rest = rest.trim_start();
        let name = rest.strip_prefix("as")?.trim();
        return identifier_prefix(name);
    }
    if clause.starts_with('{') {
        return None;
    }
    // Default import, possibly followed by `, { ... }`.
    let head = clause.split(',').next().unwrap_or(clause).trim();
    identifier_prefix(head)
}

pub(crate) fn identifier_prefix(s: &str) -> Option<String> {
    let mut chars = s.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_' || first == '$') {
        return None;
    }
    let ident: String = std::iter::once(first)
        .chain(chars.take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$'))
        .collect();
    Some(ident)
}

fn kind_for_path(path: &str) -> ReferenceKind {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".module.css")
        || lower.ends_with(".module.scss")
        || lower.ends_with(".module.sass")
        || lower.ends_with(".module.less")
    {
        ReferenceKind::StylesheetModule
    } else if lower.ends_with(".css")
        || lower.ends_with(".scss")
        || lower.ends_with(".sass")
        || lower.ends_with(".less")
    {
        ReferenceKind::Stylesheet
    } else if lower.ends_with(".json") || lower.ends_with(".csv") {
        ReferenceKind::Data
    } else {
        ReferenceKind::Script
    }
}
