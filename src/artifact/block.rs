use serde::{Deserialize, Serialize};

/// Content-type tag of an auxiliary block, derived from its fence info string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Stylesheet,
    Json,
    Csv,
    Script,
    Html,
    Other(String),
}

impl BlockKind {
    /// Derive a kind from the first token of a fence info string
    /// (e.g. `css filename=Button.module.css` -> `Stylesheet`).
    pub fn from_info(info: &str) -> Self {
        let tag = info
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match tag.as_str() {
            "css" | "scss" | "sass" | "less" => Self::Stylesheet,
            "json" => Self::Json,
            "csv" => Self::Csv,
            "js" | "jsx" | "ts" | "tsx" | "javascript" | "typescript" => Self::Script,
            "html" => Self::Html,
            _ => Self::Other(tag),
        }
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stylesheet => write!(f, "stylesheet"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
            Self::Script => write!(f, "script"),
            Self::Html => write!(f, "html"),
            Self::Other(tag) => write!(f, "{}", tag),
        }
    }
}

/// A labeled span of text extracted from the surrounding message.
///
/// Produced by the block extractor, consumed read-only by resolution
/// strategies. `malformed` marks blocks whose content failed a syntax probe
/// (e.g. unparseable JSON); strategies skip those when matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuxiliaryBlock {
    pub kind: BlockKind,
    pub text: String,
    pub malformed: bool,
}

impl AuxiliaryBlock {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            malformed: false,
        }
    }

    pub fn with_malformed(mut self, malformed: bool) -> Self {
        self.malformed = malformed;
        self
    }

    /// Whether this block can satisfy a dependency of the given kind.
    pub fn is_usable_as(&self, kind: &BlockKind) -> bool {
        !self.malformed && &self.kind == kind
    }
}
