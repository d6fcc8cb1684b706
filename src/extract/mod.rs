//! Auxiliary-block extraction from message text.
//!
//! The surrounding chat message often carries the dependency a failing
//! artifact is missing, emitted as a separate fenced code block. The
//! [`BlockExtractor`] seam turns raw message markdown into typed
//! [`AuxiliaryBlock`]s; [`FencedBlockExtractor`] is the default
//! implementation, walking fenced code blocks and tagging each from its
//! fence info string.

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};

use crate::artifact::{AuxiliaryBlock, BlockKind};

/// Seam for producing auxiliary blocks from raw message text.
pub trait BlockExtractor: Send + Sync {
    fn extract(&self, message_text: &str) -> Vec<AuxiliaryBlock>;
}

/// Default extractor walking markdown fenced code blocks.
///
/// Indented code blocks are skipped: they carry no content-type tag, so they
/// can never be matched against a missing dependency. JSON blocks get a parse
/// probe and are flagged malformed when it fails.
#[derive(Debug, Default, Clone)]
pub struct FencedBlockExtractor;

impl FencedBlockExtractor {
    pub fn new() -> Self {
        Self
    }

    fn finish_block(kind: BlockKind, text: String) -> AuxiliaryBlock {
        let malformed = match kind {
            BlockKind::Json => serde_json::from_str::<serde_json::Value>(&text).is_err(),
            _ => false,
        };
        AuxiliaryBlock::new(kind, text).with_malformed(malformed)
    }
}

impl BlockExtractor for FencedBlockExtractor {
    fn extract(&self, message_text: &str) -> Vec<AuxiliaryBlock> {
        let mut blocks = Vec::new();
        let mut current: Option<(BlockKind, String)> = None;

        for event in Parser::new(message_text) {
            match event {
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                    current = Some((BlockKind::from_info(&info), String::new()));
                }
                Event::Start(Tag::CodeBlock(CodeBlockKind::Indented)) => {
                    current = None;
                }
                Event::Text(text) => {
                    if let Some((_, buffer)) = current.as_mut() {
                        buffer.push_str(&text);
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((kind, text)) = current.take() {
                        blocks.push(Self::finish_block(kind, text));
                    }
                }
                _ => {}
            }
        }

        blocks
    }
}
