//! Patch block wire format and extraction
//!
//! A block frames one file edit between two delimiter lines:
//!
//! ```text
//! --------------------------------------------------
//! {"file": "src/lib.rs", "blockId": "b1", "startLine": 3, "operation": "modify"}
//! <content>
//! --------------------------------------------------
//! ```
//!
//! The delimiter is exactly fifty `-` characters on its own line; the
//! metadata is a single-line JSON object with exactly the keys `file`,
//! `blockId`, `startLine`, `operation`. Model output that fails to parse
//! into this shape is skipped per-match, never fatal.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delimiter line framing each block: exactly fifty `-` characters.
pub const BLOCK_DELIMITER: &str = "--------------------------------------------------";

// Anchored so a longer dash run cannot open or close a block. The metadata
// capture takes the whole brace-opened line; whether it is usable JSON is
// decided by the parser so broken metadata still counts as a skipped match.
static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ms)^-{50}\n(\{[^\n]*)\n(.*?)\n-{50}$").expect("block pattern is valid")
});

/// The four whole-line edit operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOperation {
    Append,
    Modify,
    Insert,
    Delete,
}

impl PatchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Modify => "modify",
            Self::Insert => "insert",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wire metadata: field order here is the emission order.
#[derive(Debug, Serialize, Deserialize)]
struct BlockMeta {
    file: String,
    #[serde(rename = "blockId")]
    block_id: String,
    #[serde(rename = "startLine")]
    start_line: i64,
    operation: PatchOperation,
}

/// One parsed file edit.
///
/// `end_line` is computed once at parse time from the start line and the
/// trimmed content's line count; it is not re-validated after other
/// blocks mutate the target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchBlock {
    /// Target path, relative to the engine's output root
    pub file: String,
    /// Caller-supplied label; not required to be unique
    pub block_id: String,
    /// 1-indexed first line the operation touches
    pub start_line: usize,
    pub operation: PatchOperation,
    /// Content payload, trimmed
    pub content: String,
    /// `start_line + line_count(content)`, inclusive range end for
    /// modify/delete
    pub end_line: usize,
}

impl PatchBlock {
    pub fn new(
        file: impl Into<String>,
        block_id: impl Into<String>,
        start_line: usize,
        operation: PatchOperation,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into().trim().to_string();
        let end_line = start_line + line_count(&content);
        Self {
            file: file.into(),
            block_id: block_id.into(),
            start_line,
            operation,
            content,
            end_line,
        }
    }

    /// Emit the bit-exact wire format for this block.
    pub fn render(&self) -> String {
        let meta = BlockMeta {
            file: self.file.clone(),
            block_id: self.block_id.clone(),
            start_line: self.start_line as i64,
            operation: self.operation,
        };
        let meta_json = serde_json::to_string(&meta).expect("block metadata serializes");
        format!(
            "{delim}\n{meta}\n{content}\n{delim}",
            delim = BLOCK_DELIMITER,
            meta = meta_json,
            content = self.content,
        )
    }
}

/// Number of lines in a trimmed content payload; empty content spans zero.
fn line_count(content: &str) -> usize {
    if content.is_empty() {
        0
    } else {
        content.split('\n').count()
    }
}

/// Why a matched block was not turned into an edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The metadata line was not a usable JSON object (bad JSON, missing
    /// key, non-numeric startLine, unknown operation)
    MalformedMetadata(String),
    /// startLine was zero or negative
    InvalidStartLine(i64),
    /// A modify/delete range ran past the end of the target file
    RangeOutOfBounds {
        start_line: usize,
        end_line: usize,
        file_lines: usize,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMetadata(detail) => write!(f, "malformed metadata: {}", detail),
            Self::InvalidStartLine(value) => {
                write!(f, "startLine must be a positive integer, got {}", value)
            }
            Self::RangeOutOfBounds {
                start_line,
                end_line,
                file_lines,
            } => write!(
                f,
                "lines {}..{} exceed file length {}",
                start_line, end_line, file_lines
            ),
        }
    }
}

/// A block that was recognized but not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBlock {
    /// Target file, when the metadata parsed far enough to know it
    pub file: Option<String>,
    pub block_id: Option<String>,
    pub reason: SkipReason,
}

/// Result of scanning a text blob for blocks
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Well-formed blocks in left-to-right discovery order
    pub blocks: Vec<PatchBlock>,
    /// Matches that could not be used, with reasons
    pub skipped: Vec<SkippedBlock>,
}

/// Scan a generated text blob for delimited blocks.
///
/// Matching is non-overlapping and repeats until no further matches are
/// found. A malformed match is recorded and skipped; scanning continues
/// with the rest of the text.
pub fn extract_blocks(text: &str) -> Extraction {
    let mut extraction = Extraction::default();

    for captures in BLOCK_RE.captures_iter(text) {
        let raw_meta = &captures[1];
        let content = &captures[2];

        let meta: BlockMeta = match serde_json::from_str(raw_meta) {
            Ok(meta) => meta,
            Err(err) => {
                extraction.skipped.push(SkippedBlock {
                    file: None,
                    block_id: None,
                    reason: SkipReason::MalformedMetadata(err.to_string()),
                });
                continue;
            }
        };

        if meta.start_line <= 0 {
            extraction.skipped.push(SkippedBlock {
                file: Some(meta.file),
                block_id: Some(meta.block_id),
                reason: SkipReason::InvalidStartLine(meta.start_line),
            });
            continue;
        }

        extraction.blocks.push(PatchBlock::new(
            meta.file,
            meta.block_id,
            meta.start_line as usize,
            meta.operation,
            content,
        ));
    }

    extraction
}
