//! Patch application
//!
//! Each block is processed independently and fully: read the current
//! file, splice the line sequence, write the whole file back. There is
//! no in-memory batching and no atomic-write or backup guarantee.

use super::block::{extract_blocks, PatchBlock, PatchOperation, SkipReason, SkippedBlock};
use redraft_error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Record of one applied edit
#[derive(Debug, Clone)]
pub struct AppliedBlock {
    pub file: String,
    pub block_id: String,
    pub operation: PatchOperation,
    pub start_line: usize,
    pub end_line: usize,
}

impl AppliedBlock {
    fn from_block(block: &PatchBlock) -> Self {
        Self {
            file: block.file.clone(),
            block_id: block.block_id.clone(),
            operation: block.operation,
            start_line: block.start_line,
            end_line: block.end_line,
        }
    }
}

/// What one application pass did: every block ends up in exactly one of
/// the two lists, with skipped blocks carrying their reason.
#[derive(Debug, Clone, Default)]
pub struct PatchReport {
    pub applied: Vec<AppliedBlock>,
    pub skipped: Vec<SkippedBlock>,
}

/// Applies patch blocks to files under a fixed output root.
///
/// Writes are synchronous; missing parent directories are created on
/// demand. Filesystem failures propagate as errors, while per-block
/// range failures are reported, not raised.
pub struct PatchEngine {
    root: PathBuf,
}

impl PatchEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extract blocks from a generated text blob and apply them.
    ///
    /// Parse-stage skips (malformed metadata, non-positive start line)
    /// and apply-stage skips (range out of bounds) are merged into one
    /// report.
    pub fn apply_source(&self, text: &str) -> Result<PatchReport> {
        let extraction = extract_blocks(text);
        let mut report = self.apply_blocks(extraction.blocks)?;

        let mut skipped = extraction.skipped;
        skipped.append(&mut report.skipped);
        report.skipped = skipped;

        Ok(report)
    }

    /// Apply already-parsed blocks in the deterministic per-file order:
    /// range-mutating operations first, sorted by descending start line,
    /// then appends in discovery order.
    pub fn apply_blocks(&self, blocks: Vec<PatchBlock>) -> Result<PatchReport> {
        let mut report = PatchReport::default();

        for block in order_blocks(blocks) {
            // extraction guarantees this; guard the public path too
            if block.start_line == 0 {
                report.skipped.push(SkippedBlock {
                    file: Some(block.file.clone()),
                    block_id: Some(block.block_id.clone()),
                    reason: SkipReason::InvalidStartLine(0),
                });
                continue;
            }
            match self.apply_block(&block)? {
                BlockOutcome::Applied => report.applied.push(AppliedBlock::from_block(&block)),
                BlockOutcome::OutOfRange { file_lines } => report.skipped.push(SkippedBlock {
                    file: Some(block.file.clone()),
                    block_id: Some(block.block_id.clone()),
                    reason: SkipReason::RangeOutOfBounds {
                        start_line: block.start_line,
                        end_line: block.end_line,
                        file_lines,
                    },
                }),
            }
        }

        Ok(report)
    }

    fn apply_block(&self, block: &PatchBlock) -> Result<BlockOutcome> {
        let path = self.root.join(&block.file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::from(e)
                    .with_operation("patch::apply_block")
                    .with_context("file", block.file.clone())
            })?;
        }

        let current = if path.exists() {
            self.read_target(&path, block)?
        } else {
            String::new()
        };

        if block.operation == PatchOperation::Append {
            let next = if current.is_empty() {
                block.content.clone()
            } else {
                format!("{}\n{}", current, block.content)
            };
            self.write_target(&path, &next, block)?;
            return Ok(BlockOutcome::Applied);
        }

        let mut lines: Vec<String> = if current.is_empty() {
            Vec::new()
        } else {
            current.split('\n').map(String::from).collect()
        };

        match block.operation {
            PatchOperation::Modify => {
                if block.end_line > lines.len() {
                    return Ok(BlockOutcome::OutOfRange {
                        file_lines: lines.len(),
                    });
                }
                lines.splice(
                    block.start_line - 1..block.end_line,
                    [block.content.clone()],
                );
            }
            PatchOperation::Insert => {
                let index = (block.start_line - 1).min(lines.len());
                lines.insert(index, block.content.clone());
            }
            PatchOperation::Delete => {
                if block.end_line > lines.len() {
                    return Ok(BlockOutcome::OutOfRange {
                        file_lines: lines.len(),
                    });
                }
                lines.drain(block.start_line - 1..block.end_line);
            }
            PatchOperation::Append => unreachable!("append handled above"),
        }

        self.write_target(&path, &lines.join("\n"), block)?;
        Ok(BlockOutcome::Applied)
    }

    fn read_target(&self, path: &Path, block: &PatchBlock) -> Result<String> {
        fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("patch::read_target")
                .with_context("file", block.file.clone())
        })
    }

    fn write_target(&self, path: &Path, content: &str, block: &PatchBlock) -> Result<()> {
        fs::write(path, content).map_err(|e| {
            Error::from(e)
                .with_operation("patch::write_target")
                .with_context("file", block.file.clone())
                .with_context("operation", block.operation.as_str())
        })
    }
}

enum BlockOutcome {
    Applied,
    OutOfRange { file_lines: usize },
}

/// Deterministic application order. Blocks are grouped by target file in
/// first-seen order; per file, range-mutating operations run first sorted
/// by descending start line (stable for ties), then appends in discovery
/// order. Descending order keeps lower line offsets valid while higher
/// ranges are edited.
fn order_blocks(blocks: Vec<PatchBlock>) -> Vec<PatchBlock> {
    let mut files: Vec<&str> = Vec::new();
    for block in &blocks {
        if !files.contains(&block.file.as_str()) {
            files.push(&block.file);
        }
    }

    let mut ordered = Vec::with_capacity(blocks.len());
    for file in files {
        let mut ranged: Vec<&PatchBlock> = blocks
            .iter()
            .filter(|b| b.file == file && b.operation != PatchOperation::Append)
            .collect();
        ranged.sort_by(|a, b| b.start_line.cmp(&a.start_line));
        ordered.extend(ranged.into_iter().cloned());

        ordered.extend(
            blocks
                .iter()
                .filter(|b| b.file == file && b.operation == PatchOperation::Append)
                .cloned(),
        );
    }
    ordered
}
