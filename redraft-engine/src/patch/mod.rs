//! # Line-Patch Protocol
//!
//! Extraction and application of delimited file-edit blocks.
//!
//! ## Design
//! - `extract_blocks` scans generated text for delimited blocks
//! - `PatchEngine` applies whole-line edits under a fixed output root
//! - Every block lands in a `PatchReport` as applied or skipped-with-reason

pub mod block;
pub mod apply;

pub use block::{
    extract_blocks, Extraction, PatchBlock, PatchOperation, SkipReason, SkippedBlock,
    BLOCK_DELIMITER,
};
pub use apply::{AppliedBlock, PatchEngine, PatchReport};
