//! # redraft-error
//!
//! Unified error handling for redraft - following OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., BlockMalformed, CompletionFailed)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use redraft_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::BlockMalformed, "metadata is not a JSON object")
//!         .with_operation("patch::extract_blocks")
//!         .with_context("block_id", "b1")
//!         .with_context("file", "src/main.rs"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, redraft_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using redraft Error
pub type Result<T> = std::result::Result<T, Error>;
