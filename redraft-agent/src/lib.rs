//! # redraft Agent
//!
//! The agent drives the generate/review loop:
//! 1. Round 0 asks the model for an implementation of the task
//! 2. Every non-empty generation is scanned for patch blocks, which are
//!    applied under the session's output root
//! 3. Every round except the last gets one review pass over the output
//! 4. The next round folds the review feedback into a revision request
//! 5. The loop ends at the iteration budget or when the cancel token is set
//!
//! One `Session` owns one run at a time; there is no global state.

pub mod prompts;
mod session;

pub use session::{
    CancelToken, RunOutcome, Session, SessionConfig, Transcript, TranscriptEntry,
    TranscriptRole,
};
