//! # redraft engine
//!
//! The core pieces of redraft:
//!
//! - **Provider**: trait-based chat completion communication (OpenAI-compatible,
//!   Anthropic) - one request, one single-choice response
//! - **Patch**: the line-patch protocol - delimited block extraction and
//!   whole-line file application under an output root

pub mod provider;
pub mod patch;

pub use provider::{
    LlmProvider, ProviderConfig, ProviderType, ProviderError,
    ChatMessage, Role, ReasoningEffort, CompletionRequest, CompletionResponse,
    FinishReason, Usage, UsageTracker,
    OpenAIProvider, AnthropicProvider,
};
pub use patch::{
    extract_blocks, Extraction, PatchBlock, PatchOperation, SkipReason, SkippedBlock,
    AppliedBlock, PatchEngine, PatchReport, BLOCK_DELIMITER,
};
