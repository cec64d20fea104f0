//! Error kinds for redraft operations

use std::fmt;

/// The kind of error that occurred.
///
/// This enum categorizes errors to help users write clear error handling logic.
/// Users can match on ErrorKind to decide how to handle specific error cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // Patch block errors
    // =========================================================================
    /// Block metadata could not be parsed
    BlockMalformed,

    /// Block line range falls outside the current file
    RangeOutOfBounds,

    // =========================================================================
    // Completion/provider errors
    // =========================================================================
    /// The chat completion call failed
    CompletionFailed,

    /// Provider not available
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    /// Context too large for model
    ContextTooLarge,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,

    // =========================================================================
    // Parse/serialization errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,

    /// Serialization/deserialization failed
    SerializationFailed,

    // =========================================================================
    // Run control
    // =========================================================================
    /// The run was stopped by its cancel token
    Cancelled,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Patch block
            ErrorKind::BlockMalformed => "BlockMalformed",
            ErrorKind::RangeOutOfBounds => "RangeOutOfBounds",

            // Completion/provider
            ErrorKind::CompletionFailed => "CompletionFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::ContextTooLarge => "ContextTooLarge",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",

            // Run control
            ErrorKind::Cancelled => "Cancelled",
        }
    }

    /// Check if this error kind is retryable by default.
    ///
    /// Note that redraft itself carries no retry policy anywhere; the
    /// classification exists for callers that wrap a run in their own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::CompletionFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
