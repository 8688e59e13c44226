//! Error types for FlowSync.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing credential, bad region, malformed descriptor.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Platform {0} is not enabled or configured")]
    PlatformNotEnabled(String),

    /// Remote API failure, prefixed with the platform name.
    #[error("[{platform}] {message}")]
    Platform { platform: String, message: String },

    /// The platform cannot do this at all; the message carries guidance.
    #[error("{0}")]
    Unsupported(String),

    #[error("Connection test failed: {0}")]
    ConnectionFailed(String),

    /// Non-zero exit from an external CLI.
    #[error("Command failed: {0}")]
    Command(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl Error {
    /// Build a platform-prefixed error.
    pub fn platform(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Platform {
            platform: platform.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_error_is_prefixed() {
        let err = Error::platform("Make.com", "Failed to fetch scenarios from all regions");
        assert_eq!(
            err.to_string(),
            "[Make.com] Failed to fetch scenarios from all regions"
        );
    }

    #[test]
    fn test_unsupported_message_is_verbatim() {
        let err = Error::Unsupported("Edit it at https://example.com".into());
        assert_eq!(err.to_string(), "Edit it at https://example.com");
    }
}
