//! Error types for Botcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BotcastError>;

#[derive(Error, Debug)]
pub enum BotcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BotcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BotcastError::InvalidInput(_) => 3,
            BotcastError::Credential(_) => 2,
            BotcastError::Platform(PlatformError::Authentication { .. }) => 2,
            BotcastError::Platform(_) => 1,
            BotcastError::Generation(_) => 1,
            BotcastError::Config(_) => 1,
            BotcastError::Storage(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No stored tokens at {0}. Run botcast-auth to authorize the app first.")]
    NotFound(String),

    #[error("Token exchange rejected (HTTP {status}): {body}")]
    Exchange { status: u16, body: String },

    #[error("Token endpoint unreachable: {0}")]
    Network(String),

    #[error("Malformed token response: {0}")]
    Malformed(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Request(String),

    #[error("Generation endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Generation endpoint returned an unexpected body: {0}")]
    Malformed(String),

    #[error("Generation endpoint returned empty text")]
    Empty,
}

/// How a publish failure should be reported to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry on the next scheduler cycle
    RateLimited,
    /// The payload itself was refused (too long for the tier, duplicate, ...)
    ContentPolicy,
    Other,
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed (HTTP {status}): {body}")]
    Authentication { status: u16, body: String },

    #[error("Rate limit exceeded (HTTP {status}): {body}")]
    RateLimit { status: u16, body: String },

    #[error("Content rejected (HTTP {status}): {body}")]
    ContentPolicy { status: u16, body: String },

    #[error("Posting failed (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Body fragments that mark a 4xx as a content-policy refusal
const CONTENT_POLICY_MARKERS: &[&str] = &[
    "too long",
    "length",
    "duplicate",
    "not allowed",
    "policy",
];

impl PlatformError {
    /// Classify a non-success HTTP response from a publish endpoint
    pub fn from_status(status: u16, body: String) -> Self {
        let lowered = body.to_lowercase();
        match status {
            429 => PlatformError::RateLimit { status, body },
            401 => PlatformError::Authentication { status, body },
            400 | 403 | 413 | 422
                if CONTENT_POLICY_MARKERS.iter().any(|m| lowered.contains(m)) =>
            {
                PlatformError::ContentPolicy { status, body }
            }
            403 => PlatformError::Authentication { status, body },
            _ => PlatformError::Rejected { status, body },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            PlatformError::RateLimit { .. } => FailureKind::RateLimited,
            PlatformError::ContentPolicy { .. } | PlatformError::Validation(_) => {
                FailureKind::ContentPolicy
            }
            _ => FailureKind::Other,
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = BotcastError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_credential_error() {
        let error = BotcastError::Credential(CredentialError::NotFound("tokens.json".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_platform_errors() {
        let auth = BotcastError::Platform(PlatformError::Authentication {
            status: 401,
            body: "Unauthorized".to_string(),
        });
        assert_eq!(auth.exit_code(), 2);

        let rate = BotcastError::Platform(PlatformError::RateLimit {
            status: 429,
            body: "Too Many Requests".to_string(),
        });
        assert_eq!(rate.exit_code(), 1);
    }

    #[test]
    fn test_from_status_rate_limit() {
        let err = PlatformError::from_status(429, "Too Many Requests".to_string());
        assert!(matches!(err, PlatformError::RateLimit { status: 429, .. }));
        assert_eq!(err.kind(), FailureKind::RateLimited);
    }

    #[test]
    fn test_from_status_content_policy() {
        let err = PlatformError::from_status(
            403,
            r#"{"detail":"You are not permitted to create a Tweet with that length."}"#.to_string(),
        );
        assert_eq!(err.kind(), FailureKind::ContentPolicy);

        let dup = PlatformError::from_status(
            403,
            r#"{"detail":"You are not allowed to create a Tweet with duplicate content."}"#
                .to_string(),
        );
        assert_eq!(dup.kind(), FailureKind::ContentPolicy);
    }

    #[test]
    fn test_from_status_forbidden_without_policy_marker_is_auth() {
        let err = PlatformError::from_status(403, "Forbidden".to_string());
        assert!(matches!(err, PlatformError::Authentication { .. }));
        assert_eq!(err.kind(), FailureKind::Other);
    }

    #[test]
    fn test_from_status_other() {
        let err = PlatformError::from_status(503, "Service Unavailable".to_string());
        assert!(matches!(err, PlatformError::Rejected { status: 503, .. }));
        assert_eq!(err.kind(), FailureKind::Other);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = BotcastError::Platform(PlatformError::RateLimit {
            status: 429,
            body: "slow down".to_string(),
        });
        assert_eq!(
            error.to_string(),
            "Platform error: Rate limit exceeded (HTTP 429): slow down"
        );

        let config_error = ConfigError::MissingField("platform.client_id".to_string());
        let error = BotcastError::Config(config_error);
        assert_eq!(
            error.to_string(),
            "Configuration error: Missing required field: platform.client_id"
        );
    }

    #[test]
    fn test_error_conversion_from_storage_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BotcastError = StorageError::from(io).into();
        assert!(matches!(err, BotcastError::Storage(_)));
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(original.to_string(), cloned.to_string());
    }
}
