use std::error::Error;
use std::fmt;
use std::sync::PoisonError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CareHubError {
    // Credential errors
    AuthenticationFailure(String),

    // Token errors
    InvalidToken(String),
    ExpiredToken,
    RevokedToken,

    // Authorization errors
    AccessDenied(String),

    // Domain errors
    ResourceNotFound(String),
    InvalidState(String),

    // Malformed or missing request fields
    InvalidInput(String),

    // Storage errors
    StorageError(String),

    // Configuration errors
    ConfigError(String),

    // System errors
    InternalError(String),
}

impl CareHubError {
    /// Stable machine-readable code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailure(_) => "AUTHENTICATION_FAILURE",
            Self::InvalidToken(_) => "INVALID_TOKEN",
            Self::ExpiredToken => "EXPIRED_TOKEN",
            Self::RevokedToken => "REVOKED_TOKEN",
            Self::AccessDenied(_) => "ACCESS_DENIED",
            Self::ResourceNotFound(_) => "RESOURCE_NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::StorageError(_) | Self::ConfigError(_) | Self::InternalError(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// HTTP status used by the transport layer
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AuthenticationFailure(_)
            | Self::InvalidToken(_)
            | Self::ExpiredToken
            | Self::RevokedToken => 401,
            Self::AccessDenied(_) => 403,
            Self::ResourceNotFound(_) => 404,
            Self::InvalidState(_) => 409,
            Self::InvalidInput(_) => 400,
            Self::StorageError(_) | Self::ConfigError(_) | Self::InternalError(_) => 500,
        }
    }

    /// Message safe to return to clients. Internal failures never expose their detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::StorageError(_) | Self::ConfigError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether the caller has to obtain a new access token before retrying
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken(_) | Self::ExpiredToken | Self::RevokedToken
        )
    }
}

impl fmt::Display for CareHubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailure(msg) => write!(f, "Authentication failed: {}", msg),
            Self::InvalidToken(msg) => write!(f, "Invalid token: {}", msg),
            Self::ExpiredToken => write!(f, "Token expired"),
            Self::RevokedToken => write!(f, "Token has been revoked"),
            Self::AccessDenied(msg) => write!(f, "Access denied: {}", msg),
            Self::ResourceNotFound(msg) => write!(f, "Resource not found: {}", msg),
            Self::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl Error for CareHubError {}

impl<T> From<PoisonError<T>> for CareHubError {
    fn from(err: PoisonError<T>) -> Self {
        CareHubError::InternalError(format!("Mutex poisoned: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for CareHubError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => CareHubError::ExpiredToken,
            ErrorKind::InvalidSignature => {
                CareHubError::InvalidToken("signature mismatch".to_string())
            }
            _ => CareHubError::InvalidToken(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CareHubError>;
