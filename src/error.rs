use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Structured error type shared by every authentication operation
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct AuthError {
    /// Discriminant for programmatic handling
    pub kind: AuthErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Optional structured payload (status codes, provider ids, causes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl AuthError {
    /// Create a new error builder for the given kind
    pub fn new(kind: AuthErrorKind) -> AuthErrorBuilder {
        AuthErrorBuilder {
            kind,
            message: None,
            details: None,
        }
    }

    /// Stable code string for this error
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Returns true if this error has the given kind
    pub fn is(&self, kind: AuthErrorKind) -> bool {
        self.kind == kind
    }
}

/// Builder for creating AuthError instances
pub struct AuthErrorBuilder {
    kind: AuthErrorKind,
    message: Option<String>,
    details: Option<Value>,
}

impl AuthErrorBuilder {
    /// Set the error message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach structured details
    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Build the final AuthError, falling back to the kind's default message
    pub fn build(self) -> AuthError {
        AuthError {
            message: self
                .message
                .unwrap_or_else(|| self.kind.default_message().to_string()),
            kind: self.kind,
            details: self.details,
        }
    }
}

/// Closed set of authentication failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorKind {
    /// Strict resolve was asked for a provider id that is not registered
    UnsupportedProvider,
    /// Strict resolve was called while no provider is registered
    EmptyProvider,
    /// The generic authenticate entry point got neither a credential nor a token
    UnsupportedValue,
    /// Token is malformed or expired
    InvalidToken,
    /// Provider rejected well-formed credentials
    AuthenticationFailed,
    /// Token refresh attempt failed
    RefreshTokenFailed,
    /// The storage port could not persist or clear the session
    Storage,
}

impl AuthErrorKind {
    /// Stable code string used across transports and logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedProvider => "UNSUPPORTED_PROVIDER",
            Self::EmptyProvider => "EMPTY_PROVIDER",
            Self::UnsupportedValue => "UNSUPPORTED_VALUE",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::RefreshTokenFailed => "REFRESH_TOKEN_FAILED",
            Self::Storage => "STORAGE_FAILED",
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            Self::UnsupportedProvider => "Unsupported authentication provider",
            Self::EmptyProvider => "No authentication provider is registered",
            Self::UnsupportedValue => "Value is neither a credential nor a token",
            Self::InvalidToken => "Authentication token is invalid",
            Self::AuthenticationFailed => "Authentication failed",
            Self::RefreshTokenFailed => "Failed to refresh authentication token",
            Self::Storage => "Failed to access local authentication storage",
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Custom Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

pub fn unsupported_provider(provider_id: &str) -> AuthError {
    AuthError::new(AuthErrorKind::UnsupportedProvider)
        .message(format!("Authentication provider '{}' is not registered", provider_id))
        .details(json!({ "provider_id": provider_id }))
        .build()
}

pub fn empty_provider() -> AuthError {
    AuthError::new(AuthErrorKind::EmptyProvider).build()
}

pub fn unsupported_value(value: &Value) -> AuthError {
    let shape = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    AuthError::new(AuthErrorKind::UnsupportedValue)
        .details(json!({ "shape": shape }))
        .build()
}

pub fn invalid_token(reason: impl fmt::Display) -> AuthError {
    AuthError::new(AuthErrorKind::InvalidToken)
        .message(format!("Authentication token is invalid: {}", reason))
        .build()
}

pub fn authentication_failed(reason: impl fmt::Display) -> AuthError {
    AuthError::new(AuthErrorKind::AuthenticationFailed)
        .message(format!("Authentication failed: {}", reason))
        .build()
}

pub fn refresh_token_failed(reason: impl fmt::Display) -> AuthError {
    AuthError::new(AuthErrorKind::RefreshTokenFailed)
        .message(format!("Failed to refresh authentication token: {}", reason))
        .build()
}

pub fn storage_failed(err: &anyhow::Error) -> AuthError {
    AuthError::new(AuthErrorKind::Storage)
        .message(format!("Local authentication storage failed: {}", err))
        .details(json!({ "cause": format!("{:#}", err) }))
        .build()
}

/// Build an error of `kind` for a request that never produced a response
pub fn transport_failed(kind: AuthErrorKind, operation: &str, err: &anyhow::Error) -> AuthError {
    AuthError::new(kind)
        .message(format!("{} request failed: {}", operation, err))
        .details(json!({ "cause": format!("{:#}", err) }))
        .build()
}

/// Build an error of `kind` from an HTTP response status and body
pub fn from_http_status(kind: AuthErrorKind, operation: &str, status: u16, body: &str) -> AuthError {
    AuthError::new(kind)
        .message(format!("{} rejected with HTTP {}", operation, status))
        .details(json!({ "status": status, "body": body }))
        .build()
}
