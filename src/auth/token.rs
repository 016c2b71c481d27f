use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{self, AuthResult};

/// Bound for provider-specific account payloads.
///
/// Accounts are cloned into every caller of a deduplicated session restore and
/// round-tripped through storage, so they must be cheap to share and serializable.
pub trait AccountData: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> AccountData for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// A previously issued session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    /// Provider that issued this token
    pub provider_id: String,

    /// The access token used for API requests
    pub access_token: String,

    /// An optional refresh token used to obtain new access tokens
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// When the access token expires (if known)
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,

    /// The permissions granted to this token
    #[serde(default)]
    pub scope: Vec<String>,

    /// Additional provider-specific information
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,

    /// When this token was issued or refreshed
    #[serde(default = "Utc::now")]
    pub issued_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn new(provider_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            access_token: access_token.into(),
            refresh_token: None,
            expiration: None,
            scope: Vec::new(),
            metadata: BTreeMap::new(),
            issued_at: Utc::now(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Set the expiration relative to now
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.expiration = Some(Utc::now() + Duration::seconds(seconds));
        self
    }

    pub fn with_scope(mut self, scope: Vec<String>) -> Self {
        self.scope = scope;
        self
    }

    /// Check if the token is usable (non-empty and not expired)
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        self.expiration.is_some_and(|exp| exp <= Utc::now())
    }

    /// Check if the token will expire within the given threshold
    pub fn expires_soon(&self, threshold_secs: i64) -> bool {
        self.expiration
            .is_some_and(|exp| (exp - Utc::now()).num_seconds() < threshold_secs)
    }

    /// Seconds until expiration, negative once expired
    pub fn seconds_until_expiration(&self) -> Option<i64> {
        self.expiration.map(|exp| (exp - Utc::now()).num_seconds())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Fails with `INVALID_TOKEN` unless the token can be presented as-is
    pub fn ensure_usable(&self) -> AuthResult<()> {
        if self.access_token.is_empty() {
            return Err(error::invalid_token("access token is empty"));
        }
        if self.is_expired() {
            return Err(error::invalid_token("access token has expired"));
        }
        Ok(())
    }

    /// Get a typed value from the token metadata
    pub fn get_metadata<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.metadata
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Set a value in the token metadata
    pub fn set_metadata<T: Serialize>(&mut self, key: &str, value: T) -> serde_json::Result<()> {
        self.metadata.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }
}

/// Payload produced by a successful provider authentication.
///
/// Only providers construct this, as the return of a login call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthLoginDto<D> {
    /// Provider-specific account shape
    pub account: D,
    /// Token issued (or re-validated) for this session
    pub token: AuthToken,
}

/// The persisted current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthAccount<D> {
    pub provider_id: String,
    /// Primary identifier of the credential used, when known
    #[serde(default)]
    pub identity: Option<String>,
    pub account: D,
    pub token: AuthToken,
    pub authenticated_at: DateTime<Utc>,
}

impl<D> AuthAccount<D> {
    pub fn from_login(provider_id: impl Into<String>, identity: Option<String>, login: AuthLoginDto<D>) -> Self {
        Self {
            provider_id: provider_id.into(),
            identity,
            account: login.account,
            token: login.token,
            authenticated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthErrorKind;

    #[test]
    fn test_expiry_checks() {
        let fresh = AuthToken::new("username", "abc").expires_in(3600);
        assert!(fresh.is_valid());
        assert!(!fresh.expires_soon(60));
        assert!(fresh.expires_soon(7200));

        let stale = AuthToken::new("username", "abc").expires_in(-5);
        assert!(stale.is_expired());
        assert!(!stale.is_valid());
        assert!(stale.seconds_until_expiration().unwrap() < 0);

        let open_ended = AuthToken::new("username", "abc");
        assert!(!open_ended.is_expired());
        assert_eq!(open_ended.seconds_until_expiration(), None);
    }

    #[test]
    fn test_ensure_usable() {
        let err = AuthToken::new("username", "").ensure_usable().unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::InvalidToken);

        let err = AuthToken::new("username", "abc")
            .expires_in(-1)
            .ensure_usable()
            .unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::InvalidToken);

        assert!(AuthToken::new("username", "abc").ensure_usable().is_ok());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let mut token = AuthToken::new("username", "abc");
        token.set_metadata("device", "laptop").unwrap();
        assert_eq!(token.get_metadata::<String>("device").as_deref(), Some("laptop"));
        assert_eq!(token.get_metadata::<String>("missing"), None);
        assert_eq!(token.get_metadata::<u32>("device"), None);
    }

    #[test]
    fn test_deserialize_minimal_token() {
        let token: AuthToken = serde_json::from_value(serde_json::json!({
            "provider_id": "username",
            "access_token": "abc"
        }))
        .unwrap();
        assert!(token.refresh_token.is_none());
        assert!(!token.can_refresh());
        assert!(token.scope.is_empty());
    }
}
