use async_trait::async_trait;
use serde_json::Value;

use crate::auth::credential::{AuthCredential, UsernameAuthCredential};
use crate::auth::token::{AuthAccount, AuthLoginDto, AuthToken};
use crate::error::{self, AuthResult};

pub mod username;

pub use username::UsernameAuthProvider;

/// Common trait for all authentication providers.
///
/// Every provider exposes both login paths. A path a mechanism cannot serve
/// fails with `AUTHENTICATION_FAILED` rather than being absent.
#[async_trait]
pub trait AuthProvider<D>: Send + Sync
where
    D: Send + Sync + 'static,
{
    /// Id this provider registers under
    fn provider_id(&self) -> &str;

    /// Authenticate with caller-supplied credentials
    async fn login(&self, credential: &dyn AuthCredential) -> AuthResult<AuthLoginDto<D>>;

    /// Resume or refresh a session from a previously issued token
    async fn login_with_auth_token(&self, token: &AuthToken) -> AuthResult<AuthLoginDto<D>>;

    /// Invalidate the remote side of a session (if supported)
    async fn logout(&self, _account: &AuthAccount<D>) -> AuthResult<()> {
        Ok(())
    }

    /// Change the password of the session's identity (if supported)
    async fn change_password(
        &self,
        _account: &AuthAccount<D>,
        _old_password: &str,
        _new_password: &str,
    ) -> AuthResult<()> {
        Err(error::authentication_failed(format!(
            "provider '{}' does not support password changes",
            self.provider_id()
        )))
    }
}

/// Input to the generic `authenticate` entry point
#[derive(Debug, Clone)]
pub enum AuthValue {
    Credential(Box<dyn AuthCredential>),
    Token(AuthToken),
    /// Anything that is neither; authenticating it fails with `UNSUPPORTED_VALUE`
    Unsupported(Value),
}

impl AuthValue {
    /// Classify a JSON payload received from a transport
    pub fn from_json(value: Value) -> Self {
        let is_object_with = |keys: &[&str]| {
            value
                .as_object()
                .is_some_and(|map| keys.iter().all(|key| map.get(*key).is_some_and(Value::is_string)))
        };

        if is_object_with(&["provider_id", "access_token"]) {
            if let Ok(token) = serde_json::from_value::<AuthToken>(value.clone()) {
                return Self::Token(token);
            }
        } else if is_object_with(&["provider_id", "username", "password"]) {
            if let Ok(credential) = serde_json::from_value::<UsernameAuthCredential>(value.clone()) {
                return Self::Credential(Box::new(credential));
            }
        }

        Self::Unsupported(value)
    }

    /// Provider id carried by the value, if any
    pub fn provider_id(&self) -> Option<&str> {
        match self {
            Self::Credential(credential) => Some(credential.provider_id()),
            Self::Token(token) => Some(&token.provider_id),
            Self::Unsupported(_) => None,
        }
    }
}

impl From<AuthToken> for AuthValue {
    fn from(token: AuthToken) -> Self {
        Self::Token(token)
    }
}

impl From<UsernameAuthCredential> for AuthValue {
    fn from(credential: UsernameAuthCredential) -> Self {
        Self::Credential(Box::new(credential))
    }
}
