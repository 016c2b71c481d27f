use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller-supplied proof of identity, prior to authentication.
///
/// Credentials are immutable; concrete variants offer a `copy_with` that
/// produces a modified copy.
pub trait AuthCredential: fmt::Debug + Send + Sync + 'static {
    /// Provider that this credential is meant for
    fn provider_id(&self) -> &str;

    /// Mechanism-specific primary identifier (e.g. the username)
    fn identity(&self) -> &str;

    /// Transport payload. Never contains the provider id.
    fn to_map(&self) -> Map<String, Value>;

    /// Downcast support for providers that accept one concrete variant
    fn as_any(&self) -> &dyn Any;

    fn clone_box(&self) -> Box<dyn AuthCredential>;
}

impl Clone for Box<dyn AuthCredential> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Username and password credential
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameAuthCredential {
    provider_id: String,
    username: String,
    password: String,
}

impl UsernameAuthCredential {
    pub fn new(
        provider_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Copy this credential, replacing only the fields that are given
    pub fn copy_with(
        &self,
        provider_id: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.unwrap_or_else(|| self.provider_id.clone()),
            username: username.unwrap_or_else(|| self.username.clone()),
            password: password.unwrap_or_else(|| self.password.clone()),
        }
    }
}

impl fmt::Debug for UsernameAuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsernameAuthCredential")
            .field("provider_id", &self.provider_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AuthCredential for UsernameAuthCredential {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn identity(&self) -> &str {
        &self.username
    }

    fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("username".to_string(), Value::String(self.username.clone()));
        map.insert("password".to_string(), Value::String(self.password.clone()));
        map
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn AuthCredential> {
        Box::new(self.clone())
    }
}
