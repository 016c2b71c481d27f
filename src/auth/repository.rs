use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::auth::credential::AuthCredential;
use crate::auth::service::SessionService;
use crate::auth::token::{AuthAccount, AuthToken};
use crate::callback_system::{CallbackId, CallbackRegistry};
use crate::error::AuthResult;

/// Session lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthEventKind {
    Login,
    Logout,
    ChangePassword,
}

/// An event as delivered to callbacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRepositoryEvent {
    pub kind: AuthEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Façade applying session policy over a [`SessionService`].
///
/// `login` and `change_password` propagate failures unchanged. `logout` never
/// fails: the local session is over even if the remote call was not.
pub struct AuthRepository<D: Send + Sync + 'static> {
    service: Arc<dyn SessionService<D>>,
    logout_count: AtomicU64,
    events: CallbackRegistry<AuthRepositoryEvent>,
}

impl<D> AuthRepository<D>
where
    D: Send + Sync + 'static,
{
    pub fn new(service: Arc<dyn SessionService<D>>) -> Self {
        Self {
            service,
            logout_count: AtomicU64::new(0),
            events: CallbackRegistry::with_group("auth_repository"),
        }
    }

    pub async fn login(&self, credential: &dyn AuthCredential) -> AuthResult<Option<AuthAccount<D>>> {
        let account = self.service.login(credential).await?;
        self.emit_login(account.as_ref());
        Ok(account)
    }

    pub async fn login_with_auth_token(&self, token: &AuthToken) -> AuthResult<Option<AuthAccount<D>>> {
        let account = self.service.login_with_auth_token(token).await?;
        self.emit_login(account.as_ref());
        Ok(account)
    }

    /// End the session; failures of the underlying service are logged and dropped
    pub async fn logout(&self) {
        let count = self.logout_count.fetch_add(1, Ordering::SeqCst) + 1;

        match self.service.logout().await {
            Ok(()) => info!(logout_count = count, "Logged out"),
            Err(e) => warn!(
                logout_count = count,
                code = e.code(),
                error = %e,
                "Logout failed remotely, local session ended anyway"
            ),
        }

        self.emit(AuthEventKind::Logout, None);
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> AuthResult<()> {
        self.service.change_password(old_password, new_password).await?;
        self.emit(AuthEventKind::ChangePassword, None);
        Ok(())
    }

    /// Number of `logout` calls so far, successful or not
    pub fn logout_count(&self) -> u64 {
        self.logout_count.load(Ordering::SeqCst)
    }

    /// Register `callback` for every lifecycle event.
    ///
    /// Events arrive in the order the operations completed and none are dropped.
    /// Callbacks run on a Tokio task, so this fails outside a Tokio runtime.
    pub fn on_event<F>(&self, callback: F) -> anyhow::Result<CallbackId>
    where
        F: Fn(AuthEventKind, Option<Value>) + Send + Sync + 'static,
    {
        self.events.register(move |event: AuthRepositoryEvent| {
            callback(event.kind, event.data);
            Ok(())
        })
    }

    pub fn off_event(&self, id: CallbackId) -> bool {
        self.events.unregister(id)
    }

    fn emit_login(&self, account: Option<&AuthAccount<D>>) {
        let data = account.map(|account| {
            json!({
                "provider_id": account.provider_id,
                "identity": account.identity,
            })
        });
        self.emit(AuthEventKind::Login, data);
    }

    fn emit(&self, kind: AuthEventKind, data: Option<Value>) {
        match self.events.trigger(AuthRepositoryEvent { kind, data }) {
            Ok(delivered) => debug!(?kind, delivered, "Emitted auth event"),
            Err(e) => warn!(?kind, error = %e, "Failed to emit auth event"),
        }
    }
}
