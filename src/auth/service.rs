use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::auth::credential::AuthCredential;
use crate::auth::manager::{AuthProviderManager, AuthProviderManagerConfig};
use crate::auth::providers::{AuthValue, UsernameAuthProvider};
use crate::auth::storage::{AuthLocalStoragePlatform, FileAuthStorage};
use crate::auth::token::{AccountData, AuthAccount, AuthLoginDto, AuthToken};
use crate::common::AsyncDeduplicator;
use crate::config::AuthConfig;
use crate::error::{self, AuthError, AuthErrorKind, AuthResult};

/// Session operations the repository coordinates
#[async_trait]
pub trait SessionService<D>: Send + Sync
where
    D: Send + Sync + 'static,
{
    async fn login(&self, credential: &dyn AuthCredential) -> AuthResult<Option<AuthAccount<D>>>;

    async fn login_with_auth_token(&self, token: &AuthToken) -> AuthResult<Option<AuthAccount<D>>>;

    async fn logout(&self) -> AuthResult<()>;

    async fn change_password(&self, old_password: &str, new_password: &str) -> AuthResult<()>;
}

/// Provider resolution, persistence and the in-memory current session
pub struct AuthService<D: AccountData> {
    manager: Arc<AuthProviderManager<D>>,
    storage: Arc<dyn AuthLocalStoragePlatform<D>>,
    current: Arc<RwLock<Option<AuthAccount<D>>>>,
    /// Collapses concurrent restores into one provider round-trip
    restore: AsyncDeduplicator<Option<AuthAccount<D>>, AuthError>,
}

impl<D: AccountData> AuthService<D> {
    pub fn new(manager: Arc<AuthProviderManager<D>>, storage: Arc<dyn AuthLocalStoragePlatform<D>>) -> Self {
        Self {
            manager,
            storage,
            current: Arc::new(RwLock::new(None)),
            restore: AsyncDeduplicator::with_name("restore_session"),
        }
    }

    /// Username provider over HTTP with a file-backed session
    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let provider = UsernameAuthProvider::<D>::from_config(&config.username_provider, &config.retry)?;
        let manager = AuthProviderManager::new(AuthProviderManagerConfig {
            providers: vec![Arc::new(provider)],
        });
        let storage = FileAuthStorage::<D>::new(config.storage.path.clone());

        info!(
            provider = %config.username_provider.provider_id,
            storage = %config.storage.path.display(),
            "Auth service configured"
        );
        Ok(Self::new(Arc::new(manager), Arc::new(storage)))
    }

    pub fn manager(&self) -> &Arc<AuthProviderManager<D>> {
        &self.manager
    }

    pub async fn current_account(&self) -> Option<AuthAccount<D>> {
        self.current.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Dispatch on the shape of `value`
    pub async fn authenticate(&self, value: AuthValue) -> AuthResult<Option<AuthAccount<D>>> {
        match value {
            AuthValue::Credential(credential) => self.login(credential.as_ref()).await,
            AuthValue::Token(token) => self.login_with_auth_token(&token).await,
            AuthValue::Unsupported(value) => Err(error::unsupported_value(&value)),
        }
    }

    /// Resume the stored session through its provider.
    ///
    /// Concurrent calls share one attempt. A stored session whose token is
    /// rejected is removed from storage. An attempt superseded by `login` or
    /// `logout` resolves to `None` and leaves storage alone.
    pub async fn restore_session(&self) -> AuthResult<Option<AuthAccount<D>>> {
        let manager = Arc::clone(&self.manager);
        let storage = Arc::clone(&self.storage);
        let current = Arc::clone(&self.current);

        self.restore
            .fetch(move |signal| async move {
                let Some(stored) = storage.load_local_authentication().await else {
                    debug!("No stored session to restore");
                    return Ok::<_, AuthError>(None);
                };

                let provider = manager.resolve(&stored.provider_id)?;
                match provider.login_with_auth_token(&stored.token).await {
                    Ok(login) => {
                        // Held across the save so a login or logout cannot interleave with it
                        let mut current = current.write().await;
                        if signal.is_cancelled() {
                            debug!(provider = %stored.provider_id, "Session restore superseded, discarding result");
                            return Ok(None);
                        }

                        let account = AuthAccount::from_login(stored.provider_id, stored.identity, login);
                        storage
                            .save_local_authentication(&account)
                            .await
                            .map_err(|e| error::storage_failed(&e))?;
                        *current = Some(account.clone());

                        info!(provider = %account.provider_id, "Session restored");
                        Ok(Some(account))
                    }
                    Err(e) if e.is(AuthErrorKind::InvalidToken) || e.is(AuthErrorKind::RefreshTokenFailed) => {
                        let _current = current.write().await;
                        if signal.is_cancelled() {
                            debug!(provider = %stored.provider_id, code = e.code(), "Session restore superseded, keeping storage");
                            return Ok(None);
                        }

                        warn!(provider = %stored.provider_id, code = e.code(), "Stored session rejected, clearing it");
                        if let Err(clear_err) = storage.clear_local_authentication().await {
                            warn!(error = %clear_err, "Failed to clear rejected session");
                        }
                        Err(e)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
    }

    /// Persist and remember a freshly authenticated session
    async fn establish(
        &self,
        provider_id: &str,
        identity: Option<String>,
        login: AuthLoginDto<D>,
    ) -> AuthResult<AuthAccount<D>> {
        // A restore still in flight must not overwrite this session
        self.restore.invalidate();

        let account = AuthAccount::from_login(provider_id, identity, login);
        let mut current = self.current.write().await;
        self.storage
            .save_local_authentication(&account)
            .await
            .map_err(|e| error::storage_failed(&e))?;
        *current = Some(account.clone());
        drop(current);

        info!(provider = %provider_id, identity = ?account.identity, "Session established");
        Ok(account)
    }
}

#[async_trait]
impl<D: AccountData> SessionService<D> for AuthService<D> {
    async fn login(&self, credential: &dyn AuthCredential) -> AuthResult<Option<AuthAccount<D>>> {
        let provider = self.manager.resolve(credential.provider_id())?;
        let login = provider.login(credential).await?;

        let account = self
            .establish(provider.provider_id(), Some(credential.identity().to_string()), login)
            .await?;
        Ok(Some(account))
    }

    async fn login_with_auth_token(&self, token: &AuthToken) -> AuthResult<Option<AuthAccount<D>>> {
        let provider = self.manager.resolve(&token.provider_id)?;
        let login = provider.login_with_auth_token(token).await?;

        let account = self.establish(provider.provider_id(), None, login).await?;
        Ok(Some(account))
    }

    /// Clear local state, then end the remote session
    async fn logout(&self) -> AuthResult<()> {
        self.restore.invalidate();

        let (account, clear_result) = {
            let mut current = self.current.write().await;
            let account = match current.take() {
                Some(account) => Some(account),
                None => self.storage.load_local_authentication().await,
            };
            let clear_result = self
                .storage
                .clear_local_authentication()
                .await
                .map_err(|e| error::storage_failed(&e));
            (account, clear_result)
        };

        let Some(account) = account else {
            debug!("Logout without an active session");
            return clear_result;
        };

        match self.manager.get_provider(&account.provider_id) {
            Some(provider) => provider.logout(&account).await?,
            None => warn!(provider = %account.provider_id, "Provider no longer registered, skipping remote logout"),
        }

        info!(provider = %account.provider_id, "Logged out");
        clear_result
    }

    async fn change_password(&self, old_password: &str, new_password: &str) -> AuthResult<()> {
        let account = self
            .current
            .read()
            .await
            .clone()
            .ok_or_else(|| error::authentication_failed("no active session"))?;

        let provider = self.manager.resolve(&account.provider_id)?;
        provider.change_password(&account, old_password, new_password).await
    }
}
