use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::auth::credential::{AuthCredential, UsernameAuthCredential};
use crate::auth::providers::AuthProvider;
use crate::auth::token::{AccountData, AuthAccount, AuthLoginDto, AuthToken};
use crate::common::retry::with_retry;
use crate::config::{RetryConfig, UsernameProviderConfig};
use crate::error::{self, AuthErrorKind, AuthResult};
use crate::transport::http_client::{json_headers, HttpClient, ReqwestHttpClient, SimpleHttpResponse};

const LOGIN_PATH: &str = "/login";
const SESSION_PATH: &str = "/session";
const REFRESH_PATH: &str = "/refresh";
const LOGOUT_PATH: &str = "/logout";
const PASSWORD_PATH: &str = "/password";

// Response type for login and refresh requests
#[derive(Debug, Deserialize)]
struct TokenResponse<D> {
    account: D,
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Vec<String>,
}

// Response for session validation requests
#[derive(Debug, Deserialize)]
struct SessionResponse<D> {
    account: D,
}

/// Username/password provider backed by a JSON HTTP API
pub struct UsernameAuthProvider<D> {
    provider_id: String,
    /// Base URL without trailing slash
    base_url: String,
    client: Arc<dyn HttpClient>,
    retry: RetryConfig,
    _account: PhantomData<fn() -> D>,
}

impl<D: AccountData> UsernameAuthProvider<D> {
    pub fn new(provider_id: impl Into<String>, base_url: impl Into<String>, client: Arc<dyn HttpClient>) -> Self {
        let base_url: String = base_url.into();
        Self {
            provider_id: provider_id.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry: RetryConfig::default(),
            _account: PhantomData,
        }
    }

    /// Build a provider with a reqwest client honouring the configured timeout
    pub fn from_config(config: &UsernameProviderConfig, retry: &RetryConfig) -> Result<Self> {
        let client = ReqwestHttpClient::with_timeout(Duration::from_secs(config.timeout_secs))?;
        Ok(Self::new(config.provider_id.clone(), config.base_url.clone(), Arc::new(client))
            .with_retry(retry.clone()))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, bearer: Option<&str>, body: Value) -> Result<SimpleHttpResponse> {
        let url = self.url(path);
        let headers = json_headers(bearer);
        let body = body.to_string();
        let context = format!("POST {}", url);

        with_retry(&self.retry, &context, || {
            self.client.post(&url, headers.clone(), body.clone())
        })
        .await
    }

    async fn get(&self, path: &str, bearer: Option<&str>) -> Result<SimpleHttpResponse> {
        let url = self.url(path);
        let headers = json_headers(bearer);
        let context = format!("GET {}", url);

        with_retry(&self.retry, &context, || self.client.get(&url, headers.clone())).await
    }

    /// Turn a token response into a login payload, keeping `previous`'s refresh token if none was issued
    fn issue(&self, response: TokenResponse<D>, previous: Option<&AuthToken>) -> AuthLoginDto<D> {
        let mut token = AuthToken::new(self.provider_id.clone(), response.access_token)
            .with_scope(response.scope);
        token.refresh_token = response
            .refresh_token
            .or_else(|| previous.and_then(|p| p.refresh_token.clone()));
        if let Some(expires_in) = response.expires_in {
            token = token.expires_in(expires_in);
        }

        AuthLoginDto {
            account: response.account,
            token,
        }
    }

    async fn refresh(&self, token: &AuthToken) -> AuthResult<AuthLoginDto<D>> {
        let refresh_token = match token.refresh_token.as_deref() {
            Some(refresh_token) if !refresh_token.is_empty() => refresh_token,
            _ => return Err(error::invalid_token("token has expired and cannot be refreshed")),
        };

        debug!(provider = %self.provider_id, "Refreshing access token");
        let response = self
            .post(REFRESH_PATH, None, json!({ "refresh_token": refresh_token }))
            .await
            .map_err(|e| error::transport_failed(AuthErrorKind::RefreshTokenFailed, "refresh", &e))?;

        if !response.is_success() {
            warn!(provider = %self.provider_id, status = response.status(), "Token refresh rejected");
            return Err(error::from_http_status(
                AuthErrorKind::RefreshTokenFailed,
                "refresh",
                response.status(),
                response.body(),
            ));
        }

        let parsed: TokenResponse<D> = response
            .json()
            .map_err(|e| error::refresh_token_failed(format!("malformed refresh response: {}", e)))?;

        info!(provider = %self.provider_id, "Access token refreshed");
        Ok(self.issue(parsed, Some(token)))
    }
}

#[async_trait]
impl<D: AccountData> AuthProvider<D> for UsernameAuthProvider<D> {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn login(&self, credential: &dyn AuthCredential) -> AuthResult<AuthLoginDto<D>> {
        let Some(credential) = credential.as_any().downcast_ref::<UsernameAuthCredential>() else {
            return Err(error::authentication_failed(format!(
                "provider '{}' only accepts username credentials",
                self.provider_id
            )));
        };

        debug!(provider = %self.provider_id, identity = %credential.identity(), "Logging in");
        let response = self
            .post(LOGIN_PATH, None, Value::Object(credential.to_map()))
            .await
            .map_err(|e| error::transport_failed(AuthErrorKind::AuthenticationFailed, "login", &e))?;

        if !response.is_success() {
            warn!(
                provider = %self.provider_id,
                identity = %credential.identity(),
                status = response.status(),
                "Login rejected"
            );
            return Err(error::from_http_status(
                AuthErrorKind::AuthenticationFailed,
                "login",
                response.status(),
                response.body(),
            ));
        }

        let parsed: TokenResponse<D> = response
            .json()
            .map_err(|e| error::authentication_failed(format!("malformed login response: {}", e)))?;

        info!(provider = %self.provider_id, identity = %credential.identity(), "Login succeeded");
        Ok(self.issue(parsed, None))
    }

    async fn login_with_auth_token(&self, token: &AuthToken) -> AuthResult<AuthLoginDto<D>> {
        if token.access_token.is_empty() || token.is_expired() {
            if token.can_refresh() {
                return self.refresh(token).await;
            }
            token.ensure_usable()?;
        }

        let response = self
            .get(SESSION_PATH, Some(&token.access_token))
            .await
            .map_err(|e| error::transport_failed(AuthErrorKind::InvalidToken, "session", &e))?;

        match response.status() {
            status if (200..300).contains(&status) => {
                let parsed: SessionResponse<D> = response
                    .json()
                    .map_err(|e| error::invalid_token(format!("malformed session response: {}", e)))?;
                debug!(provider = %self.provider_id, "Session token accepted");
                Ok(AuthLoginDto {
                    account: parsed.account,
                    token: token.clone(),
                })
            }
            status @ (401 | 403) if token.can_refresh() => {
                debug!(provider = %self.provider_id, status, "Session token rejected, attempting refresh");
                self.refresh(token).await
            }
            status => Err(error::from_http_status(
                AuthErrorKind::InvalidToken,
                "session",
                status,
                response.body(),
            )),
        }
    }

    async fn logout(&self, account: &AuthAccount<D>) -> AuthResult<()> {
        let response = self
            .post(LOGOUT_PATH, Some(&account.token.access_token), json!({}))
            .await
            .map_err(|e| error::transport_failed(AuthErrorKind::AuthenticationFailed, "logout", &e))?;

        if !response.is_success() {
            return Err(error::from_http_status(
                AuthErrorKind::AuthenticationFailed,
                "logout",
                response.status(),
                response.body(),
            ));
        }

        info!(provider = %self.provider_id, "Remote session invalidated");
        Ok(())
    }

    async fn change_password(
        &self,
        account: &AuthAccount<D>,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let response = self
            .post(
                PASSWORD_PATH,
                Some(&account.token.access_token),
                json!({ "old_password": old_password, "new_password": new_password }),
            )
            .await
            .map_err(|e| error::transport_failed(AuthErrorKind::AuthenticationFailed, "password change", &e))?;

        if !response.is_success() {
            warn!(provider = %self.provider_id, status = response.status(), "Password change rejected");
            return Err(error::from_http_status(
                AuthErrorKind::AuthenticationFailed,
                "password change",
                response.status(),
                response.body(),
            ));
        }

        info!(provider = %self.provider_id, "Password changed");
        Ok(())
    }
}
