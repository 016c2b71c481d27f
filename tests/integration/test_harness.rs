//! Shared setup for the integration tests

use std::path::PathBuf;
use std::sync::Arc;

use mockito::{Mock, Server, ServerGuard};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;

use authkit::config::RetryConfig;
use authkit::telemetry::init_from_config;
use authkit::{AuthConfig, AuthRepository, AuthService};

/// Account shape returned by the mock backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: u64,
    pub name: String,
}

pub fn ada() -> Profile {
    Profile {
        id: 1,
        name: "Ada".to_string(),
    }
}

/// Mock backend, a temporary session directory and a configuration pointing at both
pub struct TestEnvironment {
    pub server: ServerGuard,
    pub config: AuthConfig,
    _dir: TempDir,
}

impl TestEnvironment {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let dir = TempDir::new().expect("temp dir");

        let mut config = AuthConfig::default();
        config.username_provider.base_url = format!("{}/auth", server.url());
        config.username_provider.timeout_secs = 5;
        config.storage.path = dir.path().join("session.json");
        config.retry = RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
        };

        init_from_config(&config);

        Self {
            server,
            config,
            _dir: dir,
        }
    }

    pub fn session_path(&self) -> PathBuf {
        self.config.storage.path.clone()
    }

    /// A fresh service over the same backend and session file, as after a restart
    pub fn service(&self) -> Arc<AuthService<Profile>> {
        Arc::new(AuthService::from_config(&self.config).expect("valid config"))
    }

    pub fn repository(&self, service: Arc<AuthService<Profile>>) -> AuthRepository<Profile> {
        AuthRepository::new(service)
    }

    pub async fn mock_json(&mut self, method: &str, path: &str, status: usize, body: Value) -> Mock {
        self.server
            .mock(method, path)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    /// Successful login response for `ada`
    pub fn login_body(access_token: &str, expires_in: i64) -> Value {
        json!({
            "account": { "id": 1, "name": "Ada" },
            "access_token": access_token,
            "refresh_token": "refresh-1",
            "expires_in": expires_in,
            "scope": ["profile"]
        })
    }
}
