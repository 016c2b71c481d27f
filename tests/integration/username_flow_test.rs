//! Username provider over HTTP with file-backed sessions

use std::sync::Arc;

use mockito::Matcher;
use serde_json::json;

use authkit::auth::{AuthLocalStoragePlatform, FileAuthStorage};
use authkit::{
    AuthAccount, AuthConfig, AuthErrorKind, AuthLoginDto, AuthService, AuthToken, AuthValue,
    SessionService, UsernameAuthCredential,
};

use crate::test_harness::{ada, Profile, TestEnvironment};

#[tokio::test]
async fn test_login_persists_session_and_restores_after_restart() {
    let mut env = TestEnvironment::new().await;

    let login = env
        .server
        .mock("POST", "/auth/login")
        .match_body(Matcher::Json(json!({ "username": "ada", "password": "hunter2" })))
        .with_status(200)
        .with_body(TestEnvironment::login_body("access-1", 3600).to_string())
        .expect(1)
        .create_async()
        .await;
    let session = env
        .server
        .mock("GET", "/auth/session")
        .match_header("authorization", "Bearer access-1")
        .with_status(200)
        .with_body(json!({ "account": { "id": 1, "name": "Ada" } }).to_string())
        .expect(1)
        .create_async()
        .await;

    let service = env.service();
    let account = service
        .login(&UsernameAuthCredential::new("username", "ada", "hunter2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.account, ada());
    assert_eq!(account.token.access_token, "access-1");
    assert!(env.session_path().exists());

    // The password never reaches the session file
    let on_disk = tokio::fs::read_to_string(env.session_path()).await.unwrap();
    assert!(!on_disk.contains("hunter2"));

    let restarted = env.service();
    assert!(restarted.current_account().await.is_none());
    let restored = restarted.restore_session().await.unwrap().unwrap();
    assert_eq!(restored.account, ada());
    assert_eq!(restored.identity.as_deref(), Some("ada"));
    assert_eq!(restarted.current_account().await, Some(restored));

    login.assert_async().await;
    session.assert_async().await;
}

#[tokio::test]
async fn test_rejected_login_is_authentication_failed() {
    let mut env = TestEnvironment::new().await;
    let _login = env.mock_json("POST", "/auth/login", 401, json!({ "error": "invalid credentials" }))
        .await;

    let service = env.service();
    let err = service
        .login(&UsernameAuthCredential::new("username", "ada", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "AUTHENTICATION_FAILED");
    assert_eq!(err.details.unwrap()["status"], 401);
    assert!(!env.session_path().exists());
}

#[tokio::test]
async fn test_unknown_provider_is_unsupported() {
    let env = TestEnvironment::new().await;
    let service = env.service();

    let err = service
        .authenticate(AuthValue::from_json(json!({
            "provider_id": "github",
            "username": "ada",
            "password": "pw"
        })))
        .await
        .unwrap_err();
    assert_eq!(err.kind, AuthErrorKind::UnsupportedProvider);
}

#[tokio::test]
async fn test_expired_session_is_refreshed_on_restore() {
    let mut env = TestEnvironment::new().await;
    let refresh = env
        .server
        .mock("POST", "/auth/refresh")
        .match_body(Matcher::Json(json!({ "refresh_token": "refresh-0" })))
        .with_status(200)
        .with_body(TestEnvironment::login_body("access-2", 3600).to_string())
        .expect(1)
        .create_async()
        .await;
    let session = env
        .server
        .mock("GET", "/auth/session")
        .expect(0)
        .create_async()
        .await;

    let storage = FileAuthStorage::<Profile>::new(env.session_path());
    let expired = AuthToken::new("username", "access-0")
        .with_refresh_token("refresh-0")
        .expires_in(-60);
    storage
        .save_local_authentication(&AuthAccount::from_login(
            "username",
            Some("ada".into()),
            AuthLoginDto {
                account: ada(),
                token: expired,
            },
        ))
        .await
        .unwrap();

    let service = env.service();
    let restored = service.restore_session().await.unwrap().unwrap();
    assert_eq!(restored.token.access_token, "access-2");
    assert!(restored.token.is_valid());

    // The refreshed token replaced the stored one
    let stored = storage.load_local_authentication().await.unwrap();
    assert_eq!(stored.token.access_token, "access-2");

    refresh.assert_async().await;
    session.assert_async().await;
}

#[tokio::test]
async fn test_revoked_session_is_cleared_on_restore() {
    let mut env = TestEnvironment::new().await;
    let _session = env.mock_json("GET", "/auth/session", 401, json!({ "error": "revoked" }))
        .await;

    let storage = FileAuthStorage::<Profile>::new(env.session_path());
    storage
        .save_local_authentication(&AuthAccount::from_login(
            "username",
            None,
            AuthLoginDto {
                account: ada(),
                token: AuthToken::new("username", "access-0"),
            },
        ))
        .await
        .unwrap();

    let service = env.service();
    let err = service.restore_session().await.unwrap_err();
    assert_eq!(err.kind, AuthErrorKind::InvalidToken);
    assert!(!env.session_path().exists());
    assert!(!service.is_authenticated().await);

    // Nothing left to restore
    assert_eq!(service.restore_session().await.unwrap(), None);
}

#[tokio::test]
async fn test_corrupt_session_file_does_not_block_start() {
    let env = TestEnvironment::new().await;
    tokio::fs::write(env.session_path(), b"\x00garbage").await.unwrap();

    let service = env.service();
    assert_eq!(service.restore_session().await.unwrap(), None);
}

#[tokio::test]
async fn test_change_password_and_logout_use_bearer() {
    let mut env = TestEnvironment::new().await;
    let _login = env.mock_json("POST", "/auth/login", 200, TestEnvironment::login_body("access-1", 3600))
        .await;
    let password = env
        .server
        .mock("POST", "/auth/password")
        .match_header("authorization", "Bearer access-1")
        .match_body(Matcher::Json(json!({ "old_password": "hunter2", "new_password": "hunter3" })))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;
    let logout = env
        .server
        .mock("POST", "/auth/logout")
        .match_header("authorization", "Bearer access-1")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let service = env.service();
    service
        .login(&UsernameAuthCredential::new("username", "ada", "hunter2"))
        .await
        .unwrap();
    service.change_password("hunter2", "hunter3").await.unwrap();
    service.logout().await.unwrap();

    assert!(!env.session_path().exists());
    assert!(!service.is_authenticated().await);
    password.assert_async().await;
    logout.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_backend_is_authentication_failed() {
    let env = TestEnvironment::new().await;
    let mut config: AuthConfig = env.config.clone();
    // Nothing listens on the discard port
    config.username_provider.base_url = "http://127.0.0.1:9/auth".to_string();

    let service: Arc<AuthService<Profile>> = Arc::new(AuthService::from_config(&config).unwrap());
    let err = service
        .login(&UsernameAuthCredential::new("username", "ada", "pw"))
        .await
        .unwrap_err();

    assert_eq!(err.kind, AuthErrorKind::AuthenticationFailed);
    assert!(err.details.unwrap().get("cause").is_some());
}
