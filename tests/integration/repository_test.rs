//! Repository policy on top of the real service

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::sleep;

use authkit::{AuthErrorKind, AuthEventKind, UsernameAuthCredential};

use crate::test_harness::{ada, TestEnvironment};

type Seen = Arc<Mutex<Vec<(AuthEventKind, Option<Value>)>>>;

fn recorder() -> (Seen, impl Fn(AuthEventKind, Option<Value>) + Send + Sync + 'static) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |kind, data| sink.lock().push((kind, data)))
}

#[tokio::test]
async fn test_logout_succeeds_when_backend_fails() {
    let mut env = TestEnvironment::new().await;
    let _login = env.mock_json("POST", "/auth/login", 200, TestEnvironment::login_body("access-1", 3600))
        .await;
    let _logout = env.mock_json("POST", "/auth/logout", 500, json!({ "error": "backend down" }))
        .await;

    let service = env.service();
    let repository = env.repository(Arc::clone(&service));
    let (seen, callback) = recorder();
    repository.on_event(callback).unwrap();

    let account = repository
        .login(&UsernameAuthCredential::new("username", "ada", "hunter2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.account, ada());

    repository.logout().await;
    assert_eq!(repository.logout_count(), 1);
    assert!(!service.is_authenticated().await);
    assert!(!env.session_path().exists());

    sleep(Duration::from_millis(50)).await;
    assert_eq!(
        *seen.lock(),
        vec![
            (
                AuthEventKind::Login,
                Some(json!({ "provider_id": "username", "identity": "ada" }))
            ),
            (AuthEventKind::Logout, None),
        ]
    );
}

#[tokio::test]
async fn test_change_password_rejection_propagates() {
    let mut env = TestEnvironment::new().await;
    let _login = env.mock_json("POST", "/auth/login", 200, TestEnvironment::login_body("access-1", 3600))
        .await;
    let _password = env.mock_json("POST", "/auth/password", 403, json!({ "error": "wrong password" }))
        .await;

    let service = env.service();
    let repository = env.repository(Arc::clone(&service));
    let (seen, callback) = recorder();
    repository.on_event(callback).unwrap();

    repository
        .login(&UsernameAuthCredential::new("username", "ada", "hunter2"))
        .await
        .unwrap();
    let err = repository.change_password("nope", "hunter3").await.unwrap_err();
    assert_eq!(err.kind, AuthErrorKind::AuthenticationFailed);
    assert_eq!(err.details.unwrap()["status"], 403);

    // Session survives a failed password change
    assert!(service.is_authenticated().await);

    sleep(Duration::from_millis(50)).await;
    let kinds: Vec<AuthEventKind> = seen.lock().iter().map(|(kind, _)| *kind).collect();
    assert_eq!(kinds, vec![AuthEventKind::Login]);
}

#[tokio::test]
async fn test_logout_without_session_still_counts() {
    let env = TestEnvironment::new().await;
    let repository = env.repository(env.service());

    repository.logout().await;
    repository.logout().await;
    assert_eq!(repository.logout_count(), 2);
}
