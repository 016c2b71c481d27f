//! Pluggable authentication: providers behind one interface, a registry to
//! resolve them, a session repository with lifecycle events, a storage port
//! for the active session, and a deduplicator for concurrent async fetches.

pub mod auth;
pub mod callback_system;
pub mod common;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod transport;

pub use auth::{
    AccountData, AuthAccount, AuthCredential, AuthEventKind, AuthLocalStoragePlatform, AuthLoginDto,
    AuthProvider, AuthProviderManager, AuthProviderManagerConfig, AuthRepository, AuthRepositoryEvent,
    AuthService, AuthToken, AuthValue, FileAuthStorage, MemoryAuthStorage, SessionService,
    UsernameAuthCredential, UsernameAuthProvider,
};
pub use callback_system::{CallbackId, CallbackRegistry};
pub use common::{fetch_keyed, AsyncDeduplicator, KeyedDeduplicator, SharedFetch};
pub use config::AuthConfig;
pub use error::{AuthError, AuthErrorKind, AuthResult};
pub use telemetry::init_tracing;
