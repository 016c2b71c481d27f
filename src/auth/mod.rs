pub mod credential;
pub mod manager;
pub mod providers;
pub mod repository;
pub mod service;
pub mod storage;
pub mod token;

pub use credential::{AuthCredential, UsernameAuthCredential};
pub use manager::{AuthProviderManager, AuthProviderManagerConfig};
pub use providers::{AuthProvider, AuthValue, UsernameAuthProvider};
pub use repository::{AuthEventKind, AuthRepository, AuthRepositoryEvent};
pub use service::{AuthService, SessionService};
pub use storage::{AuthLocalStoragePlatform, FileAuthStorage, MemoryAuthStorage};
pub use token::{AccountData, AuthAccount, AuthLoginDto, AuthToken};
