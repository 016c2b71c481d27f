//! HTTP transport used by network-backed providers.

pub mod http_client;

pub use http_client::{HttpClient, HttpMethod, ReqwestHttpClient, SimpleHttpResponse};
