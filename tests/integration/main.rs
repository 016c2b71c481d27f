//! Integration tests for authkit.
//! These drive the public API end to end: HTTP provider against a mock server,
//! file-backed sessions, the repository façade and the deduplicators.

mod test_harness;

mod dedup_test;
mod repository_test;
mod username_flow_test;
