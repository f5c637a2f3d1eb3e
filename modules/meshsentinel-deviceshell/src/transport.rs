use async_trait::async_trait;
use meshsentinel_common::MeshResult;
use std::time::Duration;

/// Credentials for opening a `ShellTransport`.
#[derive(Debug, Clone)]
pub struct ShellCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub key_path: Option<String>,
}

/// Abstraction over "one serialised command channel to a networked
/// device" (spec §4.1). `DeviceShell` drives a `ShellTransport`; the
/// production implementation is `RusshTransport`, the test double is
/// `tests::FakeTransport` in this crate's integration tests.
#[async_trait]
pub trait ShellTransport: Send + Sync {
    async fn connect(creds: &ShellCredentials) -> MeshResult<Self>
    where
        Self: Sized;

    /// Run one command, returning its stdout. `deadline` bounds the
    /// wait; exceeding it is a `MeshError::Timeout`.
    async fn exec(&mut self, command: &str, deadline: Duration) -> MeshResult<String>;

    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}
