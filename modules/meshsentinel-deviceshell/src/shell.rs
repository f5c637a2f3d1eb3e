use std::time::Duration;

use meshsentinel_common::{MeshError, MeshResult};
use tokio::sync::Mutex;
use tracing::warn;

use crate::circuit_breaker::CircuitBreaker;
use crate::transport::{ShellCredentials, ShellTransport};

const DEFAULT_COMMAND_DEADLINE: Duration = Duration::from_secs(15);

/// One serialised command channel to a networked device (spec §4.1).
/// Commands issued by different callers are serialised through the inner
/// `Mutex`; an in-flight command cancelled by the caller tears down the
/// transport rather than leaving it half-read.
pub struct DeviceShell<T: ShellTransport> {
    creds: ShellCredentials,
    transport: Mutex<Option<T>>,
    breaker: CircuitBreaker,
    command_deadline: Duration,
}

impl<T: ShellTransport> DeviceShell<T> {
    pub fn new(creds: ShellCredentials) -> Self {
        Self {
            creds,
            transport: Mutex::new(None),
            breaker: CircuitBreaker::with_defaults(),
            command_deadline: DEFAULT_COMMAND_DEADLINE,
        }
    }

    pub fn with_command_deadline(mut self, deadline: Duration) -> Self {
        self.command_deadline = deadline;
        self
    }

    pub async fn connect(&self) -> MeshResult<()> {
        self.breaker.allow()?;
        let result = T::connect(&self.creds).await;
        match &result {
            Ok(_) => self.breaker.on_success(),
            Err(MeshError::Auth(_)) => self.breaker.open_immediately(),
            Err(_) => self.breaker.on_failure(),
        }
        let transport = result?;
        *self.transport.lock().await = Some(transport);
        Ok(())
    }

    /// Run a single shell command. Transient transport errors are retried
    /// once before counting against the breaker; `AuthError` opens the
    /// breaker immediately and is never retried.
    pub async fn exec(&self, command: &str) -> MeshResult<String> {
        self.breaker.allow()?;

        let mut guard = self.transport.lock().await;
        let transport = guard
            .as_mut()
            .ok_or_else(|| MeshError::Unavailable("not connected".into()))?;

        let first = transport.exec(command, self.command_deadline).await;
        let outcome = match first {
            Ok(out) => Ok(out),
            Err(MeshError::Auth(msg)) => {
                self.breaker.open_immediately();
                return Err(MeshError::Auth(msg));
            }
            Err(transient) => {
                warn!(error = %transient, "transient exec failure, retrying once");
                transport.exec(command, self.command_deadline).await
            }
        };

        match &outcome {
            Ok(_) => self.breaker.on_success(),
            Err(MeshError::Auth(_)) => self.breaker.open_immediately(),
            Err(_) => self.breaker.on_failure(),
        }
        outcome
    }

    pub async fn get_kv(&self, key: &str) -> MeshResult<String> {
        let out = self.exec(&format!("kv get {key}")).await?;
        Ok(out.trim().to_string())
    }

    pub async fn set_kv(&self, key: &str, value: &str) -> MeshResult<()> {
        self.exec(&format!("kv set {key} {value}")).await?;
        Ok(())
    }

    pub async fn commit(&self) -> MeshResult<()> {
        self.exec("kv commit").await?;
        Ok(())
    }

    pub async fn restart_radio(&self) -> MeshResult<()> {
        self.exec("wifi restart").await?;
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.transport
            .lock()
            .await
            .as_ref()
            .map(|t| t.is_connected())
            .unwrap_or(false)
    }

    pub async fn disconnect(&self) {
        if let Some(transport) = self.transport.lock().await.as_mut() {
            transport.disconnect().await;
        }
        *self.transport.lock().await = None;
    }

    pub fn reset_circuit(&self) {
        self.breaker.reset();
    }

    pub fn is_circuit_open(&self) -> bool {
        self.breaker.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted fake transport: the Nth call to `exec` returns the Nth
    /// entry of `script`, cycling the last entry once exhausted.
    struct FakeTransport {
        script: Arc<Vec<MeshResult<String>>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ShellTransport for FakeTransport {
        async fn connect(_creds: &ShellCredentials) -> MeshResult<Self> {
            Ok(Self {
                script: Arc::new(vec![Ok("ok".to_string())]),
                calls: Arc::new(AtomicUsize::new(0)),
            })
        }

        async fn exec(&mut self, _command: &str, _deadline: Duration) -> MeshResult<String> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let idx = idx.min(self.script.len() - 1);
            match &self.script[idx] {
                Ok(s) => Ok(s.clone()),
                Err(MeshError::Auth(m)) => Err(MeshError::Auth(m.clone())),
                Err(MeshError::Unavailable(m)) => Err(MeshError::Unavailable(m.clone())),
                Err(e) => Err(MeshError::Unavailable(e.to_string())),
            }
        }

        async fn disconnect(&mut self) {}

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn creds() -> ShellCredentials {
        ShellCredentials {
            host: "192.0.2.1".into(),
            port: 22,
            user: "admin".into(),
            password: Some("x".into()),
            key_path: None,
        }
    }

    #[tokio::test]
    async fn connect_then_exec_succeeds() {
        let shell: DeviceShell<FakeTransport> = DeviceShell::new(creds());
        shell.connect().await.unwrap();
        let out = shell.exec("system info").await.unwrap();
        assert_eq!(out, "ok");
        assert!(!shell.is_circuit_open());
    }

    #[tokio::test]
    async fn retries_once_on_transient_failure_then_succeeds() {
        let shell: DeviceShell<FakeTransport> = DeviceShell::new(creds());
        shell.connect().await.unwrap();
        {
            let mut guard = shell.transport.lock().await;
            let t = guard.as_mut().unwrap();
            t.script = Arc::new(vec![
                Err(MeshError::Unavailable("blip".into())),
                Ok("recovered".into()),
            ]);
            t.calls = Arc::new(AtomicUsize::new(0));
        }
        let out = shell.exec("cmd").await.unwrap();
        assert_eq!(out, "recovered");
    }

    #[tokio::test]
    async fn auth_error_opens_breaker_without_retry() {
        let shell: DeviceShell<FakeTransport> = DeviceShell::new(creds());
        shell.connect().await.unwrap();
        {
            let mut guard = shell.transport.lock().await;
            let t = guard.as_mut().unwrap();
            t.script = Arc::new(vec![Err(MeshError::Auth("bad creds".into()))]);
            t.calls = Arc::new(AtomicUsize::new(0));
        }
        let err = shell.exec("cmd").await.unwrap_err();
        assert!(matches!(err, MeshError::Auth(_)));
        assert!(shell.is_circuit_open());
    }

    #[tokio::test]
    async fn reset_circuit_forces_closed() {
        let shell: DeviceShell<FakeTransport> = DeviceShell::new(creds());
        shell.connect().await.unwrap();
        {
            let mut guard = shell.transport.lock().await;
            let t = guard.as_mut().unwrap();
            t.script = Arc::new(vec![Err(MeshError::Auth("bad".into()))]);
            t.calls = Arc::new(AtomicUsize::new(0));
        }
        let _ = shell.exec("cmd").await;
        assert!(shell.is_circuit_open());
        shell.reset_circuit();
        assert!(!shell.is_circuit_open());
    }
}
