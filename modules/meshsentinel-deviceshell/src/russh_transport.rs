use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshsentinel_common::{MeshError, MeshResult};
use russh::client::{self, Handle};
use russh::ChannelMsg;
use tracing::{debug, warn};

use crate::transport::{ShellCredentials, ShellTransport};

struct AcceptAllKeys;

#[async_trait]
impl client::Handler for AcceptAllKeys {
    type Error = russh::Error;

    /// Consumer mesh routers run self-signed host keys that rotate across
    /// firmware updates; MeshSentinel trusts the configured host/port
    /// pair rather than pinning a host key fingerprint.
    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Production `ShellTransport` over an SSH session via `russh`.
pub struct RusshTransport {
    session: Handle<AcceptAllKeys>,
    connected: bool,
}

impl RusshTransport {
    async fn authenticate(
        session: &mut Handle<AcceptAllKeys>,
        creds: &ShellCredentials,
    ) -> MeshResult<()> {
        if let Some(key_path) = &creds.key_path {
            let key = russh_keys::load_secret_key(key_path, None)
                .map_err(|e| MeshError::Auth(format!("loading key {key_path}: {e}")))?;
            let ok = session
                .authenticate_publickey(&creds.user, Arc::new(key))
                .await
                .map_err(|e| MeshError::Unavailable(e.to_string()))?;
            if !ok {
                return Err(MeshError::Auth("public key rejected".into()));
            }
            return Ok(());
        }

        if let Some(password) = &creds.password {
            let ok = session
                .authenticate_password(&creds.user, password)
                .await
                .map_err(|e| MeshError::Unavailable(e.to_string()))?;
            if !ok {
                return Err(MeshError::Auth("password rejected".into()));
            }
            return Ok(());
        }

        Err(MeshError::Auth("no credentials configured".into()))
    }
}

#[async_trait]
impl ShellTransport for RusshTransport {
    async fn connect(creds: &ShellCredentials) -> MeshResult<Self> {
        let config = Arc::new(client::Config::default());
        let addr = (creds.host.as_str(), creds.port);
        let mut session = client::connect(config, addr, AcceptAllKeys)
            .await
            .map_err(|e| MeshError::Unavailable(e.to_string()))?;

        Self::authenticate(&mut session, creds).await?;

        // Probe command confirming liveness, per spec §4.1.
        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| MeshError::Unavailable(e.to_string()))?;
        channel
            .exec(true, "echo meshsentinel-probe")
            .await
            .map_err(|e| MeshError::Unavailable(e.to_string()))?;
        drain_channel(&mut channel, Duration::from_secs(5)).await?;

        Ok(Self {
            session,
            connected: true,
        })
    }

    async fn exec(&mut self, command: &str, deadline: Duration) -> MeshResult<String> {
        let mut channel = self
            .session
            .channel_open_session()
            .await
            .map_err(|e| MeshError::Unavailable(e.to_string()))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| MeshError::Unavailable(e.to_string()))?;

        debug!(command_prefix = %command.split_whitespace().next().unwrap_or(""), "exec");

        let (output, exit_code) = drain_channel_with_exit(&mut channel, deadline).await?;

        if exit_code.unwrap_or(0) != 0 {
            warn!(exit_code, "device command returned non-zero");
        }

        Ok(output)
    }

    async fn disconnect(&mut self) {
        let _ = self
            .session
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await;
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

async fn drain_channel(
    channel: &mut russh::Channel<client::Msg>,
    deadline: Duration,
) -> MeshResult<String> {
    let (out, _) = drain_channel_with_exit(channel, deadline).await?;
    Ok(out)
}

async fn drain_channel_with_exit(
    channel: &mut russh::Channel<client::Msg>,
    deadline: Duration,
) -> MeshResult<(String, Option<u32>)> {
    let mut output = Vec::new();
    let mut exit_code = None;

    let work = async {
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => output.extend_from_slice(&data),
                Some(ChannelMsg::ExtendedData { data, .. }) => output.extend_from_slice(&data),
                Some(ChannelMsg::ExitStatus { exit_status }) => exit_code = Some(exit_status),
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                _ => {}
            }
        }
    };

    tokio::time::timeout(deadline, work)
        .await
        .map_err(|_| MeshError::Timeout(deadline))?;

    Ok((String::from_utf8_lossy(&output).into_owned(), exit_code))
}
