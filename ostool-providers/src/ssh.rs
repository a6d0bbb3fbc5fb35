use crate::shell::{CommandOutput, ShellTarget};
use crate::{RemoteConnection, RemoteSession, RemoteShell};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use russh::client;
use russh::ChannelMsg;
use std::sync::Arc;
use std::time::Duration;

/// Password-authenticated SSH transport.
pub struct SshShell {
    config: Arc<client::Config>,
    connect_timeout: Duration,
}

impl SshShell {
    pub fn new(connect_timeout: Duration) -> Self {
        let config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(600)),
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
            connect_timeout,
        }
    }
}

impl Default for SshShell {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// Hypervisor host keys are not pinned anywhere we could check against.
struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn connect(&self, target: &ShellTarget) -> Result<Box<dyn RemoteConnection>> {
        let addr = target.address();
        tracing::debug!(%addr, user = %target.user, "opening SSH connection");

        let connecting = client::connect(
            self.config.clone(),
            (target.host.as_str(), target.port),
            AcceptAnyHostKey,
        );
        let mut handle = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .with_context(|| format!("SSH connection to {} timed out", addr))?
            .with_context(|| format!("SSH connection to {} failed", addr))?;

        let authenticated = handle
            .authenticate_password(target.user.as_str(), target.password.as_str())
            .await
            .with_context(|| format!("SSH authentication exchange with {} failed", addr))?;
        if !authenticated {
            bail!("SSH password authentication rejected for {}@{}", target.user, addr);
        }

        tracing::debug!(%addr, "SSH connection established");
        Ok(Box::new(SshConnection { handle, addr }))
    }
}

// Dropping the handle closes the connection.
struct SshConnection {
    handle: client::Handle<AcceptAnyHostKey>,
    addr: String,
}

#[async_trait]
impl RemoteConnection for SshConnection {
    async fn open_session(&mut self) -> Result<Box<dyn RemoteSession>> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .with_context(|| format!("SSH session failed on {}", self.addr))?;
        Ok(Box::new(SshSession { channel }))
    }
}

struct SshSession {
    channel: russh::Channel<client::Msg>,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&mut self, command: &str) -> Result<CommandOutput> {
        self.channel
            .exec(true, command)
            .await
            .context("failed to start remote command")?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = self.channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        })
    }
}
