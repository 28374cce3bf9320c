//! SSH client built on russh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::keys::PublicKey;
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::{Disconnect, client};
use tracing::{debug, info};
use webssh_core::{
    AuthMethod, ConnectParams, FileSubsystem, RemoteConnector, RemoteError, RemoteHandle,
    ShellChannel, TermSize,
};

use crate::error::SshError;
use crate::sftp::SftpFiles;
use crate::shell::open_shell;

/// Interval between SSH keepalive requests.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);

/// Connects to SSH servers.
pub struct SshConnector {
    config: Arc<client::Config>,
}

impl SshConnector {
    /// Create a connector sending a keepalive every `keepalive`.
    #[must_use]
    pub fn new(keepalive: Duration) -> Self {
        let config = client::Config {
            // Liveness is tracked through keepalives only.
            inactivity_timeout: None,
            keepalive_interval: Some(keepalive),
            keepalive_max: 3,
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
        }
    }

    async fn authenticate(
        handle: &mut client::Handle<ClientHandler>,
        params: &ConnectParams,
    ) -> Result<(), SshError> {
        let result = match &params.auth {
            AuthMethod::Password { password } => handle
                .authenticate_password(&params.username, password)
                .await
                .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?,
            AuthMethod::PrivateKey { key, passphrase } => {
                let key = russh::keys::decode_secret_key(key, passphrase.as_deref())?;
                let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);
                handle
                    .authenticate_publickey(&params.username, key_with_hash)
                    .await
                    .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?
            }
        };

        if result.success() {
            Ok(())
        } else {
            Err(SshError::AuthenticationFailed(
                "Authentication rejected by server".to_string(),
            ))
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(DEFAULT_KEEPALIVE)
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn RemoteHandle>, RemoteError> {
        info!(host = %params.host, port = params.port, "Connecting to SSH server");

        let handler = ClientHandler {
            host: params.host.clone(),
            port: params.port,
        };
        let mut handle = client::connect(
            Arc::clone(&self.config),
            (params.host.as_str(), params.port),
            handler,
        )
        .await
        .map_err(|e| SshError::ConnectionFailed(e.to_string()))?;

        debug!("SSH handshake completed");

        Self::authenticate(&mut handle, params).await?;

        info!(
            host = %params.host,
            username = %params.username,
            method = params.auth.kind(),
            "SSH authentication successful"
        );

        Ok(Box::new(SshHandle { handle }))
    }
}

/// Handler for server-initiated russh callbacks.
pub struct ClientHandler {
    host: String,
    port: u16,
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host keys are accepted as presented; there is no known_hosts store.
        debug!("Accepting host key for {}:{}", self.host, self.port);
        Ok(true)
    }
}

/// An authenticated SSH connection.
pub struct SshHandle {
    handle: client::Handle<ClientHandler>,
}

#[async_trait]
impl RemoteHandle for SshHandle {
    async fn open_shell(&self, size: TermSize) -> Result<ShellChannel, RemoteError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::ChannelError(e.to_string()))?;
        Ok(open_shell(channel, size).await?)
    }

    async fn open_file_subsystem(&self) -> Result<Box<dyn FileSubsystem>, RemoteError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::ChannelError(e.to_string()))?;
        Ok(Box::new(SftpFiles::open(channel).await?))
    }

    async fn close(&self) -> Result<(), RemoteError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(SshError::from)?;
        Ok(())
    }
}
