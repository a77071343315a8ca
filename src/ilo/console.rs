//! Remote command channel: one-shot command execution on the iLO's SSH
//! console.
//!
//! Every call opens a fresh session, authenticates with the configured
//! password, runs a single command and disconnects; old iLO firmware drops
//! idle sessions anyway, so nothing is kept alive between calls. The
//! channel performs no retries. Whether a failed command is retried is
//! the caller's policy.

use std::{borrow::Cow, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::debug;
use russh::{ChannelMsg, Disconnect, Preferred, client, kex};
use russh_keys::key;

use crate::{config::DeviceCfg, error::CommandError};

/// Executes a single command on the managed device.
///
/// The mode controller talks to the device exclusively through this trait,
/// which keeps transitions testable without an iLO on the bench.
#[async_trait]
pub trait RemoteConsole: Send + Sync {
    /// Runs `command` on the device and returns its standard output.
    async fn run(&self, command: &str) -> Result<String, CommandError>;
}

/// Kex offer including the legacy groups old iLO firmware insists on.
const LEGACY_KEX: &[kex::Name] = &[
    kex::CURVE25519,
    kex::DH_G14_SHA256,
    kex::DH_G14_SHA1,
    kex::DH_G1_SHA1,
];

/// Host-key offer including plain `ssh-rsa` for the same firmware.
const LEGACY_HOST_KEYS: &[key::Name] = &[
    key::ED25519,
    key::RSA_SHA2_512,
    key::RSA_SHA2_256,
    key::SSH_RSA,
];

/// SSH implementation of [`RemoteConsole`].
pub struct SshConsole {
    host: String,
    port: u16,
    username: String,
    password: String,
    timeout: Duration,
    config: Arc<client::Config>,
}

/// Accepts whatever host key the device presents.
///
/// iLO boards regenerate their key on factory reset and are reached over
/// the management network only; the weakened trust model is an explicit,
/// documented policy (see [`DeviceCfg`]).
struct AcceptingHostKey;

#[async_trait]
impl client::Handler for AcceptingHostKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _key: &key::PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

impl SshConsole {
    /// Creates a console for the given device. `timeout` bounds each
    /// complete call (connect, auth, exec, read).
    pub fn new(device: &DeviceCfg, timeout: Duration) -> Self {
        let preferred = if device.legacy_algorithms {
            Preferred {
                kex: Cow::Borrowed(LEGACY_KEX),
                key: Cow::Borrowed(LEGACY_HOST_KEYS),
                ..Preferred::default()
            }
        } else {
            Preferred::default()
        };

        let config = client::Config {
            inactivity_timeout: Some(timeout),
            preferred,
            ..Default::default()
        };

        Self {
            host: device.host.clone(),
            port: device.ssh_port,
            username: device.username.clone(),
            password: device.password.clone(),
            timeout,
            config: Arc::new(config),
        }
    }

    async fn exec(&self, command: &str) -> Result<String, CommandError> {
        let mut session = client::connect(
            self.config.clone(),
            (self.host.as_str(), self.port),
            AcceptingHostKey,
        )
        .await
        .map_err(|source| CommandError::Connect {
            host: self.host.clone(),
            source,
        })?;

        let authenticated = session
            .authenticate_password(self.username.clone(), self.password.clone())
            .await?;
        if !authenticated {
            return Err(CommandError::Auth {
                user: self.username.clone(),
                host: self.host.clone(),
            });
        }

        let mut channel = session.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => status = Some(exit_status),
                _ => {}
            }
        }

        let _ = session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;

        match status {
            Some(0) | None => {
                debug!("Remote command executed: {command}");
                Ok(String::from_utf8_lossy(&stdout).into_owned())
            }
            Some(status) => Err(CommandError::Exec {
                status,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            }),
        }
    }
}

#[async_trait]
impl RemoteConsole for SshConsole {
    async fn run(&self, command: &str) -> Result<String, CommandError> {
        match tokio::time::timeout(self.timeout, self.exec(command)).await {
            Ok(result) => result,
            Err(_) => Err(CommandError::Timeout(self.timeout)),
        }
    }
}
