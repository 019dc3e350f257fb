//! Local IPC channel endpoints.
//!
//! Each session owns two named unidirectional byte channels created by the
//! gateway before the bridge starts:
//!
//! - `remotesession_<session_id>_inputs` — the bridge reads commands.
//! - `remotesession_<session_id>_updates` — the bridge writes frames.
//!
//! On Windows these are named pipes under `\\.\pipe\`; elsewhere they are
//! Unix domain sockets in the configured runtime directory.

use rdbridge_core::BridgeError;

use crate::config::IpcConfig;

/// Channel name for a session, without any platform prefix.
pub fn channel_name(session_id: u32, channel: &str) -> String {
    format!("remotesession_{session_id}_{channel}")
}

#[cfg(windows)]
mod platform {
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient};

    use super::*;

    pub type InputsChannel = NamedPipeClient;
    pub type UpdatesChannel = NamedPipeClient;

    /// Connect both session channels as named pipe clients.
    pub async fn connect(
        session_id: u32,
        _config: &IpcConfig,
    ) -> Result<(InputsChannel, UpdatesChannel), BridgeError> {
        let open = |channel: &str| -> Result<NamedPipeClient, BridgeError> {
            let name = channel_name(session_id, channel);
            ClientOptions::new()
                .open(format!(r"\\.\pipe\{name}"))
                .map_err(|source| BridgeError::IpcConnect { name, source })
        };
        Ok((open("inputs")?, open("updates")?))
    }
}

#[cfg(unix)]
mod platform {
    use std::path::PathBuf;

    use tokio::net::UnixStream;

    use super::*;

    pub type InputsChannel = UnixStream;
    pub type UpdatesChannel = UnixStream;

    fn socket_path(config: &IpcConfig, name: &str) -> PathBuf {
        let dir = if config.runtime_dir.is_empty() {
            PathBuf::from("/tmp")
        } else {
            PathBuf::from(&config.runtime_dir)
        };
        dir.join(name)
    }

    /// Connect both session channels as Unix stream sockets.
    pub async fn connect(
        session_id: u32,
        config: &IpcConfig,
    ) -> Result<(InputsChannel, UpdatesChannel), BridgeError> {
        let inputs_name = channel_name(session_id, "inputs");
        let inputs = UnixStream::connect(socket_path(config, &inputs_name))
            .await
            .map_err(|source| BridgeError::IpcConnect {
                name: inputs_name,
                source,
            })?;

        let updates_name = channel_name(session_id, "updates");
        let updates = UnixStream::connect(socket_path(config, &updates_name))
            .await
            .map_err(|source| BridgeError::IpcConnect {
                name: updates_name,
                source,
            })?;

        Ok((inputs, updates))
    }
}

pub use platform::{InputsChannel, UpdatesChannel, connect};
