//! Bridge process configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
///
/// The session id and debug-log switch can also arrive from the
/// `MYRTILLE_SESSION_ID` / `MYRTILLE_DEBUG_LOG` environment variables the
/// gateway sets when it spawns the process; explicit values win over the
/// environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Session identity.
    pub session: SessionConfig,
    /// IPC channel settings.
    pub ipc: IpcConfig,
    /// Capture pipeline settings.
    pub capture: CaptureConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Session identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Remote session id. Zero disables the bridge entirely: every entry
    /// point short-circuits and the process exits at startup.
    pub id: u32,
}

/// IPC channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Directory holding the channel endpoints on platforms that address
    /// them through the filesystem. Empty selects the platform default.
    pub runtime_dir: String,
}

/// Capture pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Also save every emitted frame under
    /// `log/remotesession_<id>.<pid>/`. Floods the disk; debugging only.
    pub save_frames: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Redirect log output to a per-process file under `log/`.
    pub debug_log: bool,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            ipc: IpcConfig::default(),
            capture: CaptureConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { id: 0 }
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            runtime_dir: String::new(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { save_frames: false }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            debug_log: false,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl BridgeConfig {
    /// Load configuration from a TOML file, falling back to defaults, then
    /// fill unset knobs from the environment.
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if self.session.id == 0
            && let Ok(id) = std::env::var("MYRTILLE_SESSION_ID")
            && let Ok(id) = id.parse()
        {
            self.session.id = id;
        }
        if !self.logging.debug_log && std::env::var_os("MYRTILLE_DEBUG_LOG").is_some() {
            self.logging.debug_log = true;
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let cfg = Self::default();
        let text = toml::to_string_pretty(&cfg).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// The `log/` directory next to the executable's parent, shared by the
    /// debug log file and saved frame artifacts.
    pub fn log_dir() -> Option<PathBuf> {
        let exe = std::env::current_exe().ok()?;
        let parent = exe.parent()?.parent()?;
        Some(parent.join("log"))
    }
}

// ── Tests ────────────────────────────────────────────────────────
