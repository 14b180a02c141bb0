//! Process-wide settings.
//!
//! Values come from compiled-in defaults, optionally overridden by a TOML file
//! at [`SYSTEM_CONFIG_PATH`]. There is no environment or command line override:
//! the binary may run set-uid and its caller must not pick where state files
//! are written.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::error::{GauthError, Result};
use crate::state::DEFAULT_CHUNK_SIZE;

/// Fixed location of the optional system configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/gauthctl/gauthctl.toml";

/// State root baked in at build time (`GAUTH_STATEDIR`, see build.rs).
pub const DEFAULT_STATE_ROOT: &str = env!("GAUTH_STATEDIR");

/// PAM service name used for the authentication session.
pub const DEFAULT_SERVICE_NAME: &str = "gauthctl";

/// Upper bound on `copy_chunk_size`; the chunk is a single heap buffer.
pub const MAX_COPY_CHUNK_SIZE: usize = 1024 * 1024;
const DEFAULT_UMASK: u32 = 0o077;

static SETTINGS: OnceCell<Settings> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory holding one state file per user name.
    pub state_root: PathBuf,
    pub service_name: String,
    /// Read/write chunk used when staging a config.
    pub copy_chunk_size: usize,
    /// Process umask applied before any file is created.
    pub umask: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_root: PathBuf::from(DEFAULT_STATE_ROOT),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            copy_chunk_size: DEFAULT_CHUNK_SIZE,
            umask: DEFAULT_UMASK,
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(GauthError::Config {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        let settings: Settings = toml::from_str(&text).map_err(|e| GauthError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        settings.check(path)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(settings)
    }

    fn check(&self, path: &Path) -> Result<()> {
        let reason = if !self.state_root.is_absolute() {
            "state_root must be an absolute path"
        } else if self.service_name.is_empty() || self.service_name.contains('\0') {
            "service_name must be a non-empty string without NUL bytes"
        } else if self.copy_chunk_size == 0 {
            "copy_chunk_size must be greater than zero"
        } else if self.copy_chunk_size > MAX_COPY_CHUNK_SIZE {
            "copy_chunk_size must not exceed 1 MiB"
        } else if self.umask & DEFAULT_UMASK != DEFAULT_UMASK {
            "umask must mask all group and other bits (0o077)"
        } else {
            return Ok(());
        };

        Err(GauthError::Config {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        })
    }
}

/// Install the process-wide settings. Only the first call has any effect.
pub fn init(settings: Settings) -> &'static Settings {
    SETTINGS.get_or_init(|| settings)
}
