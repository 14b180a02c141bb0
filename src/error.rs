//! Error taxonomy for gauthctl.
//!
//! Every failure the tool can report is one of the variants of [`GauthError`].
//! All of them are fatal: the caller reports the message and exits non-zero,
//! and none of them leave a half-committed state file behind.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Failures of the authentication gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    /// The authentication module refused to open a session.
    #[error("Unable to start PAM conversation: {0}")]
    Start(String),

    /// The credential exchange did not succeed.
    #[error("Authentication failed: {0}")]
    Credentials(String),

    /// Credentials were fine but the account is expired, locked, etc.
    #[error("Account unavailable: {0}")]
    Account(String),

    /// The session could not be torn down cleanly.
    #[error("Unable to finish PAM conversation: {0}")]
    Finish(String),

    /// No authentication module is compiled in.
    #[error("Authentication unavailable: {0}")]
    Unavailable(String),
}

/// Failures while working out who the caller is and where their state lives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionFailure {
    #[error("Unable to get username: no passwd entry for uid {0}")]
    UnknownUser(u32),

    #[error("Unable to get username: {0}")]
    Lookup(String),

    /// The user name cannot be used as a single file name under the state root.
    #[error("User name {0:?} is not usable as a state file name")]
    InvalidName(String),

    #[error("Memory allocation failed while building state path")]
    Exhausted,
}

/// Reasons a candidate config file is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
    #[error("Input file {} is a symbolic link", path.display())]
    InsecureLink { path: PathBuf },

    #[error("Input file is not owned by calling user (owner uid {actual}, expected {expected})")]
    WrongOwner { expected: u32, actual: u32 },

    #[error("Input file has insecure permissions (mode {mode:04o}, readable to others)")]
    InsecurePermissions { mode: u32 },

    #[error("Input file {} is not a regular file", path.display())]
    NotRegularFile { path: PathBuf },
}

/// The filesystem step an [`GauthError::Io`] failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    OpenSource,
    StatSource,
    RemoveStaleStaging,
    CreateStaging,
    ReadSource,
    WriteStaging,
    SyncStaging,
    CommitRename,
    RemoveState,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IoOp::OpenSource => "Unable to open new config file",
            IoOp::StatSource => "Unable to stat input file",
            IoOp::RemoveStaleStaging => "Unable to pre-unlink temporary file",
            IoOp::CreateStaging => "Unable to open temporary file for writing",
            IoOp::ReadSource => "Reading config file failed",
            IoOp::WriteStaging => "Writing temporary file failed",
            IoOp::SyncStaging => "Syncing temporary file failed",
            IoOp::CommitRename => "Replacing state file failed",
            IoOp::RemoveState => "Unable to remove state file",
        };
        f.write_str(text)
    }
}

/// Top-level error returned by every gauthctl operation.
#[derive(Debug, thiserror::Error)]
pub enum GauthError {
    #[error(transparent)]
    Auth(#[from] AuthFailure),

    #[error(transparent)]
    Resolution(#[from] ResolutionFailure),

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error("{op} ({})", path.display())]
    Io {
        op: IoOp,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another installer created the staging file first.
    #[error("Temporary file {} already exists; another gauthctl is installing", path.display())]
    StagingCollision { path: PathBuf },

    #[error("Invalid configuration in {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}

impl GauthError {
    /// Convenience constructor for I/O errors tagged with the failing step.
    pub(crate) fn io(op: IoOp, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = GauthError> = std::result::Result<T, E>;
