//! Source config validation.
//!
//! The candidate file is opened with `O_NOFOLLOW` and every check runs on the
//! open descriptor. The descriptor itself is handed on to the installer, so the
//! path is resolved exactly once and nothing can be swapped in between the
//! checks and the copy.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use crate::error::{GauthError, IoOp, Result, ValidationFailure};
use crate::identity::Identity;

/// Group and other permission bits; none may be set on a source config.
const FOREIGN_ACCESS_MASK: u32 = 0o077;

/// An open source config that passed validation.
#[derive(Debug)]
pub struct ValidatedConfig {
    file: File,
    path: PathBuf,
    len: u64,
}

impl ValidatedConfig {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size reported by `fstat` at validation time.
    pub fn size(&self) -> u64 {
        self.len
    }

    pub(crate) fn into_file(self) -> (File, PathBuf) {
        (self.file, self.path)
    }

    #[cfg(test)]
    pub(crate) fn unchecked(file: File, path: &Path) -> Self {
        Self {
            file,
            path: path.to_path_buf(),
            len: 0,
        }
    }
}

/// Open `path` and check it is safe to install for `identity`.
pub fn validate(path: &Path, identity: &Identity) -> Result<ValidatedConfig> {
    let file = open_nofollow(path)?;
    let metadata = file
        .metadata()
        .map_err(|e| GauthError::io(IoOp::StatSource, path, e))?;

    if !metadata.is_file() {
        return Err(ValidationFailure::NotRegularFile {
            path: path.to_path_buf(),
        }
        .into());
    }

    if metadata.uid() != identity.uid() {
        return Err(ValidationFailure::WrongOwner {
            expected: identity.uid(),
            actual: metadata.uid(),
        }
        .into());
    }

    let mode = metadata.mode() & 0o7777;
    if mode & FOREIGN_ACCESS_MASK != 0 {
        return Err(ValidationFailure::InsecurePermissions { mode }.into());
    }

    log::debug!(
        "Validated {} (uid {}, mode {:04o}, {} bytes)",
        path.display(),
        metadata.uid(),
        mode,
        metadata.len()
    );

    Ok(ValidatedConfig {
        file,
        path: path.to_path_buf(),
        len: metadata.len(),
    })
}

fn open_nofollow(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC)
        .open(path)
        .map_err(|e| {
            // ELOOP is what O_NOFOLLOW reports for a symlink in the final component.
            if e.raw_os_error() == Some(libc::ELOOP) {
                ValidationFailure::InsecureLink {
                    path: path.to_path_buf(),
                }
                .into()
            } else {
                GauthError::io(IoOp::OpenSource, path, e)
            }
        })
}
