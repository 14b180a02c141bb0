//! Atomic installation of a validated config as a state file.
//!
//! Bytes are copied into `<target>.new`, created exclusively with mode 0600,
//! then renamed over the target. The rename is the only step that changes
//! what readers of the target see.
//!
//! A live staging file is held under an exclusive `flock(2)`. Only a staging
//! file whose lock can be taken is stale and may be unlinked, so one installer
//! never removes or commits another installer's bytes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::Path;

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use super::path::staging_path;
use super::validate::ValidatedConfig;
use crate::error::{GauthError, IoOp, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 4096;

const STATE_FILE_MODE: u32 = 0o600;

/// Device and inode of an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    fn of(file: &File) -> io::Result<Self> {
        let metadata = file.metadata()?;
        Ok(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    /// Whether `path` currently names this file. A missing path does not.
    fn is_named_by(self, path: &Path) -> io::Result<bool> {
        match fs::symlink_metadata(path) {
            Ok(metadata) => Ok(metadata.dev() == self.dev && metadata.ino() == self.ino),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Removes the staging file on drop unless the install committed.
///
/// Must be dropped while the staging lock is still held.
struct StagingGuard<'a> {
    path: &'a Path,
    id: FileId,
    armed: bool,
}

impl<'a> StagingGuard<'a> {
    fn new(path: &'a Path, id: FileId) -> Self {
        Self {
            path,
            id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.id.is_named_by(self.path) {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    "Staging file {} no longer ours, leaving it",
                    self.path.display()
                );
                return;
            }
            Err(e) => {
                warn!("Failed to stat staging file {}: {}", self.path.display(), e);
                return;
            }
        }
        match fs::remove_file(self.path) {
            Ok(()) => debug!("Removed abandoned staging file {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove staging file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AtomicInstaller {
    chunk_size: usize,
}

impl Default for AtomicInstaller {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl AtomicInstaller {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Replace `target` with the bytes of `config`.
    ///
    /// On error the target is untouched and the staging file created by this
    /// call, if any, is gone. If another installer holds `<target>.new` the
    /// call fails with [`GauthError::StagingCollision`] and leaves that file
    /// alone.
    pub fn install(&self, config: ValidatedConfig, target: &Path) -> Result<()> {
        let staging = staging_path(target);
        debug!(
            "Staging {} bytes from {} for {}",
            config.size(),
            config.path().display(),
            target.display()
        );

        remove_stale_staging(&staging)?;
        let output = create_staging(&staging)?;
        let id = FileId::of(&output)
            .map_err(|e| GauthError::io(IoOp::CreateStaging, &staging, e))?;
        let mut output = match Flock::lock(output, FlockArg::LockExclusiveNonblock) {
            Ok(locked) => locked,
            Err((_, errno)) => {
                // On EWOULDBLOCK whoever holds the lock took our file for stale.
                if errno != Errno::EWOULDBLOCK {
                    drop(StagingGuard::new(&staging, id));
                }
                return Err(lock_failure(errno, &staging, IoOp::CreateStaging));
            }
        };
        // Declared after the lock so it is dropped first.
        let guard = StagingGuard::new(&staging, id);

        let (mut input, source) = config.into_file();
        let copied = self.copy(&mut input, &source, &mut output, &staging)?;

        output
            .sync_all()
            .map_err(|e| GauthError::io(IoOp::SyncStaging, &staging, e))?;
        drop(input);

        // Under our lock nobody else unlinks the path, so this holds through the rename.
        let still_ours = id
            .is_named_by(&staging)
            .map_err(|e| GauthError::io(IoOp::CommitRename, &staging, e))?;
        if !still_ours {
            guard.disarm();
            return Err(GauthError::StagingCollision { path: staging });
        }

        fs::rename(&staging, target).map_err(|e| GauthError::io(IoOp::CommitRename, target, e))?;
        guard.disarm();
        drop(output);

        sync_parent_dir(target);
        info!(
            "Installed {} bytes from {} as {}",
            copied,
            source.display(),
            target.display()
        );
        Ok(())
    }

    fn copy(
        &self,
        input: &mut File,
        source: &Path,
        output: &mut File,
        staging: &Path,
    ) -> Result<u64> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut total = 0u64;
        loop {
            let n = match input.read(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(GauthError::io(IoOp::ReadSource, source, e)),
            };
            output
                .write_all(&buf[..n])
                .map_err(|e| GauthError::io(IoOp::WriteStaging, staging, e))?;
            total += n as u64;
        }
    }
}

fn lock_failure(errno: Errno, staging: &Path, op: IoOp) -> GauthError {
    if errno == Errno::EWOULDBLOCK {
        GauthError::StagingCollision {
            path: staging.to_path_buf(),
        }
    } else {
        GauthError::io(op, staging, io::Error::from(errno))
    }
}

/// Unlink a staging file left behind by an installer that is gone.
///
/// A staging file whose lock is held belongs to a live installer and is a
/// collision.
fn remove_stale_staging(staging: &Path) -> Result<()> {
    let stale_err = |e: io::Error| GauthError::io(IoOp::RemoveStaleStaging, staging, e);

    let file = match OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(staging)
    {
        Ok(file) => Some(file),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        // A symlink is never one of ours; unlink the link itself.
        Err(e) if e.raw_os_error() == Some(libc::ELOOP) => None,
        Err(e) => return Err(stale_err(e)),
    };

    let _lock = match file {
        Some(file) => {
            let id = FileId::of(&file).map_err(stale_err)?;
            let locked = Flock::lock(file, FlockArg::LockExclusiveNonblock)
                .map_err(|(_, errno)| lock_failure(errno, staging, IoOp::RemoveStaleStaging))?;
            // Replaced between open and lock: a live installer recreated it.
            if !id.is_named_by(staging).map_err(stale_err)? {
                return Err(GauthError::StagingCollision {
                    path: staging.to_path_buf(),
                });
            }
            Some(locked)
        }
        None => None,
    };

    match fs::remove_file(staging) {
        Ok(()) => {
            debug!("Removed stale staging file {}", staging.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(stale_err(e)),
    }
}

/// Exclusive create; an existing file means another installer got there first.
fn create_staging(staging: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(STATE_FILE_MODE)
        .custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC)
        .open(staging)
        .map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                GauthError::StagingCollision {
                    path: staging.to_path_buf(),
                }
            } else {
                GauthError::io(IoOp::CreateStaging, staging, e)
            }
        })
}

/// Make the rename durable. The install already committed, so failures only warn.
fn sync_parent_dir(target: &Path) {
    let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        warn!("Failed to sync directory {}: {}", parent.display(), e);
    }
}
