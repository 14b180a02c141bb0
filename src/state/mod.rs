//! Per-user state files.
//!
//! # Module Structure
//!
//! - `path` - State and staging path derivation
//! - `validate` - `O_NOFOLLOW` open and ownership/permission checks
//! - `install` - Staged copy and atomic rename
//! - `remove` - Idempotent removal
//!
//! A user's state is either absent or enabled. [`AtomicInstaller::install`]
//! moves to enabled, [`remove`] moves to absent, and both are defined for
//! either starting state.

mod install;
mod path;
mod remove;
mod validate;

use nix::sys::stat::{Mode, umask};

pub use install::{AtomicInstaller, DEFAULT_CHUNK_SIZE};
pub use path::{resolve, staging_path};
pub use remove::remove;
pub use validate::{ValidatedConfig, validate};

/// Set the process umask so nothing created afterwards is wider than `mask`
/// allows. Returns the previous mask.
pub fn restrict_umask(mask: u32) -> u32 {
    let previous = umask(Mode::from_bits_truncate(mask as libc::mode_t));
    log::debug!("umask {:04o} -> {:04o}", previous.bits(), mask);
    previous.bits() as u32
}
