//! State file removal.

use std::fs;
use std::io;
use std::path::Path;

use log::info;

use crate::error::{GauthError, IoOp, Result};

/// Delete `target`. A file that is already gone counts as success.
pub fn remove(target: &Path) -> Result<()> {
    match fs::remove_file(target) {
        Ok(()) => {
            info!("Removed state file {}", target.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("No state file at {}, nothing to remove", target.display());
            Ok(())
        }
        Err(e) => Err(GauthError::io(IoOp::RemoveState, target, e)),
    }
}
