//! State and staging path derivation. Pure path arithmetic, no filesystem access.

use std::path::{Path, PathBuf};

use crate::error::ResolutionFailure;
use crate::identity::Identity;

const STAGING_SUFFIX: &str = ".new";

/// `state_root/<user name>`.
///
/// The name must be exactly one normal path component, otherwise a crafted
/// passwd entry could point the write outside the state root.
pub fn resolve(state_root: &Path, identity: &Identity) -> Result<PathBuf, ResolutionFailure> {
    let name = identity.name();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(ResolutionFailure::InvalidName(name.to_string()));
    }

    let mut path = PathBuf::new();
    path.try_reserve(state_root.as_os_str().len() + 1 + name.len())
        .map_err(|_| ResolutionFailure::Exhausted)?;
    path.push(state_root);
    path.push(name);
    Ok(path)
}

/// Staging file next to `target`: the same name with `.new` appended.
pub fn staging_path(target: &Path) -> PathBuf {
    let mut staging = target.as_os_str().to_os_string();
    staging.push(STAGING_SUFFIX);
    PathBuf::from(staging)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_root_and_name() {
        let path = resolve(Path::new("/var/lib/gauth"), &Identity::new("alice", 1000)).unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/gauth/alice"));
    }

    #[test]
    fn trailing_separator_on_root_is_harmless() {
        let path = resolve(Path::new("/var/lib/gauth/"), &Identity::new("bob", 1001)).unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/gauth/bob"));
    }

    #[test]
    fn rejects_names_that_escape_the_root() {
        for name in ["", ".", "..", "../etc/shadow", "a/b"] {
            let err = resolve(Path::new("/var/lib/gauth"), &Identity::new(name, 1000)).unwrap_err();
            assert_eq!(err, ResolutionFailure::InvalidName(name.to_string()));
        }
    }

    #[test]
    fn staging_appends_suffix_instead_of_replacing_extension() {
        assert_eq!(
            staging_path(Path::new("/var/lib/gauth/first.last")),
            PathBuf::from("/var/lib/gauth/first.last.new")
        );
    }
}
