//! The invoking user.

use nix::unistd::{Uid, User, getuid};

use crate::error::ResolutionFailure;

/// Name and uid of the user the tool acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    name: String,
    uid: u32,
}

impl Identity {
    pub fn new(name: impl Into<String>, uid: u32) -> Self {
        Self {
            name: name.into(),
            uid,
        }
    }

    /// Resolve the *real* uid of this process against the password database.
    ///
    /// The effective uid is ignored so a set-uid install still acts for the
    /// person who ran it.
    pub fn current() -> Result<Self, ResolutionFailure> {
        Self::from_uid(getuid())
    }

    pub fn from_uid(uid: Uid) -> Result<Self, ResolutionFailure> {
        match User::from_uid(uid) {
            Ok(Some(user)) => Ok(Self::new(user.name, uid.as_raw())),
            Ok(None) => Err(ResolutionFailure::UnknownUser(uid.as_raw())),
            Err(errno) => Err(ResolutionFailure::Lookup(errno.desc().to_string())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }
}
