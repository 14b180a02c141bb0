//! Sequences a single gauthctl invocation.
//!
//! identity → state path → authentication → install or remove. Each step must
//! succeed before the next runs, so no failure before the last step can have
//! touched the filesystem.

use std::fmt;
use std::path::PathBuf;

use log::debug;

use crate::auth::Authenticator;
use crate::config::Settings;
use crate::error::Result;
use crate::identity::Identity;
use crate::state::{self, AtomicInstaller};

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Install `config` as the caller's state file.
    Enable { config: PathBuf },
    /// Remove the caller's state file.
    Disable,
}

/// Result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Enabled { state_file: PathBuf },
    Disabled { state_file: PathBuf },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Enabled { .. } => f.write_str("GAuth set up successfully"),
            Outcome::Disabled { .. } => f.write_str("GAuth disabled successfully"),
        }
    }
}

pub struct Controller<'s, A> {
    settings: &'s Settings,
    authenticator: A,
}

impl<'s, A: Authenticator> Controller<'s, A> {
    pub fn new(settings: &'s Settings, authenticator: A) -> Self {
        Self {
            settings,
            authenticator,
        }
    }

    /// Run `operation` for the real user of this process.
    pub fn run(&self, operation: Operation) -> Result<Outcome> {
        let identity = Identity::current()?;
        self.run_as(&identity, operation)
    }

    /// Run `operation` for an already resolved identity.
    pub fn run_as(&self, identity: &Identity, operation: Operation) -> Result<Outcome> {
        let state_file = state::resolve(&self.settings.state_root, identity)?;
        debug!(
            "State file for {} (uid {}) is {}",
            identity.name(),
            identity.uid(),
            state_file.display()
        );

        self.authenticator.authenticate(identity)?;

        match operation {
            Operation::Enable { config } => {
                let validated = state::validate(&config, identity)?;
                AtomicInstaller::new(self.settings.copy_chunk_size)
                    .install(validated, &state_file)?;
                Ok(Outcome::Enabled { state_file })
            }
            Operation::Disable => {
                state::remove(&state_file)?;
                Ok(Outcome::Disabled { state_file })
            }
        }
    }
}
