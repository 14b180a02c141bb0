//! gauthctl: authenticated management of per-user gauth state files.
//!
//! A user authenticates through PAM, then either installs a config file they
//! own as their state file or removes it. Installation validates the source on
//! an `O_NOFOLLOW` descriptor, stages the bytes next to the target and commits
//! with a single `rename(2)`, so readers of the state root only ever see a
//! complete old file or a complete new one.

pub mod auth;
pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod state;

pub use auth::{AuthenticationGate, Authenticator};
pub use config::Settings;
pub use controller::{Controller, Operation, Outcome};
pub use error::{AuthFailure, GauthError, IoOp, ResolutionFailure, ValidationFailure};
pub use identity::Identity;
