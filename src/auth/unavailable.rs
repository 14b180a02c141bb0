//! Backend for builds without the `pam` feature. Refuses every session.

use super::{AuthBackend, AuthSession, Conversation};
use crate::error::AuthFailure;
use crate::identity::Identity;

pub struct UnavailableBackend;

impl UnavailableBackend {
    pub fn new(_conversation: Box<dyn Conversation>) -> Self {
        Self
    }
}

/// A session that can never exist.
pub enum NoSession {}

impl AuthSession for NoSession {
    fn authenticate(&mut self) -> Result<(), AuthFailure> {
        match *self {}
    }

    fn check_account(&mut self) -> Result<(), AuthFailure> {
        match *self {}
    }

    fn end(self) -> Result<(), AuthFailure> {
        match self {}
    }
}

impl AuthBackend for UnavailableBackend {
    type Session<'a> = NoSession;

    fn start<'a>(&'a self, service: &str, identity: &Identity) -> Result<NoSession, AuthFailure> {
        log::warn!(
            "Refusing to authenticate {} for {}: built without PAM support",
            identity.name(),
            service
        );
        Err(AuthFailure::Unavailable(
            "gauthctl was built without PAM support".to_string(),
        ))
    }
}
