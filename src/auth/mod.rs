//! Authentication gate.
//!
//! Nothing is written or removed until [`Authenticator::authenticate`]
//! succeeds. The system backend is PAM when built with the `pam` feature;
//! otherwise a backend that refuses every session is compiled in, so the
//! tool fails closed.

mod conversation;

use log::debug;

pub use conversation::{Conversation, ConversationError, MessageStyle, TerminalConversation};

use crate::error::AuthFailure;
use crate::identity::Identity;

cfg_if::cfg_if! {
    if #[cfg(feature = "pam")] {
        mod pam;
        pub use pam::PamBackend as SystemBackend;
    } else {
        mod unavailable;
        pub use unavailable::UnavailableBackend as SystemBackend;
    }
}

/// Anything that can vouch for an identity.
pub trait Authenticator {
    fn authenticate(&self, identity: &Identity) -> Result<(), AuthFailure>;
}

impl<A: Authenticator + ?Sized> Authenticator for &A {
    fn authenticate(&self, identity: &Identity) -> Result<(), AuthFailure> {
        (**self).authenticate(identity)
    }
}

/// An open session with the authentication module.
///
/// Implementations must end the session on drop if [`AuthSession::end`] was
/// never reached.
pub trait AuthSession {
    /// Run the challenge/response exchange.
    fn authenticate(&mut self) -> Result<(), AuthFailure>;
    /// Check the account is currently usable (not expired or locked).
    fn check_account(&mut self) -> Result<(), AuthFailure>;
    fn end(self) -> Result<(), AuthFailure>;
}

/// Opens sessions with an authentication module.
pub trait AuthBackend {
    type Session<'a>: AuthSession
    where
        Self: 'a;

    fn start<'a>(
        &'a self,
        service: &str,
        identity: &Identity,
    ) -> Result<Self::Session<'a>, AuthFailure>;
}

/// Runs start → authenticate → account check → end against a backend.
#[derive(Debug)]
pub struct AuthenticationGate<B> {
    backend: B,
    service: String,
}

impl<B: AuthBackend> AuthenticationGate<B> {
    pub fn new(backend: B, service: impl Into<String>) -> Self {
        Self {
            backend,
            service: service.into(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: AuthBackend> Authenticator for AuthenticationGate<B> {
    fn authenticate(&self, identity: &Identity) -> Result<(), AuthFailure> {
        debug!(
            "Starting authentication for {} with service {}",
            identity.name(),
            self.service
        );
        let mut session = self.backend.start(&self.service, identity)?;

        let outcome = session
            .authenticate()
            .and_then(|()| session.check_account());
        let ended = session.end();

        // The first failure is the one worth reporting.
        outcome?;
        ended?;
        debug!("Authenticated {}", identity.name());
        Ok(())
    }
}

/// Gate over the compiled-in backend, prompting on the terminal.
pub fn system_gate(service: &str) -> AuthenticationGate<SystemBackend> {
    AuthenticationGate::new(SystemBackend::new(Box::new(TerminalConversation)), service)
}
