//! Link and authentication bookkeeping.

use std::fmt;

use ventlink_frame::AuthReply;

/// Authentication status of a connected session.
///
/// The unit does not reliably acknowledge AUTH, so `Authenticated` is reached
/// either from an explicit accept or from the first state frame that decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthStatus {
    #[default]
    Unauthenticated,
    AuthSent,
    Authenticated,
}

impl AuthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthStatus::Unauthenticated => "unauthenticated",
            AuthStatus::AuthSent => "auth-sent",
            AuthStatus::Authenticated => "authenticated",
        }
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection flag plus auth status, guarded together.
///
/// `generation` advances on every disconnect, so frames delivered by the
/// subscription of an earlier link can be told apart and dropped.
#[derive(Debug, Default)]
pub(crate) struct LinkState {
    connected: bool,
    auth: AuthStatus,
    generation: u64,
}

impl LinkState {
    pub(crate) fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn auth(&self) -> AuthStatus {
        self.auth
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Up, and still the link that `generation` was taken from.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.connected && self.generation == generation
    }

    /// A fresh link always starts unauthenticated.
    pub(crate) fn connected(&mut self) {
        self.connected = true;
        self.auth = AuthStatus::Unauthenticated;
    }

    /// Returns whether the link was up.
    pub(crate) fn disconnected(&mut self) -> bool {
        let was = self.connected;
        self.connected = false;
        self.auth = AuthStatus::Unauthenticated;
        self.generation = self.generation.wrapping_add(1);
        was
    }

    /// AUTH handed to the transport. Never downgrades `Authenticated`.
    pub(crate) fn auth_sent(&mut self) {
        if self.connected && self.auth == AuthStatus::Unauthenticated {
            self.auth = AuthStatus::AuthSent;
        }
    }

    /// Apply an AUTH reply. Returns the new status when it changed.
    pub(crate) fn auth_reply(&mut self, reply: AuthReply) -> Option<AuthStatus> {
        if !self.connected {
            return None;
        }
        let next = match reply {
            AuthReply::Acknowledged | AuthReply::Accepted => AuthStatus::Authenticated,
            AuthReply::Rejected(_) => AuthStatus::Unauthenticated,
        };
        (next != self.auth).then(|| {
            self.auth = next;
            next
        })
    }

    /// A state frame decoded. Returns true if this promoted the session.
    pub(crate) fn state_decoded(&mut self) -> bool {
        if self.connected && self.auth != AuthStatus::Authenticated {
            self.auth = AuthStatus::Authenticated;
            return true;
        }
        false
    }
}
