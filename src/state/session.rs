//! Session record for the current console user.
//!
//! SYSTEM CONTEXT
//! ==============
//! Published by `services::session::SessionContext` on every change. The
//! router picks the authenticated view tree from `token` alone.

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use super::flags::FlagSet;
use crate::net::types::Person;

/// Client-held record of the authenticated user.
///
/// An empty `token` means logged out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub email: String,
    pub user_name: String,
    pub flags: FlagSet,
    /// Last user-visible failure; empty when the last operation succeeded.
    pub error: String,
}

impl Session {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }

    /// Reset to the logged-out record.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Merge a fetched profile. Flags are appended, never replaced, so a
    /// repeated fetch cannot drop flags added meanwhile.
    pub fn apply_person(&mut self, person: Person) {
        self.email = person.email;
        self.user_name = person.user_name;
        self.flags.extend_missing(person.flags);
        self.error.clear();
    }
}

/// Coarse lifecycle phase derived from the session and in-flight logins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    LoggedOut,
    LoggingIn,
    LoggedIn,
}
