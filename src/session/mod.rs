//! Session lifecycle
//!
//! The [`SessionController`] is the only writer of the session. Views and the
//! driver observe it through a [`SessionHandle`] and ask for changes through
//! [`SessionCommands`].

mod controller;
mod store;

pub use controller::SessionController;
pub use store::{CachedSession, FileSessionStore, MemorySessionStore, SessionStore};

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tokio::sync::{mpsc, watch};

/// Authorization tier of the signed-in principal
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Supervisor,
    Inspector,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Supervisor => "supervisor",
            Role::Inspector => "inspector",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "supervisor" => Ok(Role::Supervisor),
            "inspector" => Ok(Role::Inspector),
            other => Err(other.to_string()),
        }
    }
}

/// Signed-in identity as reported by the identity provider
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub email: String,
}

/// The client's record of the current authentication status
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub role: Option<Role>,
    pub authenticated: bool,
    pub error: Option<String>,
}

impl Session {
    pub fn authenticated(token: String, role: Role) -> Self {
        Self {
            token,
            role: Some(role),
            authenticated: true,
            error: None,
        }
    }

    pub fn signed_out(error: Option<String>) -> Self {
        Self {
            error,
            ..Default::default()
        }
    }
}

/// Position of the controller in the authentication state machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Initial,
    WaitingForProvider,
    Acquiring,
    ResolvingRole,
    Authenticated,
    Unauthenticated,
    SigningOut,
}

/// Snapshot published to readers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub session: Session,
    pub phase: Phase,
    /// While set, views render a placeholder and make no API calls
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session: Session::default(),
            phase: Phase::Initial,
            loading: true,
        }
    }
}

impl SessionState {
    /// True once the controller has reached a state views can act on
    pub fn is_settled(&self) -> bool {
        !self.loading && matches!(self.phase, Phase::Authenticated | Phase::Unauthenticated)
    }
}

/// Read-only view of the session
#[derive(Clone, Debug)]
pub struct SessionHandle {
    rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub(crate) fn new(rx: watch::Receiver<SessionState>) -> Self {
        Self { rx }
    }

    pub fn snapshot(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    /// Wait for the next published state
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait for the next settled state, skipping intermediate phases
    ///
    /// States published before this handle was created or last polled do not count.
    pub async fn next_settled(&mut self) -> Option<SessionState> {
        loop {
            let state = self.changed().await?;
            if state.is_settled() {
                return Some(state);
            }
        }
    }
}

/// Requests views may send to the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    Logout,
    /// A backend call was rejected with 401
    Invalidate,
}

#[derive(Clone, Debug)]
pub struct SessionCommands {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionCommands {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self { tx }
    }

    pub fn logout(&self) {
        self.send(SessionCommand::Logout)
    }

    pub fn invalidate(&self) {
        self.send(SessionCommand::Invalidate)
    }

    fn send(&self, command: SessionCommand) {
        if self.tx.send(command).is_err() {
            log::warn!("session controller stopped, dropping {command:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_its_wire_name() {
        for role in [Role::Admin, Role::Supervisor, Role::Inspector] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert_eq!("root".parse::<Role>(), Err("root".to_string()));
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn initial_state_is_loading_and_empty() {
        let state = SessionState::default();
        assert!(state.loading);
        assert!(!state.is_settled());
        assert_eq!(state.session, Session::default());
    }

    #[tokio::test]
    async fn next_settled_waits_past_already_seen_and_intermediate_states() {
        let (tx, _rx) = watch::channel(SessionState {
            phase: Phase::Unauthenticated,
            loading: false,
            ..Default::default()
        });
        let mut handle = SessionHandle::new(tx.subscribe());
        let waiter = tokio::spawn(async move { handle.next_settled().await });

        tx.send_modify(|state| state.phase = Phase::Acquiring);
        tokio::task::yield_now().await;
        tx.send_replace(SessionState {
            session: Session::authenticated("tok1".to_string(), Role::Admin),
            phase: Phase::Authenticated,
            loading: false,
        });

        let state = waiter
            .await
            .expect("waiter should not panic")
            .expect("should settle");
        assert_eq!(state.phase, Phase::Authenticated);
        assert_eq!(state.session.token, "tok1");
    }
}
