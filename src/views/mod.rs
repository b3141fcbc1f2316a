//! Role-gated dashboards
//!
//! Views never touch the identity provider. They use the token of the current
//! session and, when the backend rejects it, ask the controller to
//! re-validate through [`SessionCommands::invalidate`].

mod admin;
mod inspector;
mod supervisor;

pub use admin::{AdminDashboard, AdminOverview};
pub use inspector::InspectorDashboard;
pub use supervisor::SupervisorDashboard;

use crate::{
    error::{ApiError, ViewError},
    session::{Role, Session, SessionCommands, SessionState},
};
use log::warn;
use std::future::Future;

/// What the client should present for a session state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewKind {
    Loading,
    SignIn { error: Option<String> },
    Admin,
    Supervisor,
    Inspector,
    AccessDenied,
}

pub fn select_view(state: &SessionState) -> ViewKind {
    if state.loading {
        return ViewKind::Loading;
    }

    let session = &state.session;
    if !session.authenticated {
        return ViewKind::SignIn {
            error: session.error.clone(),
        };
    }

    match session.role {
        Some(Role::Admin) => ViewKind::Admin,
        Some(Role::Supervisor) => ViewKind::Supervisor,
        Some(Role::Inspector) => ViewKind::Inspector,
        None => ViewKind::AccessDenied,
    }
}

/// What a dashboard is built from
pub struct ViewContext<B> {
    pub token: String,
    pub role: Option<Role>,
    pub commands: SessionCommands,
    pub api: B,
}

impl<B> ViewContext<B> {
    pub fn new(session: &Session, commands: SessionCommands, api: B) -> Self {
        Self {
            token: session.token.clone(),
            role: session.role.filter(|_| session.authenticated),
            commands,
            api,
        }
    }

    fn require(self, role: Role) -> Result<Self, ViewError> {
        match self.role {
            Some(actual) if actual == role => Ok(self),
            Some(actual) => Err(ViewError::AccessDenied(format!(
                "{role} dashboard is not available to {actual}"
            ))),
            None => Err(ViewError::AccessDenied(format!(
                "{role} dashboard requires an authenticated session"
            ))),
        }
    }

    /// Await a backend call, reporting a rejected token to the session controller
    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ViewError> {
        match request.await {
            Err(e) if e.is_unauthorized() => {
                warn!("backend rejected session token, invalidating session");
                self.commands.invalidate();
                Err(e.into())
            }
            result => Ok(result?),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_context<B>(
    role: Role,
    api: B,
) -> (
    ViewContext<B>,
    tokio::sync::mpsc::UnboundedReceiver<crate::session::SessionCommand>,
) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let session = Session::authenticated("tok1".to_string(), role);
    (ViewContext::new(&session, SessionCommands::new(tx), api), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Phase;

    fn state(session: Session, loading: bool) -> SessionState {
        SessionState {
            session,
            phase: Phase::Authenticated,
            loading,
        }
    }

    #[test]
    fn loading_wins_over_everything() {
        let state = state(Session::authenticated("t".to_string(), Role::Admin), true);
        assert_eq!(select_view(&state), ViewKind::Loading);
    }

    #[test]
    fn unauthenticated_shows_sign_in_with_error() {
        let state = state(Session::signed_out(Some("expired".to_string())), false);
        assert_eq!(
            select_view(&state),
            ViewKind::SignIn {
                error: Some("expired".to_string())
            }
        );
    }

    #[test]
    fn each_role_gets_its_dashboard() {
        for (role, view) in [
            (Role::Admin, ViewKind::Admin),
            (Role::Supervisor, ViewKind::Supervisor),
            (Role::Inspector, ViewKind::Inspector),
        ] {
            let state = state(Session::authenticated("t".to_string(), role), false);
            assert_eq!(select_view(&state), view);
        }
    }

    #[test]
    fn authenticated_without_role_is_access_denied() {
        let session = Session {
            token: "t".to_string(),
            role: None,
            authenticated: true,
            error: None,
        };
        assert_eq!(select_view(&state(session, false)), ViewKind::AccessDenied);
    }
}
