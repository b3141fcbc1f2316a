use super::{
    CachedSession, Phase, Principal, Role, Session, SessionCommand, SessionCommands,
    SessionHandle, SessionState, SessionStore,
};
use crate::{
    backend_client::BackendApi,
    config::SessionConfig,
    error::{ApiError, SessionError},
    identity_provider::IdentityProvider,
};
use anyhow::{Result, bail};
use log::{debug, error, info, warn};
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time::{Instant, timeout},
};

/// A rejected token is refreshed at most this many times per resolution
const MAX_REFRESH_RETRIES: u32 = 1;

/// Owns the session and keeps it consistent with the identity provider and
/// the backend's view of the principal's role
///
/// Cloning yields another handle to the same controller.
pub struct SessionController<P, B, S> {
    inner: Arc<Inner<P, B, S>>,
}

impl<P, B, S> Clone for SessionController<P, B, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<P, B, S> {
    provider: P,
    backend: B,
    store: S,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    principal: Mutex<Option<Principal>>,
    /// Principal the published session was resolved for, if known
    validated_for: Mutex<Option<String>>,
    /// Bumped on every sign-out; outcomes started before it are discarded
    epoch: AtomicU64,
    revalidating: AtomicBool,
    last_notification: Mutex<Option<Instant>>,
    commands_tx: mpsc::UnboundedSender<SessionCommand>,
    commands_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionCommand>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<P, B, S> SessionController<P, B, S>
where
    P: IdentityProvider + Send + Sync + 'static,
    B: BackendApi + Send + Sync + 'static,
    S: SessionStore + 'static,
{
    pub fn new(provider: P, backend: B, store: S, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(Inner {
                provider,
                backend,
                store,
                config,
                state,
                principal: Mutex::new(None),
                validated_for: Mutex::new(None),
                epoch: AtomicU64::new(0),
                revalidating: AtomicBool::new(false),
                last_notification: Mutex::new(None),
                commands_tx,
                commands_rx: Mutex::new(Some(commands_rx)),
            }),
        }
    }

    /// Read-only handle for views
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.inner.state.subscribe())
    }

    /// Command handle for views (logout, session invalidation)
    pub fn commands(&self) -> SessionCommands {
        SessionCommands::new(self.inner.commands_tx.clone())
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn session(&self) -> Session {
        self.inner.state.borrow().session.clone()
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    /// Subscribe to the identity provider, restore a cached session and run
    /// the event loop until the returned task is aborted
    ///
    /// A restored session is published at once and re-validated against the
    /// backend in the background.
    pub fn start(&self) -> Result<JoinHandle<()>> {
        let Some(commands) = lock(&self.inner.commands_rx).take() else {
            bail!("failed to start session controller: already started");
        };

        let notifications = self.inner.provider.subscribe();
        self.inner.restore();

        let inner = Arc::clone(&self.inner);
        Ok(tokio::spawn(inner.run(notifications, commands)))
    }

    /// Sign out at the backend and the provider, then clear the session
    pub async fn logout(&self) {
        self.inner.logout().await
    }

    /// Re-run role resolution for the current token
    pub async fn revalidate(&self) -> Result<Role, SessionError> {
        self.inner.revalidate().await
    }
}

impl<P, B, S> Inner<P, B, S>
where
    P: IdentityProvider + Send + Sync + 'static,
    B: BackendApi + Send + Sync + 'static,
    S: SessionStore + 'static,
{
    fn restore(self: &Arc<Self>) {
        let signed_in = self.provider.principal();
        *lock(&self.principal) = signed_in.clone();

        match (self.store.load(), signed_in) {
            (Some(CachedSession { token, role }), _) => {
                info!("restored cached {role} session");
                self.publish(SessionState {
                    session: Session::authenticated(token, role),
                    phase: Phase::Authenticated,
                    loading: false,
                });
                self.spawn_revalidation();
            }
            (None, Some(principal)) => {
                debug!("no cached session, {} already signed in", principal.email);
                self.set_phase(Phase::WaitingForProvider);
                self.accept_notification();
                let inner = Arc::clone(self);
                tokio::spawn(async move { inner.handle_principal(Some(principal)).await });
            }
            (None, None) => {
                debug!("no cached session and nobody signed in");
                self.publish(SessionState {
                    session: Session::default(),
                    phase: Phase::Unauthenticated,
                    loading: false,
                });
            }
        }
    }

    async fn run(
        self: Arc<Self>,
        mut notifications: broadcast::Receiver<Option<Principal>>,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    ) {
        let mut provider_open = true;

        loop {
            tokio::select! {
                notification = notifications.recv(), if provider_open => match notification {
                    Ok(principal) => {
                        if self.accept_notification() {
                            let inner = Arc::clone(&self);
                            tokio::spawn(async move { inner.handle_principal(principal).await });
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("missed {skipped} identity provider notifications");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("identity provider closed its subscription");
                        provider_open = false;
                    }
                },
                Some(command) = commands.recv() => {
                    debug!("session command: {command:?}");
                    match command {
                        SessionCommand::Logout => {
                            let inner = Arc::clone(&self);
                            tokio::spawn(async move { inner.logout().await });
                        }
                        SessionCommand::Invalidate => self.spawn_revalidation(),
                    }
                },
                else => break,
            }
        }

        debug!("session controller stopped");
    }

    /// Debounce: drop notifications arriving too soon after the last processed one
    fn accept_notification(&self) -> bool {
        let now = Instant::now();
        let mut last = lock(&self.last_notification);

        if let Some(previous) = *last {
            let elapsed = now.duration_since(previous);
            if elapsed < self.config.debounce_window {
                debug!("ignoring identity provider notification after {elapsed:?}");
                return false;
            }
        }

        *last = Some(now);
        true
    }

    async fn handle_principal(&self, principal: Option<Principal>) {
        let Some(principal) = principal else {
            info!("identity provider reports signed out");
            self.epoch.fetch_add(1, Ordering::AcqRel);
            *lock(&self.principal) = None;
            self.clear(None);
            return;
        };

        debug!("identity provider reports {} signed in", principal.email);
        *lock(&self.principal) = Some(principal.clone());

        let validated = lock(&self.validated_for).as_deref() == Some(principal.id.as_str());
        if validated && self.state.borrow().session.authenticated {
            debug!("session already validated for {}", principal.email);
            return;
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let result = self.authenticate(&principal).await;
        self.finish(result, Some(principal.id), epoch);
    }

    async fn authenticate(&self, principal: &Principal) -> Result<(String, Role), SessionError> {
        self.set_phase(Phase::Acquiring);
        let token = self.acquire_token(principal, false).await?;
        self.resolve_role(Some(principal), token).await
    }

    async fn acquire_token(
        &self,
        principal: &Principal,
        force_refresh: bool,
    ) -> Result<String, SessionError> {
        let acquisition = self.provider.get_token(principal, force_refresh);

        match timeout(self.config.token_timeout, acquisition).await {
            Ok(Ok(token)) if token.is_empty() => {
                Err(SessionError::Provider("empty token issued".to_string()))
            }
            Ok(Ok(token)) => Ok(token),
            Ok(Err(e)) => Err(SessionError::Provider(format!("{e:#}"))),
            Err(_) => {
                warn!(
                    "token acquisition exceeded {:?}, abandoning it",
                    self.config.token_timeout
                );
                Err(SessionError::ProviderTimeout)
            }
        }
    }

    /// Resolve the role for `token`, refreshing it once if the backend rejects it
    async fn resolve_role(
        &self,
        principal: Option<&Principal>,
        mut token: String,
    ) -> Result<(String, Role), SessionError> {
        let mut refreshes_left = MAX_REFRESH_RETRIES;

        loop {
            self.set_phase(Phase::ResolvingRole);

            match self.backend.me(&token).await {
                Ok(profile) => {
                    let role = profile
                        .role
                        .parse::<Role>()
                        .map_err(SessionError::UnrecognizedRole)?;
                    return Ok((token, role));
                }
                Err(ApiError::Unauthorized) if refreshes_left > 0 => {
                    refreshes_left -= 1;

                    let Some(principal) = principal else {
                        warn!("token rejected and no signed-in principal to refresh it for");
                        return Err(SessionError::Unauthorized);
                    };

                    warn!("token rejected, forcing a refresh");
                    self.set_phase(Phase::Acquiring);
                    token = self.acquire_token(principal, true).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Start a background revalidation unless one is already running
    fn spawn_revalidation(self: &Arc<Self>) {
        if self.revalidating.swap(true, Ordering::AcqRel) {
            debug!("revalidation already running");
            return;
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = inner.revalidate().await {
                debug!("session not revalidated: {e}");
            }
            inner.revalidating.store(false, Ordering::Release);
        });
    }

    async fn revalidate(&self) -> Result<Role, SessionError> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let token = self.state.borrow().session.token.clone();
        let principal = lock(&self.principal).clone();

        let result = match (token.is_empty(), &principal) {
            (false, _) => self.resolve_role(principal.as_ref(), token.clone()).await,
            (true, Some(principal)) => self.authenticate(principal).await,
            (true, None) => {
                debug!("nothing to revalidate: no token and nobody signed in");
                return Err(SessionError::Unauthorized);
            }
        };

        // a new token can only have come from the signed-in principal
        let validated_for = match (&result, &principal) {
            (Ok((new_token, _)), Some(principal)) if *new_token != token => {
                Some(principal.id.clone())
            }
            _ => lock(&self.validated_for).clone(),
        };

        let role = result
            .as_ref()
            .map(|(_, role)| *role)
            .map_err(SessionError::clone);
        self.finish(result, validated_for, epoch);
        role
    }

    /// Publish the outcome of an authentication started at `epoch`
    fn finish(
        &self,
        result: Result<(String, Role), SessionError>,
        validated_for: Option<String>,
        epoch: u64,
    ) {
        if self.epoch.load(Ordering::Acquire) != epoch {
            debug!("discarding authentication outcome: signed out meanwhile");
            return;
        }

        match result {
            Ok((token, role)) => {
                let cached = CachedSession {
                    token: token.clone(),
                    role,
                };
                if let Err(e) = self.store.save(&cached) {
                    warn!("failed to cache session: {e:#}");
                }

                info!("session authenticated with role {role}");
                *lock(&self.validated_for) = validated_for;
                self.publish(SessionState {
                    session: Session::authenticated(token, role),
                    phase: Phase::Authenticated,
                    loading: false,
                });
            }
            Err(e) => {
                error!("authentication failed: {e}");
                self.clear(Some(e.user_message()));
            }
        }
    }

    async fn logout(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let token = self.state.borrow().session.token.clone();
        self.set_phase(Phase::SigningOut);

        if !token.is_empty() {
            if let Err(e) = self.backend.logout(&token).await {
                warn!("backend logout failed: {e}");
            }
        }

        if let Err(e) = self.provider.sign_out().await {
            warn!("identity provider sign-out failed: {e:#}");
        }

        *lock(&self.principal) = None;
        self.clear(None);
        info!("signed out");
    }

    fn clear(&self, error: Option<String>) {
        *lock(&self.validated_for) = None;
        if let Err(e) = self.store.clear() {
            warn!("failed to clear session cache: {e:#}");
        }

        self.publish(SessionState {
            session: Session::signed_out(error),
            phase: Phase::Unauthenticated,
            loading: false,
        });
    }

    fn set_phase(&self, phase: Phase) {
        self.state.send_modify(|state| state.phase = phase);
    }

    fn publish(&self, state: SessionState) {
        self.state.send_replace(state);
    }
}
