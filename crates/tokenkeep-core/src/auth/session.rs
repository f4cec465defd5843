use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{AuthApi, AuthClient};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::{BroadcastEvent, BroadcastKind, LoginResponse, TokenKind, User};
use crate::storage::{ContextId, CookieJar, SharedStorage};

use super::broadcast::Broadcaster;
use super::scheduler::RefreshScheduler;
use super::store::{TieredTokenStore, TokenStore};

/// Capacity of the session event channel.
const SESSION_EVENT_CAPACITY: usize = 32;

/// Lifecycle notifications for UI collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    LoggedOut,
    /// The session is unrecoverable; show the login surface at `path`.
    LoginRequired { path: String },
}

struct Inner {
    config: AuthConfig,
    api: AuthApi,
    store: Arc<dyn TokenStore>,
    scheduler: RefreshScheduler,
    broadcaster: Broadcaster,
    context: ContextId,
    events: broadcast::Sender<SessionEvent>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }
}

/// Public entry point of the session subsystem: one per execution context.
///
/// Combines the token store, the refresh scheduler and the cross-context
/// broadcaster. Clone is cheap and clones share one session. Must be
/// created inside a tokio runtime.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<Inner>,
}

impl AuthSession {
    /// Open a session backed by the state directory from `config`.
    pub fn open(config: AuthConfig) -> Result<Self> {
        let state_dir = config.state_dir()?;
        let cookies = CookieJar::open(&state_dir)?;
        let storage = SharedStorage::open(&state_dir)?;
        debug!(state_dir = %state_dir.display(), "Session state opened");
        Self::open_context(config, cookies, storage)
    }

    /// Open a new execution context on existing backing tiers.
    pub fn open_context(
        config: AuthConfig,
        cookies: CookieJar,
        storage: SharedStorage,
    ) -> Result<Self> {
        let context = ContextId::random();
        let store = Arc::new(TieredTokenStore::new(
            cookies,
            storage.clone(),
            context,
            config.remember_days,
        ));
        Self::new(config, store, storage, context)
    }

    /// Assemble a session from explicit parts, e.g. a test double store.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn TokenStore>,
        storage: SharedStorage,
        context: ContextId,
    ) -> Result<Self> {
        let api = AuthApi::new(&config)?;
        let broadcaster = Broadcaster::new(storage, context, config.broadcast_retract_delay());
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);

        let session = Self {
            inner: Arc::new(Inner {
                config,
                api,
                store,
                scheduler: RefreshScheduler::new(),
                broadcaster,
                context,
                events,
                listener: Mutex::new(None),
            }),
        };

        session.start_listening();
        if session.inner.store.pair().is_some() {
            debug!(context = %context, "Restored stored session");
            session.arm_refresh();
        }
        Ok(session)
    }

    /// Exchange credentials for a token pair and start the session.
    ///
    /// With `remember` the pair survives a restart; otherwise it lives as long
    /// as the process. A rejected exchange leaves the current session as is.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        remember: bool,
    ) -> Result<LoginResponse, AuthError> {
        let pair = self
            .inner
            .api
            .obtain_pair(username, password)
            .await
            .map_err(|e| {
                warn!(error = %e, "Login failed");
                AuthError::from_login_failure(e)
            })?;

        self.inner.store.set_pair(&pair, remember);
        self.arm_refresh();
        self.inner
            .broadcaster
            .publish(&BroadcastEvent::login(pair.clone(), remember));
        self.emit(SessionEvent::LoggedIn);
        info!(username, remember, "Login successful");

        let user = self.current_user(Some(&pair.access)).await;
        Ok(LoginResponse {
            access: pair.access,
            refresh: pair.refresh,
            user,
        })
    }

    /// Renew the access token with the stored refresh token.
    ///
    /// A rejected renewal (or a network failure) ends the session. A result
    /// arriving after the session was cleared or replaced is discarded.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let Some(refresh_token) = self.inner.store.get(TokenKind::Refresh) else {
            debug!("No refresh token, skipping renewal");
            return Err(AuthError::NoRefreshToken);
        };

        let outcome = self.inner.api.refresh_access(&refresh_token).await;

        let current = self.inner.store.get(TokenKind::Refresh);
        if current.as_deref() != Some(refresh_token.as_str()) {
            debug!("Session changed while renewing, discarding result");
            return match current {
                Some(_) => self
                    .inner
                    .store
                    .get(TokenKind::Access)
                    .ok_or(AuthError::NoRefreshToken),
                None => Err(AuthError::NoRefreshToken),
            };
        }

        match outcome {
            Ok(access) => {
                self.inner.store.set_access(&access);
                self.arm_refresh();
                self.emit(SessionEvent::Refreshed);
                info!("Access token renewed");
                Ok(access)
            }
            Err(e) => {
                let err = AuthError::from_refresh_failure(e);
                warn!(error = %err, "Token renewal failed, logging out");
                self.logout();
                Err(err)
            }
        }
    }

    /// End the session everywhere and ask the UI for the login surface.
    ///
    /// With no active session only the redirect is issued.
    pub fn logout(&self) {
        let active = TokenKind::ALL
            .iter()
            .any(|kind| self.inner.store.get(*kind).is_some());

        if active {
            self.inner.store.clear();
            self.inner.scheduler.disarm();
            self.inner.broadcaster.publish(&BroadcastEvent::logout());
            self.emit(SessionEvent::LoggedOut);
            info!("Logged out");
        } else {
            self.inner.scheduler.disarm();
        }

        self.emit(SessionEvent::LoginRequired {
            path: self.inner.config.login_path.clone(),
        });
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.store.get(TokenKind::Access).is_some()
    }

    /// Fetch the profile for `token`, or for the stored access token.
    ///
    /// Returns `None` when there is no token or the fetch fails.
    pub async fn current_user(&self, token: Option<&str>) -> Option<User> {
        let token = match token {
            Some(token) => token.to_string(),
            None => self.inner.store.get(TokenKind::Access)?,
        };

        match self.inner.api.fetch_user(&token).await {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Failed to fetch current user");
                None
            }
        }
    }

    /// Wrap `http` so every call carries the session's bearer token.
    pub fn install(&self, http: reqwest::Client) -> AuthClient {
        AuthClient::new(http, &self.inner.config.api_url, self.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.store
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.inner.scheduler
    }

    pub fn context(&self) -> ContextId {
        self.inner.context
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.inner.events.send(event);
    }

    fn arm_refresh(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .scheduler
            .arm(self.inner.config.refresh_delay(), move || async move {
                let Some(session) = Self::upgrade(&weak) else {
                    return;
                };
                // Failures already ended the session
                if let Err(e) = session.refresh().await {
                    debug!(error = %e, "Scheduled renewal failed");
                }
            });
    }

    fn start_listening(&self) {
        let weak = Arc::downgrade(&self.inner);
        let handle = self.inner.broadcaster.listen(move |event| {
            let Some(session) = Self::upgrade(&weak) else {
                return ControlFlow::Break(());
            };
            session.apply_remote(event);
            ControlFlow::Continue(())
        });
        *self.inner.listener.lock() = Some(handle);
    }

    /// Converge on a login/logout made by another context, without network I/O.
    fn apply_remote(&self, event: BroadcastEvent) {
        match event.kind {
            BroadcastKind::Login => {
                let Some(tokens) = event.tokens else {
                    warn!("Login sync event without tokens, ignoring");
                    return;
                };
                self.inner.store.set_pair(&tokens, event.remember);
                self.arm_refresh();
                self.emit(SessionEvent::LoggedIn);
                debug!(context = %self.inner.context, "Adopted login from another context");
            }
            BroadcastKind::Logout => {
                self.inner.store.clear();
                self.inner.scheduler.disarm();
                self.emit(SessionEvent::LoggedOut);
                debug!(context = %self.inner.context, "Adopted logout from another context");
            }
        }
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}
