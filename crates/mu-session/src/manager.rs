//! Session Manager: owns tokens, the cached user and the refresh slot

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mu_core::{
    ApiRequest, Credentials, Theme, Transport, UnmixError, UnmixResult, User, endpoints,
};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::events::{SessionEvent, SessionEvents};
use crate::refresh::RefreshCoordinator;
use crate::theme::{ThemeCache, effective_theme};
use crate::tokens::TokenStore;

/// Result of a successful login
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub persist: bool,
    pub user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

pub(crate) struct SessionInner {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) tokens: TokenStore,
    pub(crate) themes: ThemeCache,
    pub(crate) refresh: Mutex<RefreshCoordinator>,
    pub(crate) events: SessionEvents,
    /// Last authentication state this instance observed
    pub(crate) authenticated: AtomicBool,
}

/// Cheap to clone; every clone shares tokens, refresh slot and event bus.
#[derive(Clone)]
pub struct SessionManager {
    pub(crate) inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>, tokens: TokenStore) -> Self {
        let themes = ThemeCache::new(tokens.persistent_store());
        let authenticated = tokens.access_token().is_some();

        Self {
            inner: Arc::new(SessionInner {
                transport,
                tokens,
                themes,
                refresh: Mutex::new(RefreshCoordinator::new()),
                events: SessionEvents::new(),
                authenticated: AtomicBool::new(authenticated),
            }),
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    pub fn themes(&self) -> &ThemeCache {
        &self.inner.themes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.tokens.access_token().is_some()
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.inner.refresh.lock().is_in_flight()
    }

    /// Callers currently suspended on the refresh slot
    pub fn refresh_waiters(&self) -> usize {
        self.inner.refresh.lock().waiter_count()
    }

    /// Refresh cycles started by this manager
    pub fn refresh_cycles(&self) -> u64 {
        self.inner.refresh.lock().cycles()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LOGIN / LOGOUT
    // ═══════════════════════════════════════════════════════════════════════

    /// Exchange credentials for tokens and start a session.
    pub async fn login(&self, credentials: &Credentials, persist: bool) -> UnmixResult<Session> {
        let request = ApiRequest::post(endpoints::LOGIN).json(serde_json::to_value(credentials)?);
        let response = self.inner.transport.send(&request).await?;

        if !response.is_success() {
            let detail = response.error_detail();
            log::warn!("[Session] Login rejected ({})", response.status);
            return Err(match response.status {
                408 | 425 | 429 | 500..=599 => {
                    UnmixError::from_status(response.status, detail.general, detail.field_errors)
                }
                _ => UnmixError::Auth(detail.general),
            });
        }

        let body: LoginResponse = response.json()?;
        self.inner
            .tokens
            .store_login(&body.access, body.refresh.as_deref(), persist)?;
        self.inner.authenticated.store(true, Ordering::SeqCst);

        let user = match body.user {
            Some(user) => Some(user),
            None => match self.request_profile().await {
                Ok(user) => Some(user),
                Err(e) => {
                    log::warn!("[Session] Signed in but profile fetch failed: {}", e);
                    None
                }
            },
        };
        if let Some(user) = &user {
            self.cache_user(user)?;
        }

        log::info!(
            "[Session] Signed in{}",
            if persist { " (remembered)" } else { "" }
        );
        self.inner
            .events
            .emit(SessionEvent::LoggedIn { user: user.clone() });

        Ok(Session {
            access_token: body.access,
            refresh_token: body.refresh,
            persist,
            user,
        })
    }

    /// Tell the server, then drop everything locally. Never fails.
    pub async fn logout(&self) {
        let mut request = ApiRequest::post(endpoints::LOGOUT);
        self.attach_credential(&mut request);
        match self.inner.transport.send(&request).await {
            Ok(response) if !response.is_success() => {
                log::debug!("[Session] Server logout answered {}", response.status);
            }
            Ok(_) => {}
            Err(e) => log::debug!("[Session] Server logout failed: {}", e),
        }
        self.end_session();
    }

    /// Local half of logout: clear tokens, user and themes, then broadcast.
    pub fn end_session(&self) {
        if let Err(e) = self.inner.tokens.clear() {
            log::error!("[Session] Failed to clear tokens: {}", e);
        }
        if let Err(e) = self.inner.themes.clear_all() {
            log::warn!("[Session] Failed to clear theme cache: {}", e);
        }
        if self.inner.authenticated.swap(false, Ordering::SeqCst) {
            log::info!("[Session] Signed out");
        }
        self.inner.events.emit(SessionEvent::LoggedOut);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // USER
    // ═══════════════════════════════════════════════════════════════════════

    pub fn current_user(&self) -> Option<User> {
        self.inner.tokens.user()
    }

    /// Fetch the profile from the server and refresh the cache.
    pub async fn fetch_current_user(&self) -> UnmixResult<User> {
        let user = self.request_profile().await?;
        self.update_cached_user(user.clone())?;
        Ok(user)
    }

    pub fn update_cached_user(&self, user: User) -> UnmixResult<()> {
        self.cache_user(&user)?;
        self.inner.events.emit(SessionEvent::UserUpdated(user));
        Ok(())
    }

    /// Theme to show right now
    pub fn theme(&self, prefers_light: bool) -> Theme {
        let chosen = self.current_user().and_then(|user| {
            user.theme()
                .or_else(|| self.inner.themes.cached(&user.username))
        });
        effective_theme(self.is_authenticated(), chosen, prefers_light)
    }

    async fn request_profile(&self) -> UnmixResult<User> {
        if !self.is_authenticated() {
            return Err(UnmixError::Auth("not signed in".into()));
        }
        let response = self.execute(ApiRequest::get(endpoints::ME)).await?;
        response.into_result()?.json()
    }

    fn cache_user(&self, user: &User) -> UnmixResult<()> {
        self.inner.tokens.store_user(user)?;
        if let Some(theme) = user.theme() {
            self.inner.themes.save(&user.username, theme)?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CROSS-PROCESS SYNC
    // ═══════════════════════════════════════════════════════════════════════

    /// Pick up a login or logout performed by another process sharing the
    /// same stores. Returns the event broadcast, if any.
    pub fn sync_from_storage(&self) -> UnmixResult<Option<SessionEvent>> {
        self.inner.tokens.reload()?;
        let now = self.inner.tokens.access_token().is_some();
        let before = self.inner.authenticated.swap(now, Ordering::SeqCst);

        let event = match (before, now) {
            (true, false) => {
                log::info!("[Session] Signed out elsewhere");
                Some(SessionEvent::LoggedOut)
            }
            (false, true) => {
                log::info!("[Session] Signed in elsewhere");
                Some(SessionEvent::LoggedIn {
                    user: self.inner.tokens.user(),
                })
            }
            _ => None,
        };

        if let Some(event) = &event {
            self.inner.events.emit(event.clone());
        }
        Ok(event)
    }
}
