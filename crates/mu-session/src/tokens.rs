//! Token storage with scope selection
//!
//! `persist = true` keeps the session in the persistent store, `persist =
//! false` in the session store. Every write clears the other scope first, so a
//! key is never populated in both at once.

use std::sync::Arc;

use mu_core::{KeyValueStore, MemoryStore, StorageScope, UnmixResult, User};

pub const ACCESS_KEY: &str = "access";
pub const REFRESH_KEY: &str = "refresh";
pub const PERSIST_KEY: &str = "persist";
pub const USER_KEY: &str = "user";

const SESSION_KEYS: [&str; 3] = [ACCESS_KEY, REFRESH_KEY, USER_KEY];

/// Both storage scopes plus the policy that chooses between them
#[derive(Clone)]
pub struct TokenStore {
    session: Arc<dyn KeyValueStore>,
    persistent: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(session: Arc<dyn KeyValueStore>, persistent: Arc<dyn KeyValueStore>) -> Self {
        Self { session, persistent }
    }

    /// Two fresh in-memory scopes
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    pub fn scope(&self, scope: StorageScope) -> &dyn KeyValueStore {
        match scope {
            StorageScope::Session => self.session.as_ref(),
            StorageScope::Persistent => self.persistent.as_ref(),
        }
    }

    pub fn persistent_store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.persistent)
    }

    pub fn scope_for(persist: bool) -> StorageScope {
        if persist {
            StorageScope::Persistent
        } else {
            StorageScope::Session
        }
    }

    /// Scope chosen at login, recorded by the `persist` flag
    pub fn active_scope(&self) -> StorageScope {
        Self::scope_for(self.persistent.get(PERSIST_KEY).as_deref() == Some("1"))
    }

    /// Store a fresh login, wiping whatever either scope held before.
    pub fn store_login(&self, access: &str, refresh: Option<&str>, persist: bool) -> UnmixResult<()> {
        for key in SESSION_KEYS {
            self.session.remove(key)?;
            self.persistent.remove(key)?;
        }
        self.persistent.set(PERSIST_KEY, if persist { "1" } else { "0" })?;

        let target = self.scope(Self::scope_for(persist));
        target.set(ACCESS_KEY, access)?;
        if let Some(refresh) = refresh {
            target.set(REFRESH_KEY, refresh)?;
        }
        Ok(())
    }

    /// Session scope first: it may hold the most recently refreshed value.
    pub fn access_token(&self) -> Option<String> {
        self.read(ACCESS_KEY)
    }

    /// Only present when the backend hands the refresh token out in the body
    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_KEY)
    }

    pub fn replace_access(&self, access: &str) -> UnmixResult<()> {
        self.write_exclusive(ACCESS_KEY, access)
    }

    pub fn replace_refresh(&self, refresh: &str) -> UnmixResult<()> {
        self.write_exclusive(REFRESH_KEY, refresh)
    }

    /// Cached profile snapshot, if any and if it still parses
    pub fn user(&self) -> Option<User> {
        let raw = self.read(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                log::warn!("[Session] Ignoring unreadable cached user: {}", e);
                None
            }
        }
    }

    pub fn store_user(&self, user: &User) -> UnmixResult<()> {
        let json = serde_json::to_string(user)?;
        self.write_exclusive(USER_KEY, &json)
    }

    /// Remove every session key from both scopes
    pub fn clear(&self) -> UnmixResult<()> {
        self.persistent.remove(PERSIST_KEY)?;
        for key in SESSION_KEYS {
            self.session.remove(key)?;
            self.persistent.remove(key)?;
        }
        Ok(())
    }

    /// Which scope holds the access token right now
    pub fn scope_holding_access(&self) -> Option<StorageScope> {
        match (
            self.session.get(ACCESS_KEY).is_some(),
            self.persistent.get(ACCESS_KEY).is_some(),
        ) {
            (true, false) => Some(StorageScope::Session),
            (false, true) => Some(StorageScope::Persistent),
            (false, false) => None,
            (true, true) => {
                log::error!("[Session] Access token present in both scopes");
                None
            }
        }
    }

    pub fn reload(&self) -> UnmixResult<()> {
        self.session.reload()?;
        self.persistent.reload()
    }

    fn read(&self, key: &str) -> Option<String> {
        self.session.get(key).or_else(|| self.persistent.get(key))
    }

    fn write_exclusive(&self, key: &str, value: &str) -> UnmixResult<()> {
        let scope = self.active_scope();
        self.scope(scope.other()).remove(key)?;
        self.scope(scope).set(key, value)
    }
}
