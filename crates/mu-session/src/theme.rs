//! Per-user theme preference cache

use std::sync::Arc;

use mu_core::{KeyValueStore, Theme, UnmixResult};

pub const THEME_KEY_PREFIX: &str = "melody_unmix_theme_";
/// Written by older builds before the cache was keyed per user
pub const LEGACY_THEME_KEY: &str = "melody_unmix_theme";

/// Theme cache in the persistent store
#[derive(Clone)]
pub struct ThemeCache {
    store: Arc<dyn KeyValueStore>,
}

impl ThemeCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn key_for(username: &str) -> Option<String> {
        let username = username.trim();
        if username.is_empty() {
            None
        } else {
            Some(format!("{THEME_KEY_PREFIX}{username}"))
        }
    }

    pub fn cached(&self, username: &str) -> Option<Theme> {
        let key = Self::key_for(username)?;
        self.store.get(&key)?.parse().ok()
    }

    pub fn save(&self, username: &str, theme: Theme) -> UnmixResult<()> {
        match Self::key_for(username) {
            Some(key) => self.store.set(&key, theme.as_str()),
            None => Ok(()),
        }
    }

    /// Remove every per-user entry plus the legacy key. Returns how many went.
    pub fn clear_all(&self) -> UnmixResult<usize> {
        let mut removed = 0;
        for key in self.store.keys() {
            if key.starts_with(THEME_KEY_PREFIX) || key == LEGACY_THEME_KEY {
                self.store.remove(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Resolve what should actually be shown.
///
/// Signed-out sessions are always dark. `System` follows the host preference.
pub fn effective_theme(authenticated: bool, chosen: Option<Theme>, prefers_light: bool) -> Theme {
    if !authenticated {
        return Theme::Dark;
    }
    match chosen.unwrap_or(Theme::System) {
        Theme::System if prefers_light => Theme::Light,
        Theme::System => Theme::Dark,
        explicit => explicit,
    }
}
