//! Wiring: config, stores, session, API client and job tracker

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use mu_api::{ApiClient, HttpTransport};
use mu_core::{ClientConfig, FileStore};
use mu_jobs::{JobTracker, Visibility};
use mu_session::{SessionManager, TokenStore};

const SESSION_FILE: &str = "session.json";
const STORE_FILE: &str = "store.json";

pub struct App {
    pub session: SessionManager,
    pub api: ApiClient,
    pub tracker: JobTracker,
}

impl App {
    pub fn open(config_path: Option<&Path>, api_base: Option<String>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => ClientConfig::load_from_path(path)?,
            None => ClientConfig::load().context("Failed to load configuration")?,
        };
        if let Some(base) = api_base {
            config.api_base = base;
        }
        config.validate()?;
        log::debug!("[Cli] Using backend {}", config.api_base);

        let session_store = FileStore::open(config.session_dir().join(SESSION_FILE))
            .context("Failed to open the session store")?;
        let persistent_store = FileStore::open(config.persistent_dir().join(STORE_FILE))
            .context("Failed to open the persistent store")?;
        let tokens = TokenStore::new(Arc::new(session_store), Arc::new(persistent_store));

        let transport = HttpTransport::new(&config)?;
        let session = SessionManager::new(Arc::new(transport), tokens);
        session.sync_from_storage()?;

        let api = ApiClient::new(session.clone());
        let tracker = JobTracker::new(Arc::new(api.clone()), &config, Visibility::always_visible());
        let _ = tracker.attach_session(&session);

        Ok(Self {
            session,
            api,
            tracker,
        })
    }

    pub fn require_login(&self) -> Result<()> {
        if !self.session.is_authenticated() {
            bail!("Not signed in. Run `melody-unmix login <email>` first.");
        }
        Ok(())
    }
}

/// Read one line from stdin after printing `label` to stderr.
pub fn prompt(label: &str) -> Result<String> {
    eprint!("{label}: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub fn value_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => prompt(label),
    }
}
