use crate::error::Result;
use crate::model::{GeneralSettings, ScrapeResult};
use rollcall_scanner::{ApiConfig, PersonIdentifier};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const KEY_PROFILE_DATA: &str = "profileData";
pub const KEY_CURRENT_INDEX: &str = "currentIndex";
pub const KEY_RESULTS: &str = "results";
pub const KEY_SETTINGS: &str = "settings";
pub const KEY_API_CONFIG: &str = "apiConfig";
pub const KEY_LAST_SAVED: &str = "lastSaved";

/// Everything a previous session left behind. Any key may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub profile_data: Option<Vec<PersonIdentifier>>,
    pub current_index: Option<usize>,
    pub results: Option<Vec<ScrapeResult>>,
    pub settings: Option<GeneralSettings>,
    pub api_config: Option<ApiConfig>,
    pub last_saved: Option<i64>,
}

/// A snapshot of run progress to be written in one go.
#[derive(Debug, Clone, Copy)]
pub struct RunSnapshot<'a> {
    pub profile_data: &'a [PersonIdentifier],
    pub current_index: usize,
    pub results: &'a [ScrapeResult],
    pub api_config: &'a ApiConfig,
    pub saved_at: i64,
}

/// Durable key-value storage for scraper state.
pub trait StateStore: Send {
    fn load(&self) -> Result<PersistedState>;
    fn save_run(&mut self, snapshot: RunSnapshot<'_>) -> Result<()>;
    fn save_api_config(&mut self, config: &ApiConfig) -> Result<()>;
    fn save_settings(&mut self, settings: &GeneralSettings) -> Result<()>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn drop(path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let store = SqliteStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let store = SqliteStore {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS scrape_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM scrape_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize + ?Sized>(conn: &Connection, key: &str, value: &T, now: i64) -> Result<()> {
        let text = serde_json::to_string(value)?;
        conn.execute(
            "INSERT INTO scrape_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, text, now],
        )?;
        Ok(())
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl StateStore for SqliteStore {
    fn load(&self) -> Result<PersistedState> {
        Ok(PersistedState {
            profile_data: self.get(KEY_PROFILE_DATA)?,
            current_index: self.get(KEY_CURRENT_INDEX)?,
            results: self.get(KEY_RESULTS)?,
            settings: self.get(KEY_SETTINGS)?,
            api_config: self.get(KEY_API_CONFIG)?,
            last_saved: self.get(KEY_LAST_SAVED)?,
        })
    }

    fn save_run(&mut self, snapshot: RunSnapshot<'_>) -> Result<()> {
        let now = now_ms();
        let tx = self.conn.transaction()?;
        Self::put(&tx, KEY_PROFILE_DATA, snapshot.profile_data, now)?;
        Self::put(&tx, KEY_CURRENT_INDEX, &snapshot.current_index, now)?;
        Self::put(&tx, KEY_RESULTS, snapshot.results, now)?;
        Self::put(&tx, KEY_API_CONFIG, snapshot.api_config, now)?;
        Self::put(&tx, KEY_LAST_SAVED, &snapshot.saved_at, now)?;
        tx.commit()?;
        Ok(())
    }

    fn save_api_config(&mut self, config: &ApiConfig) -> Result<()> {
        Self::put(&self.conn, KEY_API_CONFIG, config, now_ms())
    }

    fn save_settings(&mut self, settings: &GeneralSettings) -> Result<()> {
        Self::put(&self.conn, KEY_SETTINGS, settings, now_ms())
    }
}

/// In-process store. Clones share the same contents, so a test can keep one
/// handle and hand the other to a scraper.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<PersistedState>>,
    run_saves: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            run_saves: Arc::default(),
        }
    }

    /// Number of `save_run` calls so far.
    pub fn run_saves(&self) -> usize {
        self.run_saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> PersistedState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PersistedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<PersistedState> {
        Ok(self.snapshot())
    }

    fn save_run(&mut self, snapshot: RunSnapshot<'_>) -> Result<()> {
        let mut state = self.lock();
        state.profile_data = Some(snapshot.profile_data.to_vec());
        state.current_index = Some(snapshot.current_index);
        state.results = Some(snapshot.results.to_vec());
        state.api_config = Some(snapshot.api_config.clone());
        state.last_saved = Some(snapshot.saved_at);
        self.run_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn save_api_config(&mut self, config: &ApiConfig) -> Result<()> {
        self.lock().api_config = Some(config.clone());
        Ok(())
    }

    fn save_settings(&mut self, settings: &GeneralSettings) -> Result<()> {
        self.lock().settings = Some(*settings);
        Ok(())
    }
}
