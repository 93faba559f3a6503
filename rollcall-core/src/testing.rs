// Scripted collaborators for driving the scraper in tests

use crate::clock::Clock;
use crate::config::{IGB_LIVE_DOMAIN, preset};
use crate::data::{MemoryStore, PersistedState, RunSnapshot, StateStore};
use crate::error::CoreError;
use crate::model::GeneralSettings;
use crate::scrape::{ScrapeControl, Scraper};
use async_trait::async_trait;
use rollcall_scanner::{ApiConfig, ApiRequest, PersonIdentifier, ScanError, Transport};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Answers from a queue, then with a generic person payload once the queue
/// runs dry.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Value, ScanError>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<Value, ScanError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            gate: None,
        })
    }

    /// Every call waits for one `notify_one` on the returned gate.
    pub fn gated() -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            gate: Some(Arc::clone(&gate)),
        });
        (transport, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, _request: &ApiRequest) -> rollcall_scanner::error::Result<Value> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(person_payload(&format!("P{}", n))))
    }
}

enum SleepHook {
    Pause(ScrapeControl),
    Stop(ScrapeControl),
}

/// Returns from every sleep immediately and records the requested duration.
pub struct FakeClock {
    sleeps: Mutex<Vec<Duration>>,
    hook: Mutex<Option<SleepHook>>,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sleeps: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
        })
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn pause_on_next_sleep(&self, control: ScrapeControl) {
        *self.hook.lock().unwrap() = Some(SleepHook::Pause(control));
    }

    pub fn stop_on_next_sleep(&self, control: ScrapeControl) {
        *self.hook.lock().unwrap() = Some(SleepHook::Stop(control));
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now_ms(&self) -> i64 {
        1_700_000_000_000
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        let hook = self.hook.lock().unwrap().take();
        match hook {
            Some(SleepHook::Pause(control)) => control.request_pause(),
            Some(SleepHook::Stop(control)) => control.request_stop(),
            None => {}
        }
        tokio::task::yield_now().await;
    }
}

/// Loads a fixed state and refuses every write.
pub struct ReadOnlyStore {
    state: PersistedState,
}

impl ReadOnlyStore {
    pub fn new(state: PersistedState) -> Self {
        Self { state }
    }
}

fn read_only() -> CoreError {
    CoreError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "store is read-only"))
}

impl StateStore for ReadOnlyStore {
    fn load(&self) -> crate::error::Result<PersistedState> {
        Ok(self.state.clone())
    }

    fn save_run(&mut self, _snapshot: RunSnapshot<'_>) -> crate::error::Result<()> {
        Err(read_only())
    }

    fn save_api_config(&mut self, _config: &ApiConfig) -> crate::error::Result<()> {
        Err(read_only())
    }

    fn save_settings(&mut self, _settings: &GeneralSettings) -> crate::error::Result<()> {
        Err(read_only())
    }
}

/// GraphQL-shaped response carrying one person.
pub fn person_payload(id: &str) -> Value {
    json!({"data": {"person": {"id": id, "firstName": "Ada", "lastName": "Lovelace"}}})
}

pub fn profiles(ids: &[&str]) -> Vec<PersonIdentifier> {
    ids.iter()
        .map(|id| PersonIdentifier::from_pairs([("profileId", *id)]))
        .collect()
}

pub fn graphql_scraper(transport: Arc<ScriptedTransport>, clock: Arc<FakeClock>, store: MemoryStore) -> Scraper {
    let config = preset(IGB_LIVE_DOMAIN).unwrap_or_default();
    Scraper::new(transport, Box::new(store))
        .with_clock(clock)
        .with_api_config(config)
}
