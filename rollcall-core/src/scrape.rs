use crate::clock::{Clock, SystemClock};
use crate::config::{ApiConfigPatch, default_api_config};
use crate::data::{RunSnapshot, StateStore};
use crate::error::Result;
use crate::export::{ExportReceipt, Exporter};
use crate::ingest::profiles_from_value;
use crate::model::{FlattenedRecord, GeneralSettings, RunState, ScrapeResult, ScrapeSettings, StatusSnapshot};
use crate::normalize::{RecordExtractor, normalize};
use rand::Rng;
use rollcall_scanner::{
    ApiConfig, CustomHooks, PersonIdentifier, ScanError, Transport, build_request, extract_payload,
};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::Paused => "paused",
            Phase::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Default)]
struct ControlFlags {
    running: AtomicBool,
    paused: AtomicBool,
    stopped: AtomicBool,
}

/// Shared handle for steering a run from outside the loop. Requests are
/// observed at iteration boundaries only.
#[derive(Debug, Clone, Default)]
pub struct ScrapeControl {
    flags: Arc<ControlFlags>,
}

impl ScrapeControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a loop owns the run and no stop was requested.
    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst) && !self.flags.stopped.load(Ordering::SeqCst)
    }

    /// True while any loop is still executing, including one winding down.
    pub fn is_active(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> Phase {
        if self.flags.stopped.load(Ordering::SeqCst) {
            Phase::Stopped
        } else if self.is_paused() {
            Phase::Paused
        } else if self.is_active() {
            Phase::Running
        } else {
            Phase::Idle
        }
    }

    pub fn request_pause(&self) {
        self.flags.paused.store(true, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.flags.paused.store(false, Ordering::SeqCst);
        self.flags.stopped.store(true, Ordering::SeqCst);
    }

    /// Withdraw a pending pause so the active loop keeps going.
    pub fn clear_pause(&self) {
        self.flags.paused.store(false, Ordering::SeqCst);
    }

    fn begin(&self) -> bool {
        let acquired = self
            .flags
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if acquired {
            self.flags.paused.store(false, Ordering::SeqCst);
            self.flags.stopped.store(false, Ordering::SeqCst);
        }
        acquired
    }

    fn should_continue(&self) -> bool {
        self.is_running() && !self.is_paused()
    }

    fn finish(&self) {
        self.flags.running.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every loaded profile has a result.
    Completed,
    Paused,
    Stopped,
    /// Another loop already owns the run.
    AlreadyRunning,
    NoProfiles,
}

/// Per-profile request, retry and normalization. Holds only shared
/// collaborators so it can be borrowed across awaits.
struct ProfileFetcher {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    hooks: CustomHooks,
    record_extractor: Option<RecordExtractor>,
}

impl ProfileFetcher {
    async fn fetch(
        &self,
        config: &ApiConfig,
        person: &PersonIdentifier,
        settings: ScrapeSettings,
        index: usize,
    ) -> std::result::Result<FlattenedRecord, ScanError> {
        let mut attempt: u32 = 0;
        loop {
            match self.attempt(config, person).await {
                Ok(record) => return Ok(record),
                Err(err) if err.is_retryable() && attempt < settings.max_retries => {
                    attempt += 1;
                    let delay = match err {
                        ScanError::RateLimited => settings.rate_limit_delay,
                        _ => settings.retry_delay,
                    };
                    warn!(
                        index,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying profile"
                    );
                    self.clock.sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(
        &self,
        config: &ApiConfig,
        person: &PersonIdentifier,
    ) -> std::result::Result<FlattenedRecord, ScanError> {
        let request = build_request(config, person, &self.hooks)?;
        let raw = self.transport.execute(&request).await?;
        let payload = extract_payload(config.api_type, &raw, &self.hooks)?;
        normalize(&payload, config.api_type, self.record_extractor.as_ref())
    }
}

fn jittered(base: Duration, jitter_max: Duration) -> Duration {
    let max_ms = jitter_max.as_millis() as u64;
    base + Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

/// Walks the loaded profile list one request at a time, checkpointing
/// progress and broadcasting status as it goes.
pub struct Scraper {
    fetcher: ProfileFetcher,
    store: Box<dyn StateStore>,
    exporter: Option<Box<dyn Exporter>>,
    state: RunState,
    api_config: ApiConfig,
    general: GeneralSettings,
    settings: ScrapeSettings,
    control: ScrapeControl,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl Scraper {
    pub fn new(transport: Arc<dyn Transport>, store: Box<dyn StateStore>) -> Self {
        let api_config = default_api_config();
        let state = RunState::default();
        let control = ScrapeControl::new();
        let (status_tx, _) = watch::channel(snapshot_of(&state, &api_config, &control));

        Self {
            fetcher: ProfileFetcher {
                transport,
                clock: Arc::new(SystemClock),
                hooks: CustomHooks::default(),
                record_extractor: None,
            },
            store,
            exporter: None,
            state,
            api_config,
            general: GeneralSettings::default(),
            settings: ScrapeSettings::default(),
            control,
            status_tx,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.fetcher.clock = clock;
        self
    }

    pub fn with_exporter(mut self, exporter: Box<dyn Exporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_settings(mut self, settings: ScrapeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_hooks(mut self, hooks: CustomHooks) -> Self {
        self.fetcher.hooks = hooks;
        self
    }

    pub fn with_record_extractor(mut self, extractor: RecordExtractor) -> Self {
        self.fetcher.record_extractor = Some(extractor);
        self
    }

    pub fn with_api_config(mut self, config: ApiConfig) -> Self {
        self.api_config = config;
        self.broadcast();
        self
    }

    /// Pull any persisted state into memory.
    pub fn initialize(&mut self) -> Result<()> {
        self.restore()?;
        info!(
            profiles = self.state.total(),
            current_index = self.state.current_index,
            "scraper initialized"
        );
        self.broadcast();
        Ok(())
    }

    pub fn control(&self) -> ScrapeControl {
        self.control.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> StatusSnapshot {
        snapshot_of(&self.state, &self.api_config, &self.control)
    }

    pub fn api_config(&self) -> &ApiConfig {
        &self.api_config
    }

    pub fn general_settings(&self) -> GeneralSettings {
        self.general
    }

    pub fn results(&self) -> &[ScrapeResult] {
        &self.state.results
    }

    pub fn run_state(&self) -> &RunState {
        &self.state
    }

    /// Replace the profile list and reset progress.
    pub fn load_profiles(&mut self, profiles: Vec<PersonIdentifier>) -> Result<usize> {
        let count = profiles.len();
        self.state = RunState::new(profiles);
        self.persist()?;
        info!(count, "profiles loaded");
        self.broadcast();
        Ok(count)
    }

    pub fn load_profiles_value(&mut self, data: Value) -> Result<usize> {
        let profiles = profiles_from_value(data)?;
        self.load_profiles(profiles)
    }

    pub fn update_api_config(&mut self, patch: &ApiConfigPatch) -> Result<&ApiConfig> {
        let merged = patch.apply_to(&self.api_config);
        self.store.save_api_config(&merged)?;
        self.api_config = merged;
        info!(
            api_type = self.api_config.api_type.as_str(),
            target_domain = %self.api_config.target_domain,
            "api config updated"
        );
        self.broadcast();
        Ok(&self.api_config)
    }

    pub fn update_settings(&mut self, settings: GeneralSettings) -> Result<()> {
        self.store.save_settings(&settings)?;
        self.general = settings;
        self.settings.apply(&settings);
        debug!(delay_ms = settings.delay_ms(), "settings updated");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.control.request_pause();
        if !self.control.is_active() {
            self.persist()?;
        }
        self.broadcast();
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.control.request_stop();
        if !self.control.is_active() {
            self.persist()?;
        }
        self.broadcast();
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<RunOutcome> {
        if self.control.is_active() {
            self.control.clear_pause();
            self.broadcast();
            return Ok(RunOutcome::AlreadyRunning);
        }
        self.start().await
    }

    /// Run the loop from the persisted position until the list is exhausted
    /// or a pause or stop request is observed.
    pub async fn start(&mut self) -> Result<RunOutcome> {
        if !self.control.begin() {
            debug!("start ignored, a run is already active");
            return Ok(RunOutcome::AlreadyRunning);
        }

        if let Err(err) = self.restore() {
            self.control.finish();
            self.broadcast();
            return Err(err);
        }

        if self.state.total() == 0 {
            info!("no profiles loaded, nothing to scrape");
            self.control.finish();
            self.broadcast();
            return Ok(RunOutcome::NoProfiles);
        }

        info!(
            total = self.state.total(),
            current_index = self.state.current_index,
            "scrape run started"
        );

        while self.state.has_pending() && self.control.should_continue() {
            let index = self.state.current_index;
            self.broadcast();

            let person = self.state.profile_data[index].clone();
            let result = match self
                .fetcher
                .fetch(&self.api_config, &person, self.settings, index)
                .await
            {
                Ok(record) => {
                    debug!(index, fields = record.len(), "profile scraped");
                    ScrapeResult::success(record, self.fetcher.clock.now_ms(), index)
                }
                Err(err) => {
                    warn!(index, error = %err, "profile failed");
                    ScrapeResult::failure(person, err.to_string(), self.fetcher.clock.now_ms(), index)
                }
            };
            self.state.advance(result);

            if self.state.current_index % self.settings.batch_size.max(1) == 0 {
                self.checkpoint();
            }
            self.broadcast();

            if self.state.has_pending() {
                let delay = jittered(self.settings.delay_between_requests, self.settings.jitter_max);
                debug!(index, delay_ms = delay.as_millis() as u64, "waiting before next profile");
                self.fetcher.clock.sleep(delay).await;
            }
        }

        let outcome = if self.control.phase() == Phase::Stopped {
            RunOutcome::Stopped
        } else if self.state.has_pending() {
            RunOutcome::Paused
        } else {
            RunOutcome::Completed
        };
        self.control.finish();

        info!(
            outcome = ?outcome,
            current_index = self.state.current_index,
            successes = self.state.success_count(),
            errors = self.state.error_count(),
            "scrape run ended"
        );

        let saved = self.persist();
        self.broadcast();
        if !self.state.results.is_empty() {
            if let Err(err) = self.export() {
                warn!(error = %err, "export after run failed");
            }
        }

        saved?;
        Ok(outcome)
    }

    /// Hand all accumulated results to the configured exporter.
    pub fn export(&self) -> Result<Option<ExportReceipt>> {
        let Some(exporter) = &self.exporter else {
            debug!("no exporter configured, skipping export");
            return Ok(None);
        };
        let receipt = exporter.export(&self.state.results, self.fetcher.clock.now_ms())?;
        Ok(Some(receipt))
    }

    fn restore(&mut self) -> Result<()> {
        let persisted = self.store.load()?;

        if let Some(profiles) = persisted.profile_data {
            self.state.profile_data = profiles;
        }
        if let Some(index) = persisted.current_index {
            self.state.current_index = index;
        }
        if let Some(results) = persisted.results {
            self.state.results = results;
        }
        if self.state.reconcile() {
            warn!(
                current_index = self.state.current_index,
                "persisted progress was inconsistent, rewound to last recorded result"
            );
        }
        if let Some(settings) = persisted.settings {
            self.general = settings;
            self.settings.apply(&settings);
        }
        if let Some(config) = persisted.api_config {
            self.api_config = config;
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        self.store.save_run(RunSnapshot {
            profile_data: &self.state.profile_data,
            current_index: self.state.current_index,
            results: &self.state.results,
            api_config: &self.api_config,
            saved_at: self.fetcher.clock.now_ms(),
        })
    }

    fn checkpoint(&mut self) {
        if let Err(err) = self.persist() {
            warn!(error = %err, current_index = self.state.current_index, "checkpoint failed");
        }
    }

    fn broadcast(&self) {
        self.status_tx.send_replace(self.status());
    }
}

fn snapshot_of(state: &RunState, api_config: &ApiConfig, control: &ScrapeControl) -> StatusSnapshot {
    StatusSnapshot {
        is_running: control.is_running(),
        is_paused: control.is_paused(),
        current_index: state.current_index,
        total_profiles: state.total(),
        total_results: state.results.len(),
        success_count: state.success_count(),
        error_count: state.error_count(),
        api_config: api_config.clone(),
    }
}
