// Message-style control surface over a scraper that runs on its own task

use crate::config::ApiConfigPatch;
use crate::error::{CoreError, Result};
use crate::model::{GeneralSettings, StatusSnapshot};
use crate::scrape::{RunOutcome, ScrapeControl, Scraper};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    LoadProfiles { data: Value },
    UpdateApiConfig { config: ApiConfigPatch },
    StartScraping,
    PauseScraping,
    ResumeScraping,
    StopScraping,
    GetStatus,
    ExportResults,
    UpdateSettings { settings: GeneralSettings },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusToken {
    Loaded,
    Error,
    Updated,
    Started,
    Paused,
    Resumed,
    Stopped,
    Exported,
}

impl StatusToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusToken::Loaded => "loaded",
            StatusToken::Error => "error",
            StatusToken::Updated => "updated",
            StatusToken::Started => "started",
            StatusToken::Paused => "paused",
            StatusToken::Resumed => "resumed",
            StatusToken::Stopped => "stopped",
            StatusToken::Exported => "exported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Status(StatusSnapshot),
    Ack {
        status: StatusToken,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl Reply {
    pub fn ack(status: StatusToken) -> Self {
        Reply::Ack {
            status,
            count: None,
            error: None,
            path: None,
        }
    }

    pub fn count(status: StatusToken, count: usize) -> Self {
        Reply::Ack {
            status,
            count: Some(count),
            error: None,
            path: None,
        }
    }

    pub fn error(err: &CoreError) -> Self {
        Reply::Ack {
            status: StatusToken::Error,
            count: None,
            error: Some(err.to_string()),
            path: None,
        }
    }

    pub fn token(&self) -> Option<StatusToken> {
        match self {
            Reply::Ack { status, .. } => Some(*status),
            Reply::Status(_) => None,
        }
    }
}

/// Owns a scraper and runs it on a background task so commands keep being
/// accepted while a run is in flight.
pub struct ScrapeService {
    scraper: Arc<Mutex<Scraper>>,
    control: ScrapeControl,
    status: watch::Receiver<StatusSnapshot>,
    run: Option<JoinHandle<Result<RunOutcome>>>,
}

impl ScrapeService {
    pub fn new(scraper: Scraper) -> Self {
        let control = scraper.control();
        let status = scraper.subscribe();
        Self {
            scraper: Arc::new(Mutex::new(scraper)),
            control,
            status,
            run: None,
        }
    }

    pub fn control(&self) -> ScrapeControl {
        self.control.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn run_active(&self) -> bool {
        self.run.as_ref().is_some_and(|handle| !handle.is_finished()) || self.control.is_active()
    }

    pub async fn handle(&mut self, command: Command) -> Reply {
        debug!(?command, "control command");
        match self.dispatch(command).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "control command failed");
                Reply::error(&err)
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<Reply> {
        match command {
            Command::LoadProfiles { data } => {
                self.ensure_idle()?;
                let count = self.scraper.lock().await.load_profiles_value(data)?;
                Ok(Reply::count(StatusToken::Loaded, count))
            }
            Command::UpdateApiConfig { config } => {
                self.ensure_idle()?;
                self.scraper.lock().await.update_api_config(&config)?;
                Ok(Reply::ack(StatusToken::Updated))
            }
            Command::UpdateSettings { settings } => {
                self.ensure_idle()?;
                self.scraper.lock().await.update_settings(settings)?;
                Ok(Reply::ack(StatusToken::Updated))
            }
            Command::StartScraping => {
                if !self.run_active() {
                    self.spawn_run(false).await;
                }
                Ok(Reply::ack(StatusToken::Started))
            }
            Command::ResumeScraping => {
                if self.run_active() {
                    self.control.clear_pause();
                } else {
                    self.spawn_run(true).await;
                }
                Ok(Reply::ack(StatusToken::Resumed))
            }
            Command::PauseScraping => {
                if self.run_active() {
                    self.control.request_pause();
                } else {
                    self.scraper.lock().await.pause()?;
                }
                Ok(Reply::ack(StatusToken::Paused))
            }
            Command::StopScraping => {
                if self.run_active() {
                    self.control.request_stop();
                } else {
                    self.scraper.lock().await.stop()?;
                }
                Ok(Reply::ack(StatusToken::Stopped))
            }
            Command::GetStatus => Ok(Reply::Status(self.status())),
            Command::ExportResults => {
                self.ensure_idle()?;
                let scraper = self.scraper.lock().await;
                let count = scraper.results().len();
                let path = scraper
                    .export()?
                    .map(|receipt| receipt.path.display().to_string());
                Ok(Reply::Ack {
                    status: StatusToken::Exported,
                    count: Some(count),
                    error: None,
                    path,
                })
            }
        }
    }

    /// Wait for the active run, if any, and report how it ended.
    pub async fn wait(&mut self) -> Result<Option<RunOutcome>> {
        let Some(handle) = self.run.take() else {
            return Ok(None);
        };
        match handle.await {
            Ok(outcome) => outcome.map(Some),
            Err(err) => Err(CoreError::TaskFailed(err.to_string())),
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.run_active() {
            return Err(CoreError::RunInProgress);
        }
        Ok(())
    }

    /// Returns once the new run has claimed the control handle, so a pause
    /// sent right after start is not reset by the run starting up.
    async fn spawn_run(&mut self, resume: bool) {
        let scraper = Arc::clone(&self.scraper);
        let handle = tokio::spawn(async move {
            let mut scraper = scraper.lock().await;
            if resume {
                scraper.resume().await
            } else {
                scraper.start().await
            }
        });
        while !self.control.is_active() && !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        self.run = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryStore;
    use crate::testing::{FakeClock, ScriptedTransport, graphql_scraper};
    use serde_json::json;

    #[test]
    fn test_command_parsing() {
        let command: Command =
            serde_json::from_value(json!({"action": "updateSettings", "settings": {"delay": 1200}})).unwrap();
        assert_eq!(
            command,
            Command::UpdateSettings {
                settings: GeneralSettings { delay: Some(1200) }
            }
        );

        let command: Command = serde_json::from_value(json!({"action": "getStatus"})).unwrap();
        assert_eq!(command, Command::GetStatus);

        let command: Command = serde_json::from_value(json!({
            "action": "updateApiConfig",
            "config": {"targetDomain": "event.igblive.com", "eventId": "EV"}
        }))
        .unwrap();
        match command {
            Command::UpdateApiConfig { config } => assert_eq!(config.event_id.as_deref(), Some("EV")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_reply_shapes() {
        let loaded = serde_json::to_value(Reply::count(StatusToken::Loaded, 2)).unwrap();
        assert_eq!(loaded, json!({"status": "loaded", "count": 2}));

        let failed = serde_json::to_value(Reply::error(&CoreError::RunInProgress)).unwrap();
        assert_eq!(failed["status"], json!("error"));
        assert!(failed["error"].is_string());
    }

    #[tokio::test]
    async fn test_full_run_through_commands() {
        let scraper = graphql_scraper(ScriptedTransport::new(vec![]), FakeClock::new(), MemoryStore::new());
        let mut service = ScrapeService::new(scraper);

        let reply = service
            .handle(Command::LoadProfiles {
                data: json!([{"profileId": "a"}, {"profileId": "b"}]),
            })
            .await;
        assert_eq!(reply, Reply::count(StatusToken::Loaded, 2));

        let reply = service.handle(Command::StartScraping).await;
        assert_eq!(reply.token(), Some(StatusToken::Started));
        assert_eq!(service.wait().await.unwrap(), Some(RunOutcome::Completed));

        match service.handle(Command::GetStatus).await {
            Reply::Status(status) => {
                assert_eq!(status.total_results, 2);
                assert_eq!(status.success_count, 2);
                assert!(!status.is_running);
            }
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mutations_rejected_during_run() {
        let (transport, gate) = ScriptedTransport::gated();
        let scraper = graphql_scraper(transport, FakeClock::new(), MemoryStore::new());
        let mut service = ScrapeService::new(scraper);
        service
            .handle(Command::LoadProfiles {
                data: json!({"profiles": [{"profileId": "a"}, {"profileId": "b"}]}),
            })
            .await;

        service.handle(Command::StartScraping).await;
        assert!(service.run_active());

        let reply = service
            .handle(Command::LoadProfiles {
                data: json!([{"profileId": "c"}]),
            })
            .await;
        assert_eq!(reply.token(), Some(StatusToken::Error));
        let reply = service.handle(Command::ExportResults).await;
        assert_eq!(reply.token(), Some(StatusToken::Error));

        gate.notify_one();
        gate.notify_one();
        service.wait().await.unwrap();
        assert_eq!(service.status().total_profiles, 2);
    }

    #[tokio::test]
    async fn test_pause_during_run_and_resume() {
        let (transport, gate) = ScriptedTransport::gated();
        let scraper = graphql_scraper(transport, FakeClock::new(), MemoryStore::new());
        let mut service = ScrapeService::new(scraper);
        service
            .handle(Command::LoadProfiles {
                data: json!([{"profileId": "a"}, {"profileId": "b"}, {"profileId": "c"}]),
            })
            .await;

        service.handle(Command::StartScraping).await;
        let reply = service.handle(Command::PauseScraping).await;
        assert_eq!(reply.token(), Some(StatusToken::Paused));
        gate.notify_one();

        assert_eq!(service.wait().await.unwrap(), Some(RunOutcome::Paused));
        let status = service.status();
        assert!(status.is_paused);
        assert_eq!(status.total_results, 1);

        service.handle(Command::ResumeScraping).await;
        gate.notify_one();
        gate.notify_one();
        assert_eq!(service.wait().await.unwrap(), Some(RunOutcome::Completed));
        assert_eq!(service.status().total_results, 3);
    }

    #[tokio::test]
    async fn test_bad_profile_payload_leaves_state() {
        let scraper = graphql_scraper(ScriptedTransport::new(vec![]), FakeClock::new(), MemoryStore::new());
        let mut service = ScrapeService::new(scraper);

        let reply = service
            .handle(Command::LoadProfiles {
                data: json!({"rows": []}),
            })
            .await;
        match reply {
            Reply::Ack { status, error, .. } => {
                assert_eq!(status, StatusToken::Error);
                assert!(error.unwrap().starts_with("Invalid profile data format"));
            }
            other => panic!("expected ack, got {:?}", other),
        }
        assert_eq!(service.status().total_profiles, 0);
    }

    #[tokio::test]
    async fn test_export_without_exporter_reports_count() {
        let scraper = graphql_scraper(ScriptedTransport::new(vec![]), FakeClock::new(), MemoryStore::new());
        let mut service = ScrapeService::new(scraper);
        let reply = service.handle(Command::ExportResults).await;
        assert_eq!(
            reply,
            Reply::Ack {
                status: StatusToken::Exported,
                count: Some(0),
                error: None,
                path: None,
            }
        );
    }
}
