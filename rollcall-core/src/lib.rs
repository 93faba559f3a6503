pub mod clock;
pub mod config;
pub mod control;
pub mod data;
pub mod error;
pub mod export;
pub mod ingest;
pub mod model;
pub mod normalize;
pub mod scrape;
pub mod social;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, SystemClock};
pub use config::{ApiConfigPatch, ConfigForm};
pub use control::{Command, Reply, ScrapeService, StatusToken};
pub use data::{MemoryStore, SqliteStore, StateStore};
pub use error::CoreError;
pub use export::{Exporter, JsonFileExporter};
pub use model::{FlattenedRecord, GeneralSettings, ScrapeResult, ScrapeSettings, StatusSnapshot};
pub use scrape::{Phase, RunOutcome, ScrapeControl, Scraper};
