pub mod config;
pub mod dispatch;
pub mod error;
pub mod person;
pub mod transport;

pub use config::{ApiConfig, ApiType};
pub use dispatch::{ApiRequest, CustomHooks, build_request, extract_payload};
pub use error::ScanError;
pub use person::PersonIdentifier;
pub use transport::{HttpTransport, Transport};
