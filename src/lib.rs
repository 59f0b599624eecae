pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod github;
pub mod graphql;
pub mod models;
pub mod output;
pub mod summary;
pub mod types;

pub use collector::Collector;
pub use config::{ClientConfig, CollectorConfig};
pub use error::{CollectorError, Result};
pub use github::GitHubClient;
