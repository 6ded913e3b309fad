use crate::traits::SearchCriterion;
use chrono::NaiveDate;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub mailbox: MailboxConfig,
    #[serde(default = "default_sender_filter")]
    pub sender_filter: String,
    pub since: Option<NaiveDate>,
    pub destination_folder: Option<PathBuf>,
    pub log_file: Option<String>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub quiet: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    pub username: String,
    pub password: String,
    #[serde(default = "default_folder")]
    pub folder: String,
}

// The only sender whose order emails follow the expected layout
pub const DEFAULT_SENDER_FILTER: &str = "service@sainsburys.co.uk";

pub const DEFAULT_MAILBOX_FOLDER: &str = "INBOX";

fn default_sender_filter() -> String {
    DEFAULT_SENDER_FILTER.to_string()
}

fn default_folder() -> String {
    DEFAULT_MAILBOX_FOLDER.to_string()
}

fn default_use_tls() -> bool {
    true
}

// Implement loading configuration
impl AppConfig {
    // Load config from defaults, then file (if exists), then environment variables
    pub fn new() -> Result<Self, ConfigError> {
        Self::configure_defaults()?
            .add_source(File::with_name("config").required(false))
            // e.g. APP__MAILBOX__HOST=... APP__DESTINATION_FOLDER=...
            .add_source(Self::environment())
            .build()?
            .try_deserialize()
    }

    // Load config from a specific file path
    pub fn new_from_file(path: &str) -> Result<Self, ConfigError> {
        Self::configure_defaults()?
            .add_source(File::with_name(path).required(true))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()
    }

    pub fn search_criterion(&self) -> SearchCriterion {
        SearchCriterion::from_sender(self.sender_filter.clone()).since(self.since)
    }

    fn environment() -> Environment {
        Environment::with_prefix("APP")
            .separator("__")
            .try_parsing(true)
    }

    fn configure_defaults()
    -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(Config::builder())
    }
}
