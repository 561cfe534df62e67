use serde::Deserialize;

use crate::error::Error;

pub const DEFAULT_PATH: &str = "/etc/sendgrid/relay.toml";
pub const API_KEY_ENV: &str = "SENDGRID_API_KEY";
const ENV_PREFIX: &str = "SENDGRID";

/// SendGrid transport settings.
///
/// Every field is optional here; `SendgridClient` decides what is
/// required and what has a default.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Settings {
    pub api_key: Option<String>,
    pub api_host: Option<String>,
    /// Request timeout, in seconds
    pub timeout: Option<u64>,
}

impl Settings {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_host(mut self, api_host: impl Into<String>) -> Self {
        self.api_host = Some(api_host.into());
        self
    }

    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The explicit key if set, otherwise whatever `lookup` finds under
    /// `SENDGRID_API_KEY`. Blank keys count as missing.
    pub fn resolve_api_key<F>(&self, lookup: F) -> Result<String, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key
            .clone()
            .or_else(|| lookup(API_KEY_ENV))
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Configuration(format!("{} is required", API_KEY_ENV)))
    }
}

/// Loads SendGrid settings from a TOML file and merges them with any
/// environment variables prefixed with SENDGRID_.
///
/// The default file is optional; a path passed in explicitly must exist.
pub fn load_config(path: Option<&str>) -> Result<Settings, Error> {
    let file = config::File::with_name(path.unwrap_or(DEFAULT_PATH)).required(path.is_some());

    let settings = config::Config::builder()
        .add_source(file)
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()?;

    Ok(settings.try_deserialize::<Settings>()?)
}
