use std::{path::Path, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Config {
    /// Global switch of the push functionality.
    pub push_enabled: bool,
    /// Token of the identity that delivers push messages on behalf of users.
    pub push_worker_token: String,
    /// Check subscription acls for users holding only the consumer role.
    pub resource_auth: bool,
    pub push_sender_timeout_secs: u64,
    pub verification_timeout_secs: u64,
    /// Upper bound of a pull that doesn't return immediately.
    pub consume_wait_millis: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            push_enabled: false,
            push_worker_token: String::new(),
            resource_auth: true,
            push_sender_timeout_secs: 30,
            verification_timeout_secs: 10,
            consume_wait_millis: 5000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.push_sender_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "push_sender_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.verification_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "verification_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.consume_wait_millis == 0 {
            return Err(ConfigError::Invalid(
                "consume_wait_millis must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn push_sender_timeout(&self) -> Duration {
        Duration::from_secs(self.push_sender_timeout_secs)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.verification_timeout_secs)
    }

    pub fn consume_wait(&self) -> Duration {
        Duration::from_millis(self.consume_wait_millis)
    }
}
