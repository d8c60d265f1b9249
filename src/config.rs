use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{instruction::Environment, retry::RetryConfig};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    pub outbound_queue_name: String,
    pub status_queues: Vec<String>,
    #[serde(default)]
    pub disabled_status_queues: Vec<String>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    #[serde(default)]
    pub default_environment: Environment,
    pub remote_address: Option<String>,

    pub database_url: Option<String>,

    #[serde(default = "default_template_dir")]
    pub template_dir: String,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_receive_timeout_ms() -> u64 {
    1000
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_template_dir() -> String {
    "templates".to_string()
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    100
}

fn default_max_retry_delay_ms() -> u64 {
    2000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

fn default_server_port() -> u16 {
    8080
}

/// A configured status queue and whether its poller starts RUNNING.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusQueueConfig {
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub receive_timeout: Duration,
    pub max_consecutive_failures: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
            receive_timeout: Duration::from_millis(default_receive_timeout_ms()),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_iter<I>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Self>(vars)
            .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.status_queue_configs().is_empty() {
            return Err(anyhow!("At least one status queue must be configured"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow!("POLL_INTERVAL_MS must be greater than zero"));
        }

        if self.max_consecutive_failures == 0 {
            return Err(anyhow!("MAX_CONSECUTIVE_FAILURES must be greater than zero"));
        }

        if self.default_environment == Environment::Remote && self.remote_address.is_none() {
            return Err(anyhow!(
                "REMOTE_ADDRESS is required when DEFAULT_ENVIRONMENT is remote"
            ));
        }

        Ok(())
    }

    pub fn status_queue_configs(&self) -> Vec<StatusQueueConfig> {
        self.status_queues
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(|name| StatusQueueConfig {
                name: name.to_string(),
                enabled: !self
                    .disabled_status_queues
                    .iter()
                    .any(|disabled| disabled.trim() == name),
            })
            .collect()
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }
}
