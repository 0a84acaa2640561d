//! Process-level configuration for the gateway binary.
//!
//! Loaded from an optional TOML file and overridable by CLI flags. This is
//! distinct from [`crate::api::Settings`], the backend-origin document the
//! blackboard carries at runtime: `GatewayConfig` governs how the process
//! itself is wired up and never changes after start-up.

use crate::defaults::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    /// Local HTTP control surface bind address
    #[serde(default = "default_http_host")]
    pub http_host: String,
    /// Local HTTP control surface port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Harvest batch size before a transport is spawned (`N_BATCH`)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Minimum per-device harvest backoff, in milliseconds
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,
    /// Maximum per-device harvest backoff, in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Scheduler sleep epsilon: deadlines closer than this are treated as due now
    #[serde(default = "default_scheduler_epsilon_ms")]
    pub scheduler_epsilon_ms: u64,
    /// Past-due clamp applied to tasks enqueued with a deadline already behind `now`
    #[serde(default = "default_past_due_clamp_ms")]
    pub past_due_clamp_ms: u64,
    /// Delay before the first harvest poll after a device is opened
    #[serde(default = "default_initial_harvest_delay_ms")]
    pub initial_harvest_delay_ms: u64,
    /// Delay before retrying a failed device open
    #[serde(default = "default_open_retry_delay_ms")]
    pub open_retry_delay_ms: u64,
    /// Interval between settings pulls from the backend
    #[serde(default = "default_settings_pull_interval_ms")]
    pub settings_pull_interval_ms: u64,
    /// Maximum number of web-dispatch work items drained per scheduler tick
    #[serde(default = "default_web_dispatch_batch_size")]
    pub web_dispatch_batch_size: usize,
    /// Interval between web-dispatch ticks
    #[serde(default = "default_web_dispatch_interval_ms")]
    pub web_dispatch_interval_ms: u64,
    /// Graceful shutdown timeout for the gateway process
    #[serde(default = "default_graceful_shutdown_timeout_secs")]
    pub graceful_shutdown_timeout_secs: u64,
    /// Channel buffer size for the blackboard's task submission port
    #[serde(default = "default_submission_channel_buffer_size")]
    pub submission_channel_buffer_size: usize,
    /// Path to the declarative bootstrap file
    #[serde(default = "default_bootstrap_path")]
    pub bootstrap_path: String,
    /// Backend URL the harvest transport uploads batches to
    #[serde(default)]
    pub upload_url: String,
    /// Backend URL the settings tasks pull from / push to
    #[serde(default)]
    pub settings_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_host: default_http_host(),
            http_port: default_http_port(),
            batch_size: default_batch_size(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            scheduler_epsilon_ms: default_scheduler_epsilon_ms(),
            past_due_clamp_ms: default_past_due_clamp_ms(),
            initial_harvest_delay_ms: default_initial_harvest_delay_ms(),
            open_retry_delay_ms: default_open_retry_delay_ms(),
            settings_pull_interval_ms: default_settings_pull_interval_ms(),
            web_dispatch_batch_size: default_web_dispatch_batch_size(),
            web_dispatch_interval_ms: default_web_dispatch_interval_ms(),
            graceful_shutdown_timeout_secs: default_graceful_shutdown_timeout_secs(),
            submission_channel_buffer_size: default_submission_channel_buffer_size(),
            bootstrap_path: default_bootstrap_path(),
            upload_url: String::new(),
            settings_url: String::new(),
        }
    }
}

impl GatewayConfig {
    /// Loads a config document from a TOML file, falling back to defaults
    /// for any field the file omits.
    pub fn load_from_str(contents: &str) -> crate::Result<Self> {
        toml::from_str(contents)
            .map_err(|e| crate::GatewayError::BadRequest(format!("invalid config file: {e}")).into())
    }

    /// Validates the loaded configuration, rejecting combinations that
    /// would otherwise only fail later at first use.
    pub fn validate(&self) -> crate::Result<()> {
        if self.backoff_min_ms == 0 {
            return Err(
                crate::GatewayError::BadRequest("backoff_min_ms must be greater than 0".into())
                    .into(),
            );
        }
        if self.backoff_max_ms < self.backoff_min_ms {
            return Err(crate::GatewayError::BadRequest(
                "backoff_max_ms must be >= backoff_min_ms".into(),
            )
            .into());
        }
        if self.batch_size == 0 {
            return Err(
                crate::GatewayError::BadRequest("batch_size must be greater than 0".into()).into(),
            );
        }
        if self.web_dispatch_batch_size == 0 {
            return Err(crate::GatewayError::BadRequest(
                "web_dispatch_batch_size must be greater than 0".into(),
            )
            .into());
        }
        Ok(())
    }
}
