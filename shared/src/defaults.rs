//! Default values for configuration parameters
//!
//! This module centralizes all default value functions used by the
//! `GatewayConfig` structure. These functions are used by serde when
//! deserializing a configuration file that doesn't specify certain optional
//! fields.

/// Default local HTTP server bind address
pub fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

/// Default local HTTP server port
pub fn default_http_port() -> u16 {
    5000
}

/// Default harvest batch size before a transport is spawned (`N_BATCH`)
pub fn default_batch_size() -> usize {
    10
}

/// Default minimum backoff, in milliseconds
pub fn default_backoff_min_ms() -> u64 {
    1_000
}

/// Default maximum backoff, in milliseconds
pub fn default_backoff_max_ms() -> u64 {
    256_000
}

/// Default scheduler sleep epsilon: deadlines closer than this are treated as due now
pub fn default_scheduler_epsilon_ms() -> u64 {
    10
}

/// Default past-due clamp applied to tasks enqueued with a deadline already behind `now`
pub fn default_past_due_clamp_ms() -> u64 {
    100
}

/// Default delay before the first harvest poll after a device is opened
pub fn default_initial_harvest_delay_ms() -> u64 {
    10_000
}

/// Default delay before retrying a failed device open
pub fn default_open_retry_delay_ms() -> u64 {
    10_000
}

/// Default interval between settings pulls from the backend
pub fn default_settings_pull_interval_ms() -> u64 {
    60_000
}

/// Default maximum number of web-dispatch work items drained per scheduler tick
pub fn default_web_dispatch_batch_size() -> usize {
    16
}

/// Default interval between web-dispatch ticks
pub fn default_web_dispatch_interval_ms() -> u64 {
    100
}

/// Default graceful shutdown timeout for the gateway process
pub fn default_graceful_shutdown_timeout_secs() -> u64 {
    10
}

/// Default channel buffer size for the blackboard's task submission port
pub fn default_submission_channel_buffer_size() -> usize {
    256
}

/// Default bootstrap file path
pub fn default_bootstrap_path() -> String {
    "bootstrap.txt".to_string()
}
