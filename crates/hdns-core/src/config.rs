//! Configuration types for the hdns client
//!
//! This module defines all configuration structures used throughout the crate.

use crate::backoff::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the hdns REST API (e.g. `http://localhost:8080/api/`)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Real-time stream settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// API availability monitoring settings
    #[serde(default)]
    pub health: HealthConfig,

    /// Notification center settings
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl ClientConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            api_url: default_api_url(),
            stream: StreamConfig::default(),
            health: HealthConfig::default(),
            notify: NotifyConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.api_url.trim().is_empty() {
            return Err(crate::Error::config("API URL cannot be empty"));
        }

        self.stream.validate()?;
        self.health.validate()?;
        self.notify.validate()?;

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconnecting stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Delay before the first reconnect attempt (in milliseconds)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound of the exponential reconnect delay (in milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Exclusive upper bound of the random jitter (in milliseconds)
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Maximum consecutive reconnect attempts
    ///
    /// `None` retries forever. Once exhausted the message stream ends with a
    /// terminal error.
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Capacity of the diagnostic event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Number of payloads buffered per subscriber before it starts skipping
    #[serde(default = "default_message_buffer")]
    pub message_buffer: usize,
}

impl StreamConfig {
    /// Backoff policy derived from this configuration
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.max_backoff_ms),
            Duration::from_millis(self.jitter_ms),
        )
    }

    /// Validate the stream configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.backoff_base_ms == 0 {
            return Err(crate::Error::config("Backoff base must be > 0"));
        }
        if self.max_backoff_ms < self.backoff_base_ms {
            return Err(crate::Error::config(
                "Maximum backoff must not be smaller than the backoff base",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.message_buffer == 0 {
            return Err(crate::Error::config("Message buffer must be > 0"));
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_ms: default_jitter_ms(),
            max_attempts: None,
            event_channel_capacity: default_event_channel_capacity(),
            message_buffer: default_message_buffer(),
        }
    }
}

/// API availability monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Delay before the first probe (in milliseconds)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Probe interval while the API is reachable (in seconds)
    #[serde(default = "default_connected_interval_secs")]
    pub connected_interval_secs: u64,

    /// Probe interval while the API is unreachable (in seconds)
    #[serde(default = "default_disconnected_interval_secs")]
    pub disconnected_interval_secs: u64,

    /// Upper bound for a single probe (in seconds)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Optional periodic refresh trigger (in seconds, 10..=300)
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,

    /// Capacity of the monitor event channel
    #[serde(default = "default_monitor_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl HealthConfig {
    /// Delay before the first probe
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Probe interval for the given connectivity
    pub fn interval(&self, connected: bool) -> Duration {
        if connected {
            Duration::from_secs(self.connected_interval_secs)
        } else {
            Duration::from_secs(self.disconnected_interval_secs)
        }
    }

    /// Upper bound for a single probe
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Periodic refresh interval, if enabled
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs.map(Duration::from_secs)
    }

    /// Validate the health configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.connected_interval_secs == 0 || self.disconnected_interval_secs == 0 {
            return Err(crate::Error::config("Probe intervals must be > 0"));
        }
        if self.probe_timeout_secs == 0 {
            return Err(crate::Error::config("Probe timeout must be > 0"));
        }
        if let Some(refresh) = self.refresh_interval_secs
            && !(10..=300).contains(&refresh)
        {
            return Err(crate::Error::config(format!(
                "Refresh interval must be between 10 and 300 seconds. Got: {}",
                refresh
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            connected_interval_secs: default_connected_interval_secs(),
            disconnected_interval_secs: default_disconnected_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            refresh_interval_secs: None,
            event_channel_capacity: default_monitor_channel_capacity(),
        }
    }
}

/// Notification center configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Maximum number of notifications shown at once
    #[serde(default = "default_max_visible")]
    pub max_visible: usize,

    /// Vertical distance between stacked notifications (in pixels)
    #[serde(default = "default_stack_spacing")]
    pub stack_spacing: u32,

    /// How long a notification stays visible (in milliseconds)
    #[serde(default = "default_notification_duration_ms")]
    pub default_duration_ms: u64,
}

impl NotifyConfig {
    /// How long a notification stays visible
    pub fn default_duration(&self) -> Duration {
        Duration::from_millis(self.default_duration_ms)
    }

    /// Validate the notification configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_visible == 0 {
            return Err(crate::Error::config("At least one notification must be visible"));
        }
        Ok(())
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_visible: default_max_visible(),
            stack_spacing: default_stack_spacing(),
            default_duration_ms: default_notification_duration_ms(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8080/api/".to_string()
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    300
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_message_buffer() -> usize {
    64
}

fn default_initial_delay_ms() -> u64 {
    300
}

fn default_connected_interval_secs() -> u64 {
    30
}

fn default_disconnected_interval_secs() -> u64 {
    5
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_monitor_channel_capacity() -> usize {
    64
}

fn default_max_visible() -> usize {
    3
}

fn default_stack_spacing() -> u32 {
    65
}

fn default_notification_duration_ms() -> u64 {
    5_000
}
