//! Configuration types for splitjob

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Split service connection settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the split service (default: "http://127.0.0.1:8000")
    ///
    /// Job endpoints are resolved below it as `{base_url}/jobs/{job_id}/...`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Poll loop behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between status polls in seconds (default: 2)
    ///
    /// Serialized config expresses this in whole seconds, and any fraction is
    /// dropped when written out. Set the field directly for sub-second intervals;
    /// `validate()` only rejects zero.
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Release a page's claim when its artifact fetch fails (default: false)
    ///
    /// With the default, a page whose fetch fails is skipped for the rest of the
    /// job. Enabling this lets the next tick that still reports the page as ready
    /// try again, and holds back completion until that retry has happened.
    #[serde(default)]
    pub reclaim_failed_pages: bool,

    /// How long `shutdown()` waits for running poll loops to exit (default: 10)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            reclaim_failed_pages: false,
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Main configuration for SplitJobOrchestrator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Split service connection settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Poll loop behavior
    #[serde(default)]
    pub polling: PollingConfig,

    /// Capacity of the job event broadcast channel (default: 1000)
    ///
    /// Subscribers that fall further behind than this receive `RecvError::Lagged`.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            polling: PollingConfig::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Config {
    /// Check settings that serde alone cannot enforce
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval.is_zero() {
            return Err(Error::Config {
                message: "poll interval must be greater than zero".to_string(),
                key: Some("polling.interval".to_string()),
            });
        }

        if self.event_buffer == 0 {
            return Err(Error::Config {
                message: "event buffer must hold at least one event".to_string(),
                key: Some("event_buffer".to_string()),
            });
        }

        let url = url::Url::parse(&self.service.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL '{}': {}", self.service.base_url, e),
            key: Some("service.base_url".to_string()),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config {
                message: format!("base URL must be http or https, got '{}'", url.scheme()),
                key: Some("service.base_url".to_string()),
            });
        }

        Ok(())
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("splitjob/{}", env!("CARGO_PKG_VERSION"))
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_event_buffer() -> usize {
    1000
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
