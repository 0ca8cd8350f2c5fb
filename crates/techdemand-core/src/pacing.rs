//! Optional request pacing.
//!
//! The configured rate limit is only applied when a pacing mode is selected:
//!
//! - [`Pacing::Off`]: no delays (default).
//! - [`Pacing::Attempts`]: successive attempts of the same task are at least
//!   `rate_limit` apart. Tasks are not paced against each other.
//! - [`Pacing::Launches`]: successive task launches across the whole run are
//!   at least `rate_limit` apart.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    #[default]
    Off,
    Attempts,
    Launches,
}

impl Pacing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pacing::Off => "off",
            Pacing::Attempts => "attempts",
            Pacing::Launches => "launches",
        }
    }
}

impl fmt::Display for Pacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Pacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Ok(Pacing::Off),
            "attempts" => Ok(Pacing::Attempts),
            "launches" => Ok(Pacing::Launches),
            _ => Err(format!("Unknown pacing mode: {}", s)),
        }
    }
}

/// Enforces a minimum interval between successive [`wait`](Self::wait) calls.
///
/// Clones share the same clock, so one pacer can gate many tasks.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    last: Arc<Mutex<Option<Instant>>>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep until `interval` has passed since the previous call, then
    /// record the current time. The first call never sleeps.
    pub async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        // Held across the sleep so concurrent callers queue up behind it.
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                let sleep_duration = self.interval - elapsed;
                tracing::debug!(sleep_ms = %sleep_duration.as_millis(), "Pacing request");
                tokio::time::sleep(sleep_duration).await;
            }
        }
        *last = Some(Instant::now());
    }
}
