//! Global configuration model for podrun.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{PodrunError, Result};

/// Root configuration for podrun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodrunConfig {
    /// Base directory for podrun state; pods live in `<data_dir>/pods`.
    pub data_dir: PathBuf,
    /// Garbage collection settings.
    pub gc: GcConfig,
}

impl Default for PodrunConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(constants::DEFAULT_DATA_DIR),
            gc: GcConfig::default(),
        }
    }
}

impl PodrunConfig {
    /// Loads a configuration file in JSON form.
    ///
    /// Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| PodrunError::io(path, e))?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Returns the pods root directory.
    #[must_use]
    pub fn pods_dir(&self) -> PathBuf {
        self.data_dir.join(constants::PODS_DIR_NAME)
    }
}

/// Garbage collection windows, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Minimum dwell time in a garbage directory before deletion.
    pub grace_period_secs: u64,
    /// Age after which an unused prepared pod is collected.
    pub prepared_expiration_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: constants::DEFAULT_GRACE_PERIOD.as_secs(),
            prepared_expiration_secs: constants::DEFAULT_PREPARED_EXPIRATION.as_secs(),
        }
    }
}

impl GcConfig {
    /// Grace period as a [`Duration`].
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Prepared expiration as a [`Duration`].
    #[must_use]
    pub const fn prepared_expiration(&self) -> Duration {
        Duration::from_secs(self.prepared_expiration_secs)
    }
}

/// Parses durations like `"90s"`, `"30m"`, `"2h"`, `"1d"` or bare seconds.
#[must_use]
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('d') {
        (n, 24 * 60 * 60)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 60 * 60)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else {
        (s, 1)
    };
    num_str
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .map(Duration::from_secs)
}
