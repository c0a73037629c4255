//! Runtime configuration from environment variables.
//!
//! `ANALYZER_URL` selects the real HTTP analyzer; when unset the app runs
//! against the simulated backend. `ANALYZER_TIMEOUT_SECS` bounds one
//! submission round trip (default 60).

use std::env;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    /// Analyzer endpoint; `None` means run the simulated backend.
    pub analyzer_url: Option<String>,
    /// Per-submission deadline.
    pub analyzer_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let analyzer_url = env::var("ANALYZER_URL")
            .ok()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        let analyzer_timeout = match env::var("ANALYZER_TIMEOUT_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    log::warn!(
                        "Invalid ANALYZER_TIMEOUT_SECS '{}', using default {}s",
                        raw,
                        DEFAULT_TIMEOUT_SECS
                    );
                    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
                }
            },
            Err(_) => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Self {
            analyzer_url,
            analyzer_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analyzer_url: None,
            analyzer_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}
