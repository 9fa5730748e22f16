use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Runtime tunables for the sync core.
///
/// Every value has a usable default so embedding the library requires no
/// environment at all; `from_env` exists for deployments that want to tune
/// reconciliation behavior without a rebuild.
#[derive(Debug, Clone)]
pub struct Config {
    /// How far back a provisional message is considered a candidate for
    /// remote-echo matching.
    pub echo_match_window: Duration,
    /// Debounce applied before recomputing a conversation's derived summary,
    /// so a provisional insert immediately followed by its confirmation
    /// costs one recompute, not two.
    pub index_debounce: Duration,
    /// Period of the summary refresh poll (the reconciling safety net).
    pub refresh_interval: Duration,
    /// Upper bound on message content length accepted by `send`.
    pub max_content_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            echo_match_window: Duration::from_secs(10),
            index_debounce: Duration::from_millis(25),
            refresh_interval: Duration::from_secs(60),
            max_content_len: 8 * 1024,
        }
    }
}

impl Config {
    fn env_u64(key: &str, default: u64) -> u64 {
        env::var(key)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    pub fn from_env() -> Self {
        dotenv().ok();
        let defaults = Self::default();

        Self {
            echo_match_window: Duration::from_millis(Self::env_u64(
                "ECHO_MATCH_WINDOW_MS",
                defaults.echo_match_window.as_millis() as u64,
            )),
            index_debounce: Duration::from_millis(Self::env_u64(
                "INDEX_DEBOUNCE_MS",
                defaults.index_debounce.as_millis() as u64,
            )),
            refresh_interval: Duration::from_secs(Self::env_u64(
                "REFRESH_INTERVAL_SECS",
                defaults.refresh_interval.as_secs(),
            )),
            max_content_len: Self::env_u64(
                "MAX_CONTENT_LEN",
                defaults.max_content_len as u64,
            ) as usize,
        }
    }
}
