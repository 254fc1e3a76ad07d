use std::time::Duration;

use crate::bonus::SnapPolicy;

/// Default HTTP timeout (seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default booking horizon when the specialist has no schedule override.
const DEFAULT_HORIZON_MONTHS: u32 = 3;
/// How long a fetched bonus balance stays fresh (seconds).
const DEFAULT_BONUS_TTL_SECS: u64 = 300;
/// Step-transition animation window (milliseconds).
const DEFAULT_TRANSITION_MS: u64 = 250;

/// Client-side configuration for the booking core.
///
/// `transition_delay` is data for the frontend (wait this long before
/// mounting the next step's content); the library itself never sleeps.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the platform API, e.g. `https://api.veluna.ru/api`.
    pub api_base_url: String,
    /// Bearer token for authenticated calls, when the user has one.
    pub session_token: Option<String>,
    pub request_timeout: Duration,
    pub default_horizon_months: u32,
    pub bonus_cache_ttl: Duration,
    pub snap: SnapPolicy,
    pub transition_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".into(),
            session_token: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            default_horizon_months: DEFAULT_HORIZON_MONTHS,
            bonus_cache_ttl: Duration::from_secs(DEFAULT_BONUS_TTL_SECS),
            snap: SnapPolicy::default(),
            transition_delay: Duration::from_millis(DEFAULT_TRANSITION_MS),
        }
    }
}

impl ClientConfig {
    /// Build a config from environment variables, falling back to defaults
    /// for everything that is unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: std::env::var("VELUNA_API_URL")
                .unwrap_or(defaults.api_base_url),
            session_token: std::env::var("VELUNA_SESSION_TOKEN").ok(),
            request_timeout: env_secs("VELUNA_HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),
            default_horizon_months: env_parse("VELUNA_HORIZON_MONTHS", DEFAULT_HORIZON_MONTHS),
            bonus_cache_ttl: env_secs("VELUNA_BONUS_TTL_SECS", DEFAULT_BONUS_TTL_SECS),
            snap: SnapPolicy {
                step: env_parse("VELUNA_BONUS_SNAP_STEP", defaults.snap.step),
                threshold: env_parse("VELUNA_BONUS_SNAP_THRESHOLD", defaults.snap.threshold),
            },
            transition_delay: Duration::from_millis(env_parse(
                "VELUNA_TRANSITION_MS",
                DEFAULT_TRANSITION_MS,
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(env_parse(name, default))
}
