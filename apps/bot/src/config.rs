use std::env::var;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    /// Cadence of the periodic digest refresh.
    pub refresh_interval: Duration,
    /// Upper bound on one subscriber's refresh cycle.
    pub cycle_timeout: Duration,
    pub version: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            discord_token: var("DISCORD_TOKEN").expect("DISCORD_TOKEN not set"),
            refresh_interval: duration_var("REFRESH_INTERVAL_SECS", 300),
            cycle_timeout: duration_var("CYCLE_TIMEOUT_SECS", 30),
            version: var("APP_VERSION").unwrap_or_else(|_| "Unknown".to_string()),
        }
    }
}

fn duration_var(name: &str, default_secs: u64) -> Duration {
    let secs = var(name)
        .ok()
        .map(|raw| {
            raw.parse::<u64>()
                .unwrap_or_else(|_| panic!("{name} must be an integer number of seconds"))
        })
        .unwrap_or(default_secs);
    assert!(secs > 0, "{name} must be positive");
    Duration::from_secs(secs)
}
