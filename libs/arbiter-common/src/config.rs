// Settings shared by every arbiter binary, read from the environment once at start-up

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Settings {
    pub redis_url: String,
    pub fixture_root: PathBuf,
    pub max_queue_depth: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            fixture_root: PathBuf::from(env_or("FIXTURE_ROOT", "data/fixtures")),
            max_queue_depth: env_parse("MAX_QUEUE_DEPTH", 1000),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            fixture_root: PathBuf::from("data/fixtures"),
            max_queue_depth: 1000,
        }
    }
}

pub fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset or malformed
pub fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(variable = name, value = %raw, "Ignoring malformed setting");
                default
            }
        },
        Err(_) => default,
    }
}
