// Worker settings, read from the environment once at start-up
use arbiter_common::config::{env_or, env_parse, Settings};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub common: Settings,
    /// Number of submissions judged at the same time
    pub concurrency: usize,
    pub compile_timeout_ms: u64,
    /// Parent directory for per-submission workspaces; system temp when unset
    pub work_dir: Option<PathBuf>,
    pub languages_config: PathBuf,
}

impl WorkerSettings {
    pub fn from_env() -> Self {
        Self {
            common: Settings::from_env(),
            concurrency: env_parse("WORKER_CONCURRENCY", 4usize).max(1),
            compile_timeout_ms: env_parse("COMPILE_TIMEOUT_MS", 20_000u64),
            work_dir: std::env::var("WORK_DIR").ok().filter(|d| !d.trim().is_empty()).map(PathBuf::from),
            languages_config: PathBuf::from(env_or("LANGUAGES_CONFIG", "config/languages.json")),
        }
    }
}
