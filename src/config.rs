//! Typed, validated startup configuration for the three services and the
//! client SDK. A missing required variable or a value that fails to parse
//! is a fatal startup error, not a silently-applied default.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("environment variable {name} has an invalid value {value:?}: {source}")]
    Invalid { name: &'static str, value: String, source: Box<dyn std::error::Error + Send + Sync> },
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => value
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid { name, value, source: Box::new(e) }),
    }
}

fn bind_addr(default_port: u16) -> Result<SocketAddr, ConfigError> {
    parsed("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], default_port)))
}

const DISPATCHER_DEFAULT_PORT: u16 = 8000;
const SCHEDULER_DEFAULT_PORT: u16 = 8001;
const RUNNER_DEFAULT_PORT: u16 = 8002;

/// Loads a dotenv file if present; absence is not an error, since production
/// deployments set the environment directly.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub database_url: String,
    pub scheduler_url: String,
    pub bind_addr: SocketAddr,
}

impl DispatcherConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URI")?,
            scheduler_url: required("SCHEDULER_URL")?,
            bind_addr: bind_addr(DISPATCHER_DEFAULT_PORT)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub database_url: String,
    pub runner_url: String,
    pub dispatcher_url: String,
    pub bind_addr: SocketAddr,
    pub bucket_size: usize,
    pub requests_per_minute: f64,
    pub min_games_per_version: i64,
    pub max_bots_to_schedule: i64,
    pub max_games_to_schedule: i64,
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URI")?,
            runner_url: required("RUNNER_URL")?,
            dispatcher_url: required("DISPATCHER_URL")?,
            bind_addr: bind_addr(SCHEDULER_DEFAULT_PORT)?,
            bucket_size: parsed("BUCKET_SIZE", 10)?,
            requests_per_minute: parsed("REQUESTS_PER_MINUTE", 60.0)?,
            min_games_per_version: parsed(
                "MIN_GAMES_PER_VERSION",
                crate::matchmaker::MIN_GAMES_PER_VERSION,
            )?,
            max_bots_to_schedule: parsed(
                "MAX_BOTS_TO_SCHEDULE",
                crate::matchmaker::MAX_BOTS_TO_SCHEDULE,
            )?,
            max_games_to_schedule: parsed(
                "MAX_GAMES_TO_SCHEDULE",
                crate::matchmaker::MAX_GAMES_TO_SCHEDULE,
            )?,
        })
    }

    pub fn callback_url(&self) -> String {
        format!("{}/game_result", self.dispatcher_url)
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub bind_addr: SocketAddr,
    pub bot_host_path: std::path::PathBuf,
    pub init_timeout: Duration,
    pub move_timeout: Duration,
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: bind_addr(RUNNER_DEFAULT_PORT)?,
            bot_host_path: parsed::<String>("BOT_HOST_PATH", "./bot-host".to_string())?.into(),
            init_timeout: Duration::from_millis(parsed("INIT_TIMEOUT_MS", 200)?),
            move_timeout: Duration::from_millis(parsed("MOVE_TIMEOUT_MS", 100)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_required_variable_is_reported_by_name() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("DATABASE_URI");
        env::remove_var("SCHEDULER_URL");
        let err = DispatcherConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URI")));
    }

    #[test]
    fn malformed_numeric_value_is_a_fatal_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("DATABASE_URI", "sqlite::memory:");
        env::set_var("RUNNER_URL", "http://runner");
        env::set_var("DISPATCHER_URL", "http://dispatcher");
        env::set_var("BUCKET_SIZE", "not-a-number");
        let err = SchedulerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BUCKET_SIZE", .. }));
        env::remove_var("DATABASE_URI");
        env::remove_var("RUNNER_URL");
        env::remove_var("DISPATCHER_URL");
        env::remove_var("BUCKET_SIZE");
    }
}
