// src/config.rs

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use url::Url;

use crate::error::AppError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

/// Default exam length when no snapshot restores a remaining time.
pub const DEFAULT_EXAM_DURATION_SECS: u64 = 60 * 60;

/// Tab switches tolerated before the attempt is force-submitted.
pub const DEFAULT_MAX_TAB_SWITCHES: u32 = 2;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: Url,
    pub rust_log: String,
    pub log_dir: PathBuf,
    pub exam_duration_secs: u64,
    pub max_tab_switches: u32,
    /// How often the recorder emits an evidence chunk.
    pub recorder_timeslice: Duration,
    /// Time the recorder gets to flush its final chunk after `stop()`.
    pub submit_settle: Duration,
    pub request_timeout: Duration,
    pub snapshot_dir: PathBuf,
    /// Candidate credentials for the preflight login.
    pub candidate_email: Option<String>,
    pub candidate_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: Url::parse(DEFAULT_API_BASE_URL).expect("default base url is valid"),
            rust_log: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            exam_duration_secs: DEFAULT_EXAM_DURATION_SECS,
            max_tab_switches: DEFAULT_MAX_TAB_SWITCHES,
            recorder_timeslice: Duration::from_millis(1000),
            submit_settle: Duration::from_millis(1500),
            request_timeout: Duration::from_secs(30),
            snapshot_dir: PathBuf::from(".exam-session"),
            candidate_email: None,
            candidate_password: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let defaults = Self::default();

        let api_base_url = match env::var("API_BASE_URL") {
            Ok(raw) => Url::parse(&raw)?,
            Err(_) => defaults.api_base_url,
        };

        let rust_log = env::var("RUST_LOG").unwrap_or(defaults.rust_log);

        let log_dir = env::var("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.log_dir);

        let snapshot_dir = env::var("SNAPSHOT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.snapshot_dir);

        Ok(Self {
            api_base_url,
            rust_log,
            log_dir,
            exam_duration_secs: parse_var("EXAM_DURATION_SECS", defaults.exam_duration_secs)?,
            max_tab_switches: parse_var("MAX_TAB_SWITCHES", defaults.max_tab_switches)?,
            recorder_timeslice: Duration::from_millis(parse_var(
                "RECORDER_TIMESLICE_MS",
                1000,
            )?),
            submit_settle: Duration::from_millis(parse_var("SUBMIT_SETTLE_MS", 1500)?),
            request_timeout: Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 30)?),
            snapshot_dir,
            candidate_email: env::var("EXAM_EMAIL").ok(),
            candidate_password: env::var("EXAM_PASSWORD").ok(),
        })
    }
}

/// Reads an optional numeric variable, falling back to `default` when unset.
fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} must be a number, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_exam_policy() {
        let config = Config::default();
        assert_eq!(config.exam_duration_secs, 3600);
        assert_eq!(config.max_tab_switches, 2);
        assert_eq!(config.submit_settle, Duration::from_millis(1500));
        assert_eq!(config.api_base_url.as_str(), "http://localhost:8080/");
        assert!(config.candidate_email.is_none());
    }

    #[test]
    fn unset_variable_uses_default() {
        let value: u64 = parse_var("EXAM_CLIENT_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
