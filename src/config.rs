// src/config.rs

use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

use crate::services::scoring::MarkingScheme;

/// Seconds between autosaves while a session is active.
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;

/// Number of items returned by recent-activity and upcoming-tests when no limit is given.
pub const DEFAULT_ANALYTICS_LIMIT: usize = 3;

/// Hard ceiling for client supplied analytics limits.
pub const MAX_ANALYTICS_LIMIT: usize = 50;

/// What `start` does when the user already has an active attempt for the same test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttemptPolicy {
    /// Hand back the existing active attempt.
    #[default]
    Resume,
    /// Refuse with `InvalidState`.
    Reject,
    /// Open another parallel attempt.
    Allow,
}

impl FromStr for AttemptPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resume" => Ok(AttemptPolicy::Resume),
            "reject" => Ok(AttemptPolicy::Reject),
            "allow" => Ok(AttemptPolicy::Allow),
            other => Err(format!("unknown attempt policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: String,
    pub marking: MarkingScheme,
    pub attempt_policy: AttemptPolicy,
    pub autosave_interval: Duration,
    pub seed_demo_data: bool,
}

/// A required variable is missing or a set one does not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: String,
    pub reason: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid configuration {}: {}", self.key, self.reason)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Reads the environment (and `.env`). Runs before logging is set up, so
    /// bad values are returned, not logged.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError {
                key: "JWT_SECRET".to_string(),
                reason: "must be set".to_string(),
            })?;

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let marking = MarkingScheme {
            correct_points: from_env_or("MARKING_CORRECT", 1)?,
            incorrect_points: from_env_or("MARKING_INCORRECT", 0)?,
        };

        let autosave_secs = from_env_or("AUTOSAVE_INTERVAL_SECS", DEFAULT_AUTOSAVE_INTERVAL_SECS)?;
        if autosave_secs == 0 {
            return Err(ConfigError {
                key: "AUTOSAVE_INTERVAL_SECS".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            marking,
            attempt_policy: from_env_or("ATTEMPT_POLICY", AttemptPolicy::default())?,
            autosave_interval: Duration::from_secs(autosave_secs),
            seed_demo_data: from_env_or("SEED_DEMO_DATA", false)?,
        })
    }
}

fn from_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, env::var(key).ok().as_deref(), default)
}

/// Unset or blank means `default`; anything else must parse.
fn parse_value<T>(key: &str, raw: Option<&str>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError {
            key: key.to_string(),
            reason: format!("'{}': {}", v, e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_policy_parsing() {
        assert_eq!("resume".parse::<AttemptPolicy>(), Ok(AttemptPolicy::Resume));
        assert_eq!(" REJECT ".parse::<AttemptPolicy>(), Ok(AttemptPolicy::Reject));
        assert_eq!("allow".parse::<AttemptPolicy>(), Ok(AttemptPolicy::Allow));
        assert!("queue".parse::<AttemptPolicy>().is_err());
    }

    #[test]
    fn test_parse_value_defaults_and_errors() {
        assert_eq!(parse_value("MARKING_CORRECT", None, 1), Ok(1));
        assert_eq!(parse_value("MARKING_CORRECT", Some("  "), 1), Ok(1));
        assert_eq!(parse_value("MARKING_INCORRECT", Some(" -1 "), 0), Ok(-1));
        assert_eq!(
            parse_value("ATTEMPT_POLICY", Some("reject"), AttemptPolicy::Resume),
            Ok(AttemptPolicy::Reject)
        );

        let err = parse_value("MARKING_CORRECT", Some("four"), 1).unwrap_err();
        assert_eq!(err.key, "MARKING_CORRECT");
        assert!(err.to_string().contains("four"));

        let err = parse_value("ATTEMPT_POLICY", Some("queue"), AttemptPolicy::Resume).unwrap_err();
        assert_eq!(err.key, "ATTEMPT_POLICY");

        assert!(parse_value("SEED_DEMO_DATA", Some("yes"), false).is_err());
    }
}
