use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub tracker_api_url: String,
    pub tracker_api_key: String,
    pub tracker_timezone: String,
    pub delta_mode: DeltaMode,
    pub delta_lookback_days: i64,
    pub exhausted_test_policy: ExhaustedTestPolicy,
}

/// Reference data used to find profit that arrived after a period closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaMode {
    /// Every report previously committed for the user.
    History,
    /// A fixed window before the period, against the local campaign mirror.
    Lookback,
}

/// What happens to a test whose balance is used up on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustedTestPolicy {
    Archive,
    Delete,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = required(&env_map, "DATABASE_PATH")?;
        let tracker_api_url = required(&env_map, "TRACKER_API_URL")?;
        let tracker_api_key = required(&env_map, "TRACKER_API_KEY")?;

        let tracker_timezone = env_map
            .get("TRACKER_TIMEZONE")
            .cloned()
            .unwrap_or_else(|| "+3:00".to_string());

        let delta_mode = match env_map
            .get("DELTA_MODE")
            .map(|s| s.as_str())
            .unwrap_or("history")
        {
            "history" => DeltaMode::History,
            "lookback" => DeltaMode::Lookback,
            other => {
                return Err(ConfigError::InvalidValue(
                    "DELTA_MODE".to_string(),
                    format!("must be history or lookback, got {}", other),
                ))
            }
        };

        let delta_lookback_days = env_map
            .get("DELTA_LOOKBACK_DAYS")
            .map(|s| s.as_str())
            .unwrap_or("14")
            .parse::<i64>()
            .ok()
            .filter(|days| *days > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "DELTA_LOOKBACK_DAYS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let exhausted_test_policy = match env_map
            .get("EXHAUSTED_TEST_POLICY")
            .map(|s| s.as_str())
            .unwrap_or("archive")
        {
            "archive" => ExhaustedTestPolicy::Archive,
            "delete" => ExhaustedTestPolicy::Delete,
            other => {
                return Err(ConfigError::InvalidValue(
                    "EXHAUSTED_TEST_POLICY".to_string(),
                    format!("must be archive or delete, got {}", other),
                ))
            }
        };

        Ok(Config {
            port,
            database_path,
            tracker_api_url,
            tracker_api_key,
            tracker_timezone,
            delta_mode,
            delta_lookback_days,
            exhausted_test_policy,
        })
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}
