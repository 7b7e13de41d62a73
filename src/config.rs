use std::{env, str::FromStr, time::Duration};
use thiserror::Error;

pub const DEV_FRONTEND_ORIGIN: &str = "http://localhost:5173";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Connection attempts made at startup before running degraded.
    pub db_connect_attempts: u32,
    pub db_connect_delay: Duration,
    pub db_max_connections: u32,
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let mut cors_origins = Vec::new();
        if let Some(origin) = lookup("FRONTEND_URL").filter(|s| !s.trim().is_empty()) {
            cors_origins.push(origin.trim().to_string());
        }
        if !cors_origins.iter().any(|o| o == DEV_FRONTEND_ORIGIN) {
            cors_origins.push(DEV_FRONTEND_ORIGIN.to_string());
        }

        Ok(Self {
            database_url,
            port: parse_or(&lookup, "PORT", 3001)?,
            db_connect_attempts: parse_or(&lookup, "DB_CONNECT_ATTEMPTS", 5u32)?.max(1),
            db_connect_delay: Duration::from_millis(parse_or(&lookup, "DB_CONNECT_DELAY_MS", 2000u64)?),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            cors_origins,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
