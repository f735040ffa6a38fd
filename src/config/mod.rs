use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub reservation: ReservationConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub grpc_port: u16,
    pub rust_log: String,
    pub log_json: bool,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки жизненного цикла блокировок
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    /// Сколько живёт блокировка до того, как свипер вернёт место в продажу.
    pub lock_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
    /// Запретить коммит места, у которого уже нет блокировки.
    pub commit_requires_lock: bool,
}

impl ReservationConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            lock_ttl_seconds: 300,
            sweep_interval_seconds: 60,
            commit_requires_lock: false,
        }
    }
}

fn var_or(key: &'static str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let raw = var_or(key, default);
    raw.parse().map_err(|_| ConfigError::Invalid { key, value: raw })
}

// Нулевой период: tokio::time::interval паникует, свипер не запустится
fn parse_positive(key: &'static str, default: &str) -> Result<u64, ConfigError> {
    let value: u64 = parse_var(key, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid { key, value: value.to_string() });
    }
    Ok(value)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ReservationConfig::default();

        Ok(Config {
            app: AppConfig {
                host: var_or("HOST", "0.0.0.0"),
                port: parse_var("PORT", "3000")?,
                grpc_port: parse_var("GRPC_PORT", "50051")?,
                rust_log: var_or("RUST_LOG", "seat_inventory=debug,tower_http=debug"),
                log_json: var_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
                pool_size: parse_var("DB_POOL_SIZE", "10")?,
            },
            reservation: ReservationConfig {
                lock_ttl_seconds: parse_positive(
                    "LOCK_TTL_SECONDS",
                    &defaults.lock_ttl_seconds.to_string(),
                )?,
                sweep_interval_seconds: parse_positive(
                    "SWEEP_INTERVAL_SECONDS",
                    &defaults.sweep_interval_seconds.to_string(),
                )?,
                commit_requires_lock: parse_var("COMMIT_REQUIRES_LOCK", "false")?,
            },
        })
    }
}
