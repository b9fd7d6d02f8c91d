use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

use std::str::FromStr;

/// Half-width of the grid's expansion margin (0.01° at 111 km per degree).
/// A starting radius at or under it makes every fix regenerate the grid.
pub const MIN_INITIAL_RADIUS_KM: f64 = 1.11;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let backend_url = require("CAPTUR_BACKEND_URL")?;
    let anon_key = require("CAPTUR_ANON_KEY")?;
    let access_token = lookup("CAPTUR_ACCESS_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty());

    let env = parse_environment(&or_default("CAPTUR_ENV", "development"))?;
    let log_level = or_default("CAPTUR_LOG_LEVEL", "info");
    let store_dir = PathBuf::from(or_default("CAPTUR_STORE_DIR", "./.captur-store"));

    let request_timeout_secs = parse_as::<u64>(
        "CAPTUR_REQUEST_TIMEOUT_SECS",
        &or_default("CAPTUR_REQUEST_TIMEOUT_SECS", "15"),
    )?;
    let max_retries = parse_as::<u32>(
        "CAPTUR_MAX_RETRIES",
        &or_default("CAPTUR_MAX_RETRIES", "2"),
    )?;
    let retry_backoff_base_ms = parse_as::<u64>(
        "CAPTUR_RETRY_BACKOFF_BASE_MS",
        &or_default("CAPTUR_RETRY_BACKOFF_BASE_MS", "500"),
    )?;
    let history_limit = parse_as::<usize>(
        "CAPTUR_HISTORY_LIMIT",
        &or_default("CAPTUR_HISTORY_LIMIT", "500"),
    )?;
    let sync_interval_secs = parse_as::<u64>(
        "CAPTUR_SYNC_INTERVAL_SECS",
        &or_default("CAPTUR_SYNC_INTERVAL_SECS", "60"),
    )?;
    if sync_interval_secs == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "CAPTUR_SYNC_INTERVAL_SECS".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    let initial_radius_km = parse_as::<f64>(
        "CAPTUR_INITIAL_RADIUS_KM",
        &or_default("CAPTUR_INITIAL_RADIUS_KM", "10"),
    )?;
    if !initial_radius_km.is_finite() || initial_radius_km <= MIN_INITIAL_RADIUS_KM {
        return Err(ConfigError::InvalidEnvVar {
            var: "CAPTUR_INITIAL_RADIUS_KM".to_string(),
            reason: format!(
                "must be greater than {MIN_INITIAL_RADIUS_KM} km, got {initial_radius_km}"
            ),
        });
    }

    let reset_visited_on_expansion = parse_as::<bool>(
        "CAPTUR_RESET_VISITED_ON_EXPANSION",
        &or_default("CAPTUR_RESET_VISITED_ON_EXPANSION", "false"),
    )?;

    Ok(AppConfig {
        backend_url,
        anon_key,
        access_token,
        env,
        log_level,
        store_dir,
        request_timeout_secs,
        max_retries,
        retry_backoff_base_ms,
        history_limit,
        sync_interval_secs,
        initial_radius_km,
        reset_visited_on_expansion,
    })
}

fn parse_as<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "CAPTUR_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
