//! Environment-driven configuration.

use crate::error::ConfigError;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use travelmate_probe::RetryPolicy;

const DEFAULT_REDIS_URL: &str = "redis://redis:6379/0";
const DEFAULT_SERVER_COMMAND: &str = "gunicorn config.wsgi --bind {host}:{port} --chdir=/app";

/// Everything the startup sequence needs to know.
#[derive(Debug, Clone)]
pub struct BootConfig {
    pub database_url: String,
    pub redis_url: String,
    /// Host of the mail-capture sidecar; `None` means its service name.
    pub mail_capture_host: Option<String>,
    pub mail_capture_smtp_port: u16,
    pub mail_capture_ui_port: u16,
    /// Services whose unavailability is logged but does not block startup.
    pub optional_services: Vec<String>,

    pub compose_file: Option<PathBuf>,
    pub target_service: String,
    pub profiles: Vec<String>,

    pub host: String,
    pub port: u16,
    pub python: String,
    pub manage_py: String,
    pub schema_file: String,
    /// When set, SQL migrations in this directory replace `manage.py migrate`.
    pub migrations_dir: Option<PathBuf>,
    pub server_command: String,
    pub step_timeout: Duration,

    pub retry: RetryPolicy,
    pub env_files: Vec<PathBuf>,
}

impl BootConfig {
    /// Load env files named by `BOOT_ENV_FILES`, then read the process environment.
    ///
    /// Variables already present in the environment take precedence over
    /// values from env files.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_files = list(std::env::var("BOOT_ENV_FILES").ok().as_deref())
            .into_iter()
            .map(PathBuf::from)
            .collect::<Vec<_>>();
        for path in &env_files {
            load_env_file(path)?;
        }

        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.env_files = env_files;
        Ok(config)
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_or(&get, "BOOT_PROBE_MAX_ATTEMPTS", defaults.max_attempts)?,
            initial_backoff: Duration::from_millis(parse_or(
                &get,
                "BOOT_PROBE_INITIAL_BACKOFF_MS",
                defaults.initial_backoff.as_millis() as u64,
            )?),
            max_backoff: Duration::from_millis(parse_or(
                &get,
                "BOOT_PROBE_MAX_BACKOFF_MS",
                defaults.max_backoff.as_millis() as u64,
            )?),
            multiplier: defaults.multiplier,
            attempt_timeout: Duration::from_millis(parse_or(
                &get,
                "BOOT_PROBE_TIMEOUT_MS",
                defaults.attempt_timeout.as_millis() as u64,
            )?),
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BOOT_PROBE_MAX_ATTEMPTS".to_string(),
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }

        Ok(Self {
            database_url,
            redis_url: get("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            mail_capture_host: get("MAIL_CAPTURE_HOST"),
            mail_capture_smtp_port: parse_or(&get, "MAIL_CAPTURE_SMTP_PORT", 1025)?,
            mail_capture_ui_port: parse_or(&get, "MAIL_CAPTURE_UI_PORT", 8025)?,
            optional_services: list(get("BOOT_OPTIONAL_SERVICES").as_deref()),
            compose_file: get("BOOT_COMPOSE_FILE").map(PathBuf::from),
            target_service: get("BOOT_TARGET_SERVICE").unwrap_or_else(|| "django".to_string()),
            profiles: list(get("BOOT_PROFILES").as_deref()),
            host: get("BOOT_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "BOOT_PORT", 8000)?,
            python: get("BOOT_PYTHON").unwrap_or_else(|| "python".to_string()),
            manage_py: get("BOOT_MANAGE_PY").unwrap_or_else(|| "manage.py".to_string()),
            schema_file: get("BOOT_SCHEMA_FILE").unwrap_or_else(|| "schema.yml".to_string()),
            migrations_dir: get("BOOT_MIGRATIONS_DIR").map(PathBuf::from),
            server_command: get("BOOT_SERVER_COMMAND")
                .unwrap_or_else(|| DEFAULT_SERVER_COMMAND.to_string()),
            step_timeout: Duration::from_secs(parse_or(&get, "BOOT_STEP_TIMEOUT_SECS", 600)?),
            retry,
            env_files: Vec::new(),
        })
    }

    pub fn is_optional(&self, service: &str) -> bool {
        self.optional_services.iter().any(|s| s == service)
    }
}

fn load_env_file(path: &Path) -> Result<(), ConfigError> {
    dotenvy::from_path(path).map_err(|source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Loaded env file");
    Ok(())
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Split a comma-separated list, dropping blanks.
fn list(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
