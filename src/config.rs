use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

use crate::disclosure::DisclosureMode;
use crate::errors::TranslatorPolicy;
use crate::guardian::GuardianConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub errors: ErrorConfig,
    pub shutdown_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ErrorConfig {
    pub mode: DisclosureMode,
    pub duplicate_key_status: u16,
    pub cast_status: u16,
    pub show_error_notify: bool,
    pub show_error_console: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let environment = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let mode = environment
            .parse::<DisclosureMode>()
            .map_err(anyhow::Error::msg)
            .context("APP_ENV must be one of development, production, test")?;

        Ok(Config {
            server: ServerConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("API_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .context("API_PORT must be a valid port number")?,
            },
            errors: ErrorConfig {
                mode,
                duplicate_key_status: conflict_status("DUPLICATE_KEY_STATUS")?,
                cast_status: conflict_status("CAST_ERROR_STATUS")?,
                show_error_notify: flag("SHOW_ERROR_NOTIFY")?,
                show_error_console: flag("SHOW_ERROR_CONSOLE")?,
            },
            shutdown_timeout_seconds: env::var("SHUTDOWN_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("SHUTDOWN_TIMEOUT_SECONDS must be a valid number")?,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn translator_policy(&self) -> TranslatorPolicy {
        TranslatorPolicy {
            duplicate_key_status: self.errors.duplicate_key_status,
            cast_status: self.errors.cast_status,
        }
    }

    pub fn guardian(&self) -> GuardianConfig {
        GuardianConfig {
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_seconds),
        }
    }
}

/// Status for an upstream category whose code is a deployment choice
fn conflict_status(name: &str) -> Result<u16> {
    let status: u16 = env::var(name)
        .unwrap_or_else(|_| "400".to_string())
        .parse()
        .with_context(|| format!("{} must be a valid number", name))?;
    if status != 400 && status != 409 {
        bail!("{} must be 400 or 409, got {}", name, status);
    }
    Ok(status)
}

fn flag(name: &str) -> Result<bool> {
    env::var(name)
        .unwrap_or_else(|_| "false".to_string())
        .parse()
        .with_context(|| format!("{} must be true or false", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            errors: ErrorConfig {
                mode: DisclosureMode::Production,
                duplicate_key_status: 409,
                cast_status: 400,
                show_error_notify: false,
                show_error_console: false,
            },
            shutdown_timeout_seconds: 5,
        }
    }

    #[test]
    fn test_server_address() {
        assert_eq!(config().server_address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_translator_policy() {
        let policy = config().translator_policy();
        assert_eq!(policy.duplicate_key_status, 409);
        assert_eq!(policy.cast_status, 400);
    }

    #[test]
    fn test_guardian_config() {
        assert_eq!(config().guardian().shutdown_timeout, Duration::from_secs(5));
    }
}
