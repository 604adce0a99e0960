//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::address;
use crate::error::ConfigError;
use crate::list::DeliveryMode;

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpSecurity {
    /// Plain SMTP, for a local MTA.
    #[default]
    None,
    StartTls,
    /// Implicit TLS (SMTPS).
    Tls,
}

impl FromStr for SmtpSecurity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "plain" => Ok(Self::None),
            "starttls" => Ok(Self::StartTls),
            "tls" | "smtps" => Ok(Self::Tls),
            other => Err(format!("expected none, starttls or tls, got {other:?}")),
        }
    }
}

/// Outbound SMTP settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub timeout: Duration,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            security: SmtpSecurity::None,
            username: None,
            password: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the bot answers commands on; also the From of its replies.
    pub command_address: String,
    pub db_path: PathBuf,
    pub smtp: SmtpConfig,
    pub delivery_mode: DeliveryMode,
    /// Print messages instead of sending them.
    pub debug: bool,
}

impl Config {
    /// Build config from environment variables.
    ///
    /// `NANOLIST_COMMAND_ADDRESS` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key/value source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_command = get("NANOLIST_COMMAND_ADDRESS")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("NANOLIST_COMMAND_ADDRESS".into()))?;
        let command_address = address::normalize("NANOLIST_COMMAND_ADDRESS", &raw_command)
            .map_err(|e| invalid("NANOLIST_COMMAND_ADDRESS", e))?;

        let db_path = get("NANOLIST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/nanolist.db"));

        let defaults = SmtpConfig::default();
        let smtp = SmtpConfig {
            host: get("NANOLIST_SMTP_HOST").unwrap_or(defaults.host),
            port: parse_or(&get, "NANOLIST_SMTP_PORT", defaults.port)?,
            security: parse_or(&get, "NANOLIST_SMTP_SECURITY", defaults.security)?,
            username: get("NANOLIST_SMTP_USERNAME").filter(|s| !s.is_empty()),
            password: get("NANOLIST_SMTP_PASSWORD").map(SecretString::from),
            timeout: Duration::from_secs(parse_or(
                &get,
                "NANOLIST_SMTP_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )?),
        };

        let verp = parse_bool_or(&get, "NANOLIST_VERP", true)?;
        let debug = parse_bool_or(&get, "NANOLIST_DEBUG", false)?;

        Ok(Self {
            command_address,
            db_path,
            smtp,
            delivery_mode: if verp {
                DeliveryMode::Verp
            } else {
                DeliveryMode::Single
            },
            debug,
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(value) => value.trim().parse().map_err(|e| invalid(key, e)),
        None => Ok(default),
    }
}

fn parse_bool_or(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(key, format!("expected a boolean, got {v:?}"))),
        },
    }
}

fn invalid(key: &str, message: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
