//! Server configuration read from the environment

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_JWT_SECRET: &str = "dev-jwt-secret-change-me";
const DEFAULT_DATA_DIR: &str = ".ledger-data";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8081";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid LEDGER_BIND_ADDR '{0}': {1}")]
    InvalidBindAddr(String, std::net::AddrParseError),
    #[error("LEDGER_JWT_SECRET cannot be empty")]
    EmptyJwtSecret,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Users allowed to read platform-wide statistics.
    pub superuser_ids: HashSet<String>,
    /// Enables the unauthenticated token minting route for local development.
    pub allow_dev_tokens: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("LEDGER_DATA_DIR")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

        let raw_addr = lookup("LEDGER_BIND_ADDR")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::InvalidBindAddr(raw_addr.clone(), err))?;

        let jwt_secret = match lookup("LEDGER_JWT_SECRET") {
            Some(secret) if secret.trim().is_empty() => return Err(ConfigError::EmptyJwtSecret),
            Some(secret) => secret,
            None => DEFAULT_JWT_SECRET.to_string(),
        };

        let superuser_ids = lookup("LEDGER_SUPERUSER_IDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            bind_addr,
            jwt_secret,
            superuser_ids,
            allow_dev_tokens: env_flag(lookup("LEDGER_ALLOW_DEV_TOKENS"), false),
        })
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }

    pub fn is_superuser(&self, user_id: &str) -> bool {
        self.superuser_ids.contains(user_id)
    }

    /// Config for tests: data under `data_dir`, dev tokens enabled.
    #[cfg(test)]
    pub fn for_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: "test-secret".to_string(),
            superuser_ids: HashSet::from(["root".to_string()]),
            allow_dev_tokens: true,
        }
    }
}

fn env_flag(raw: Option<String>, default: bool) -> bool {
    match raw {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        None => default,
    }
}
