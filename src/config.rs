use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_DEPOSIT_WALLET_ADDRESS: &str = "bc1qcl84vkhs9aur0qcf02n8xfwk6pe95zrtq7f05w";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is not a valid number: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Settings shown to every user; loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSettings {
    pub deposit_wallet_address: String,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            deposit_wallet_address: DEFAULT_DEPOSIT_WALLET_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub max_connection_pooling: u32,
    pub port: u16,
    pub log_file: String,
    pub notification_capacity: usize,
    pub settings: SystemSettings,
}

impl AppConfig {
    /// Reads the process environment, with `.env` taking part through dotenv.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| dotenv::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // mandatory fields
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = lookup("JWT_SECRET").unwrap_or("your-jwt-secret".to_string());

        // optional fields
        let max_connection_pooling = parse_or(&lookup, "MAX_CONNECTION_POOLING", 5)?;
        let port = parse_or(&lookup, "PORT", 3000)?;
        let notification_capacity = parse_or(&lookup, "NOTIFICATION_CAPACITY", 256)?;
        let log_file = lookup("LOG_FILE").unwrap_or("app.log".to_string());
        let settings = SystemSettings {
            deposit_wallet_address: lookup("DEPOSIT_WALLET_ADDRESS")
                .unwrap_or(DEFAULT_DEPOSIT_WALLET_ADDRESS.to_string()),
        };

        Ok(Self {
            database_url,
            jwt_secret,
            max_connection_pooling,
            port,
            log_file,
            notification_capacity,
            settings,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
