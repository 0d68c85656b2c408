//! Process configuration read from the environment (a `.env` file is loaded
//! by the binary before this runs).

use chrono::Duration;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;
use voxen_chain::Network;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailerKind {
    Ses,
    Log,
}

#[derive(Debug, Clone)]
pub struct TwitterConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub network: Network,
    pub cors_origin: Option<String>,
    pub social_cooldown: Duration,
    pub otp_ttl: Duration,
    pub otp_resend_cooldown: Duration,
    pub nonce_ttl: Duration,
    pub mailer: MailerKind,
    pub mail_from: String,
    pub app_url: String,
    pub twitter: Option<TwitterConfig>,
}

fn var(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn duration(name: &'static str, value: Option<Duration>) -> Result<Duration, ConfigError> {
    match value {
        Some(d) if d >= Duration::zero() => Ok(d),
        Some(_) => Err(ConfigError::Invalid { name, reason: "must not be negative".to_string() }),
        None => Err(ConfigError::Invalid { name, reason: "out of range".to_string() }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                reason: "must be at least 32 characters".to_string(),
            });
        }

        let bind: SocketAddr = parsed("VOXEN_BIND", SocketAddr::from(([0, 0, 0, 0], 8080)))?;
        let db_path = PathBuf::from(var("VOXEN_DB_PATH").unwrap_or_else(|| "./data".to_string()));
        let jwt_ttl_hours: i64 = parsed("JWT_TTL_HOURS", 24 * 7)?;
        let network: Network = parsed("VOXEN_CHAIN", Network::BaseSepolia)?;
        let cooldown_days: i64 = parsed("SOCIAL_RECONNECT_COOLDOWN_DAYS", 7)?;
        let jwt_ttl = duration("JWT_TTL_HOURS", Duration::try_hours(jwt_ttl_hours))?;
        let social_cooldown = duration("SOCIAL_RECONNECT_COOLDOWN_DAYS", Duration::try_days(cooldown_days))?;

        let mailer = match var("MAILER").as_deref() {
            None | Some("log") => MailerKind::Log,
            Some("ses") => MailerKind::Ses,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "MAILER",
                    reason: format!("expected `ses` or `log`, got `{}`", other),
                })
            }
        };

        let twitter = match (var("TWITTER_CLIENT_ID"), var("TWITTER_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(TwitterConfig {
                client_id,
                client_secret,
                redirect_uri: var("TWITTER_REDIRECT_URI")
                    .ok_or(ConfigError::Missing("TWITTER_REDIRECT_URI"))?,
                authorize_url: "https://twitter.com/i/oauth2/authorize".to_string(),
                token_url: "https://api.twitter.com/2/oauth2/token".to_string(),
                api_url: "https://api.twitter.com/2".to_string(),
            }),
            _ => None,
        };

        Ok(Self {
            bind,
            db_path,
            jwt_secret,
            jwt_ttl,
            network,
            cors_origin: var("CORS_ORIGIN"),
            social_cooldown,
            otp_ttl: Duration::minutes(10),
            otp_resend_cooldown: Duration::seconds(60),
            nonce_ttl: Duration::minutes(10),
            mailer,
            mail_from: var("MAIL_FROM").unwrap_or_else(|| "no-reply@voxen.app".to_string()),
            app_url: var("APP_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            twitter,
        })
    }
}
