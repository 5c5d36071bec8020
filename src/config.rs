use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub session_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
    pub verification_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// HTTP mail API endpoint. Mails are only logged when unset.
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Postgres URL. The in-memory store is used when unset.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub app_base_url: String,
    pub store_timeout_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: env_or("JWT_ISSUER", "timekeep"),
            audience: env_or("JWT_AUDIENCE", "timekeep-users"),
            session_ttl_minutes: env_parse("SESSION_TTL_MINUTES", 60 * 24 * 30),
            reset_ttl_minutes: env_parse("RESET_TTL_MINUTES", 60),
            verification_ttl_minutes: env_parse("VERIFICATION_TTL_MINUTES", 60 * 24),
        };
        let mail = MailConfig {
            api_url: std::env::var("MAIL_API_URL").ok(),
            api_key: std::env::var("MAIL_API_KEY").ok(),
            from: env_or("MAIL_FROM", "Timekeep <no-reply@timekeep.local>"),
            timeout_secs: env_parse("MAIL_TIMEOUT_SECS", 10),
        };
        Ok(Self {
            database_url,
            jwt,
            mail,
            app_base_url: env_or("APP_BASE_URL", "http://localhost:3000"),
            store_timeout_secs: env_parse("STORE_TIMEOUT_SECS", 5),
        })
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn missing_secret_is_named_in_the_error() {
        std::env::remove_var("JWT_SECRET");
        let err = AppConfig::from_env().unwrap_err();
        assert!(format!("{err:#}").contains("JWT_SECRET must be set"));
    }
}
