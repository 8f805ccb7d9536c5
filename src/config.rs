use crate::domain::UserId;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub payment_api_url: String,
    pub payment_secret_key: String,
    pub payment_webhook_secret: String,
    /// Base for checkout success/cancel redirects.
    pub public_base_url: String,
    pub webhook_tolerance_secs: i64,
    pub checkout_ttl_ms: i64,
    /// Upper bound on retrying a failed settlement write.
    pub settlement_retry_ms: u64,
    /// Stand-in owner when a paid checkout references a user that no longer exists.
    pub placeholder_user_id: UserId,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parsed<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), format!("must be {}", expected)))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parsed::<u16>(&env_map, "PORT", "8080", "a valid u16")?;
        let database_path = required(&env_map, "DATABASE_PATH")?;

        let payment_api_url = env_map
            .get("PAYMENT_API_URL")
            .cloned()
            .unwrap_or_else(|| "https://api.stripe.com".to_string());
        let payment_secret_key = required(&env_map, "PAYMENT_SECRET_KEY")?;
        let payment_webhook_secret = required(&env_map, "PAYMENT_WEBHOOK_SECRET")?;

        let public_base_url = required(&env_map, "PUBLIC_BASE_URL")?;
        if !public_base_url.starts_with("http://") && !public_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "PUBLIC_BASE_URL".to_string(),
                "must start with http:// or https://".to_string(),
            ));
        }
        let public_base_url = public_base_url.trim_end_matches('/').to_string();

        let webhook_tolerance_secs = parsed::<i64>(
            &env_map,
            "WEBHOOK_TOLERANCE_SECS",
            "300",
            "a non-negative i64",
        )?;
        if webhook_tolerance_secs < 0 {
            return Err(ConfigError::InvalidValue(
                "WEBHOOK_TOLERANCE_SECS".to_string(),
                "must be a non-negative i64".to_string(),
            ));
        }

        let checkout_ttl_ms =
            parsed::<i64>(&env_map, "CHECKOUT_TTL_MS", "86400000", "a positive i64")?;
        if checkout_ttl_ms <= 0 {
            return Err(ConfigError::InvalidValue(
                "CHECKOUT_TTL_MS".to_string(),
                "must be a positive i64".to_string(),
            ));
        }

        let settlement_retry_ms =
            parsed::<u64>(&env_map, "SETTLEMENT_RETRY_MS", "30000", "a valid u64")?;

        let placeholder_user_id = env_map
            .get("PLACEHOLDER_USER_ID")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or("unassigned");

        let sweep_interval_secs =
            parsed::<u64>(&env_map, "SWEEP_INTERVAL_SECS", "300", "a positive u64")?;
        if sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "SWEEP_INTERVAL_SECS".to_string(),
                "must be a positive u64".to_string(),
            ));
        }

        Ok(Config {
            port,
            database_path,
            payment_api_url,
            payment_secret_key,
            payment_webhook_secret,
            public_base_url,
            webhook_tolerance_secs,
            checkout_ttl_ms,
            settlement_retry_ms,
            placeholder_user_id: UserId::new(placeholder_user_id),
            sweep_interval_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_env() -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("DATABASE_PATH".to_string(), "/tmp/raffles.db".to_string());
        env.insert("PAYMENT_SECRET_KEY".to_string(), "sk_test_123".to_string());
        env.insert("PAYMENT_WEBHOOK_SECRET".to_string(), "whsec_123".to_string());
        env.insert(
            "PUBLIC_BASE_URL".to_string(),
            "https://rifas.example/".to_string(),
        );
        env
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(base_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.payment_api_url, "https://api.stripe.com");
        assert_eq!(config.public_base_url, "https://rifas.example");
        assert_eq!(config.webhook_tolerance_secs, 300);
        assert_eq!(config.checkout_ttl_ms, 86_400_000);
        assert_eq!(config.settlement_retry_ms, 30_000);
        assert_eq!(config.placeholder_user_id.as_str(), "unassigned");
        assert_eq!(config.sweep_interval_secs, 300);
    }

    #[test]
    fn test_missing_required() {
        for key in [
            "DATABASE_PATH",
            "PAYMENT_SECRET_KEY",
            "PAYMENT_WEBHOOK_SECRET",
            "PUBLIC_BASE_URL",
        ] {
            let mut env = base_env();
            env.remove(key);
            match Config::from_env_map(env) {
                Err(ConfigError::MissingEnv(k)) => assert_eq!(k, key),
                other => panic!("expected MissingEnv({}), got {:?}", key, other),
            }
        }
    }

    #[test]
    fn test_invalid_values() {
        let mut env = base_env();
        env.insert("PORT".to_string(), "eighty".to_string());
        assert!(matches!(
            Config::from_env_map(env),
            Err(ConfigError::InvalidValue(k, _)) if k == "PORT"
        ));

        let mut env = base_env();
        env.insert("CHECKOUT_TTL_MS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_env_map(env),
            Err(ConfigError::InvalidValue(k, _)) if k == "CHECKOUT_TTL_MS"
        ));

        let mut env = base_env();
        env.insert("PUBLIC_BASE_URL".to_string(), "rifas.example".to_string());
        assert!(matches!(
            Config::from_env_map(env),
            Err(ConfigError::InvalidValue(k, _)) if k == "PUBLIC_BASE_URL"
        ));

        let mut env = base_env();
        env.insert("SWEEP_INTERVAL_SECS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_env_map(env),
            Err(ConfigError::InvalidValue(k, _)) if k == "SWEEP_INTERVAL_SECS"
        ));
    }

    #[test]
    fn test_overrides() {
        let mut env = base_env();
        env.insert("PORT".to_string(), "3000".to_string());
        env.insert("PLACEHOLDER_USER_ID".to_string(), "soporte".to_string());
        env.insert("WEBHOOK_TOLERANCE_SECS".to_string(), "60".to_string());
        let config = Config::from_env_map(env).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.placeholder_user_id.as_str(), "soporte");
        assert_eq!(config.webhook_tolerance_secs, 60);
    }
}
