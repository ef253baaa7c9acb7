use thiserror::Error;
use url::Url;

use super::config_model::{App, BackendServer, Database, DotEnvyConfig, Stripe, Supabase};

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_BODY_LIMIT_MIB: u64 = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

pub fn load() -> Result<DotEnvyConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_from(|key| std::env::var(key).ok())
}

/// Builds the config from an arbitrary lookup. Every required variable is
/// checked before returning so the error names all that are missing.
pub fn load_from<F>(lookup: F) -> Result<DotEnvyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let mut missing = Vec::new();
    let mut required = |key: &'static str| {
        let value = get(key);
        if value.is_none() {
            missing.push(key);
        }
        value.unwrap_or_default()
    };

    let stripe_secret_key = required("STRIPE_SECRET_KEY");
    let stripe_webhook_secret = required("STRIPE_WEBHOOK_SECRET");
    let supabase_url = required("SUPABASE_URL");
    let supabase_service_role_key = required("SUPABASE_SERVICE_ROLE_KEY");
    let app_url = required("NEXT_PUBLIC_APP_URL");

    if !missing.is_empty() {
        return Err(ConfigError::Missing(missing));
    }

    let backend_server = BackendServer {
        port: parse_or("SERVER_PORT", get("SERVER_PORT"), DEFAULT_PORT)?,
        body_limit: parse_or(
            "SERVER_BODY_LIMIT",
            get("SERVER_BODY_LIMIT"),
            DEFAULT_BODY_LIMIT_MIB,
        )?,
        timeout: parse_or("SERVER_TIMEOUT", get("SERVER_TIMEOUT"), DEFAULT_TIMEOUT_SECS)?,
    };

    let stripe = Stripe {
        secret_key: stripe_secret_key,
        webhook_secret: stripe_webhook_secret,
        api_base: get("STRIPE_API_BASE"),
    };

    let supabase = Supabase {
        project_url: parse_url("SUPABASE_URL", &supabase_url)?,
        service_role_key: supabase_service_role_key,
    };

    let database = get("DATABASE_URL").map(|url| Database { url });

    let app = App {
        public_url: parse_url("NEXT_PUBLIC_APP_URL", &app_url)?,
    };

    Ok(DotEnvyConfig {
        backend_server,
        stripe,
        supabase,
        database,
        app,
    })
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.parse().map_err(|err: T::Err| ConfigError::Invalid {
            name,
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|err| ConfigError::Invalid {
        name,
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme `{}`", url.scheme()),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("STRIPE_SECRET_KEY", "sk_test_123"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_123"),
            ("SUPABASE_URL", "https://project.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "service-role"),
            ("NEXT_PUBLIC_APP_URL", "https://app.example.com/"),
        ])
    }

    fn load_env(env: &HashMap<&'static str, &'static str>) -> Result<DotEnvyConfig, ConfigError> {
        load_from(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn loads_required_values_with_defaults() {
        let config = load_env(&full_env()).unwrap();

        assert_eq!(config.backend_server.port, DEFAULT_PORT);
        assert_eq!(config.backend_server.body_limit, DEFAULT_BODY_LIMIT_MIB);
        assert_eq!(config.backend_server.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.stripe.secret_key, "sk_test_123");
        assert!(config.database.is_none());
        assert!(config.stripe.api_base.is_none());
    }

    #[test]
    fn reports_every_missing_variable() {
        let mut env = full_env();
        env.remove("STRIPE_WEBHOOK_SECRET");
        env.insert("SUPABASE_SERVICE_ROLE_KEY", "   ");

        let err = load_env(&env).unwrap_err();

        match err {
            ConfigError::Missing(keys) => {
                assert_eq!(keys, vec!["STRIPE_WEBHOOK_SECRET", "SUPABASE_SERVICE_ROLE_KEY"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_invalid_urls_and_numbers() {
        let mut env = full_env();
        env.insert("NEXT_PUBLIC_APP_URL", "not a url");
        assert!(matches!(
            load_env(&env).unwrap_err(),
            ConfigError::Invalid { name: "NEXT_PUBLIC_APP_URL", .. }
        ));

        let mut env = full_env();
        env.insert("SERVER_PORT", "eighty");
        assert!(matches!(
            load_env(&env).unwrap_err(),
            ConfigError::Invalid { name: "SERVER_PORT", .. }
        ));
    }

    #[test]
    fn database_url_enables_direct_postgres() {
        let mut env = full_env();
        env.insert("DATABASE_URL", "postgres://localhost:5432/postgres");

        let config = load_env(&env).unwrap();

        assert_eq!(
            config.database.map(|db| db.url).as_deref(),
            Some("postgres://localhost:5432/postgres")
        );
    }

    #[test]
    fn builds_checkout_redirects_from_public_url() {
        let config = load_env(&full_env()).unwrap();

        assert_eq!(
            config.app.checkout_success_url(),
            "https://app.example.com/success?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(config.app.checkout_cancel_url(), "https://app.example.com/cancel");
    }
}
