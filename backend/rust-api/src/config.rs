use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = config::ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(config::ConfigError::Message(format!(
                "unknown store backend '{}', expected 'mongo' or 'memory'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub conflict_retries: usize,
    pub metrics_auth: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let store_backend = settings
            .get_string("store.backend")
            .or_else(|_| env::var("STORE_BACKEND"))
            .unwrap_or_else(|_| "mongo".to_string())
            .parse::<StoreBackend>()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "quiz_attempts".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .ok()
            .filter(|uri| !uri.trim().is_empty());

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ));
            }
            Err(_) => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let conflict_retries = match settings.get_int("attempts.conflict_retries") {
            Ok(value) => usize::try_from(value).map_err(|_| {
                config::ConfigError::Message(
                    "attempts.conflict_retries must not be negative".to_string(),
                )
            })?,
            Err(_) => env::var("ATTEMPT_CONFLICT_RETRIES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(5),
        };

        let metrics_auth = settings
            .get_string("metrics.auth")
            .or_else(|_| env::var("METRICS_AUTH"))
            .unwrap_or_else(|_| "admin:changeme".to_string());

        Ok(Config {
            store_backend,
            mongo_uri,
            mongo_database,
            redis_uri,
            jwt_secret,
            bind_addr,
            conflict_retries,
            metrics_auth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn store_backend_parses_aliases() {
        assert_eq!("mongo".parse::<StoreBackend>().unwrap(), StoreBackend::Mongo);
        assert_eq!("MongoDB".parse::<StoreBackend>().unwrap(), StoreBackend::Mongo);
        assert_eq!(" memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("postgres".parse::<StoreBackend>().is_err());
    }

    #[test]
    #[serial]
    fn load_reads_env_fallbacks() {
        std::env::set_var("SKIP_ROOT_ENV", "1");
        std::env::set_var("STORE_BACKEND", "memory");
        std::env::set_var("ATTEMPT_CONFLICT_RETRIES", "9");
        std::env::remove_var("REDIS_URI");
        std::env::remove_var("APP_ENV");

        let config = Config::load().unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.conflict_retries, 9);
        assert!(config.redis_uri.is_none());

        std::env::remove_var("STORE_BACKEND");
        std::env::remove_var("ATTEMPT_CONFLICT_RETRIES");
        std::env::remove_var("SKIP_ROOT_ENV");
    }

    #[test]
    #[serial]
    fn prod_requires_jwt_secret() {
        std::env::set_var("SKIP_ROOT_ENV", "1");
        std::env::set_var("APP_ENV", "prod");
        std::env::remove_var("JWT_SECRET");
        std::env::remove_var("APP__AUTH__JWT_SECRET");

        assert!(Config::load().is_err());

        std::env::remove_var("APP_ENV");
        std::env::remove_var("SKIP_ROOT_ENV");
    }
}
