use std::sync::Arc;

use anyhow::Context;
use redis::aio::ConnectionManager;

use crate::config::{Config, StoreBackend};
use crate::utils::retry::RetryConfig;

use self::attempt_service::AttemptService;
use self::attempt_store::{AttemptStore, InMemoryAttemptStore};
use self::clock::{Clock, SystemClock};
use self::mongo_attempt_store::MongoAttemptStore;
use self::violation_events::ViolationPublisher;

pub mod attempt_service;
pub mod attempt_store;
pub mod clock;
pub mod mongo_attempt_store;
pub mod violation_events;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn AttemptStore>,
    pub clock: Arc<dyn Clock>,
    pub redis: Option<ConnectionManager>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn AttemptStore> = match config.store_backend {
            StoreBackend::Mongo => {
                let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
                    .await
                    .context("Failed to connect to MongoDB")?;
                let store = MongoAttemptStore::new(mongo_client.database(&config.mongo_database));
                store.ensure_indexes().await?;
                tracing::info!("MongoDB attempt store ready");
                Arc::new(store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory attempt store; attempts are lost on restart");
                Arc::new(InMemoryAttemptStore::new())
            }
        };

        let redis = match &config.redis_uri {
            Some(uri) => Some(connect_redis(uri).await?),
            None => {
                tracing::info!("REDIS_URI not set, violation event feed disabled");
                None
            }
        };

        Ok(Self {
            config,
            store,
            clock: Arc::new(SystemClock),
            redis,
        })
    }

    /// State over an existing store without Redis, for tests and embedding.
    pub fn with_store(config: Config, store: Arc<dyn AttemptStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
            redis: None,
        }
    }

    pub fn attempt_service(&self) -> AttemptService {
        AttemptService::new(
            self.store.clone(),
            self.clock.clone(),
            ViolationPublisher::new(self.redis.clone()),
            RetryConfig::with_max_attempts(self.config.conflict_retries),
        )
    }
}

async fn connect_redis(uri: &str) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");

    let redis_client = redis::Client::open(uri).context("Failed to create Redis client")?;
    let redis = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        ConnectionManager::new(redis_client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}
