//! Infrastructure wiring: connection pools, bus, cache, projector, sweeper.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use faregate_infra::bus::KafkaEventBus;
use faregate_infra::cache::{RedisCache, TicketCache};
use faregate_infra::projections::TicketProjection;
use faregate_infra::read_store::PostgresReadStore;
use faregate_infra::workers::{
    spawn_projector, ExpirySweeper, ProjectorConfig, ProjectorHandle, SweeperConfig, SweeperHandle,
};
use faregate_infra::write_store::PostgresWriteStore;
use faregate_infra::{CommandService, QueryService, WriteStore};

use crate::config::AppConfig;

/// What the HTTP handlers need.
pub struct AppServices {
    pub commands: Arc<CommandService>,
    pub queries: Arc<QueryService>,
    pub write_store: Arc<dyn WriteStore>,
}

/// The running process: handler services plus background workers and the
/// pools they drain on shutdown.
pub struct Runtime {
    pub services: Arc<AppServices>,
    projector: ProjectorHandle,
    sweeper: SweeperHandle,
    write_pool: PgPool,
    read_pool: PgPool,
}

impl Runtime {
    /// Ordered teardown: sweeper, projector (consumer), then both pools.
    /// The Kafka producer flushes on drop.
    pub async fn shutdown(self) {
        info!("shutting down background workers");
        self.sweeper.shutdown().await;
        self.projector.shutdown().await;
        self.write_pool.close().await;
        self.read_pool.close().await;
        info!("shutdown complete");
    }
}

pub async fn build_runtime(config: &AppConfig) -> Runtime {
    let write_pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.write_database_url)
        .await
        .expect("failed to connect to the write database");

    let read_pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.read_database_url)
        .await
        .expect("failed to connect to the read database");

    let cache: Arc<dyn TicketCache> = Arc::new(
        RedisCache::connect(&config.redis_url)
            .await
            .expect("failed to connect to Redis"),
    );

    let bus = Arc::new(
        KafkaEventBus::new(&config.kafka_brokers, &config.kafka_client_id)
            .expect("failed to create Kafka producer"),
    );

    let write_store = Arc::new(PostgresWriteStore::new(write_pool.clone()));
    let read_store = Arc::new(PostgresReadStore::new(read_pool.clone()));

    let commands = Arc::new(CommandService::new(write_store.clone(), bus));
    let queries = Arc::new(QueryService::new(read_store.clone(), cache.clone()));

    let projection = Arc::new(TicketProjection::new(read_store, cache));
    let projector = spawn_projector(
        ProjectorConfig::new(&config.kafka_brokers, &config.kafka_client_id),
        projection,
    )
    .expect("failed to start projector");

    let sweeper = ExpirySweeper::new(
        commands.clone(),
        write_store.clone(),
        SweeperConfig {
            interval: Duration::from_secs(config.sweep_interval_secs),
            ..SweeperConfig::default()
        },
    )
    .spawn();

    Runtime {
        services: Arc::new(AppServices {
            commands,
            queries,
            write_store,
        }),
        projector,
        sweeper,
        write_pool,
        read_pool,
    }
}
