use aerobook_api::{app, state::{build_coordinator, AppState}};
use aerobook_core::events::{BookingEventPublisher, LogOnlyPublisher};
use aerobook_store::{app_config::Config, EventProducer, HttpGateway, RedisClient, RedisSessionStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "aerobook_api=debug,aerobook_booking=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting Aerobook API on port {}", config.server.port);

    // Redis session store
    let redis_client = RedisClient::new(&config.redis.url).await?;
    if let Err(e) = redis_client.ping().await {
        tracing::warn!("Redis not reachable yet: {}", e);
    }
    let store = Arc::new(RedisSessionStore::new(redis_client, config.redis.session_ttl_seconds));

    // Kafka producer, or log-only events when the broker config is unusable
    let events: Arc<dyn BookingEventPublisher> = match EventProducer::new(
        &config.kafka.brokers,
        &config.kafka.topic,
        &config.kafka.recovery_topic,
    ) {
        Ok(producer) => Arc::new(producer),
        Err(e) => {
            tracing::warn!("Kafka producer unavailable, logging events only: {}", e);
            Arc::new(LogOnlyPublisher)
        }
    };

    let gateway = Arc::new(HttpGateway::new(&config.upstream)?);

    let coordinator = build_coordinator(&config, gateway, store, events.clone());
    let app = app(AppState::new(coordinator, events));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
