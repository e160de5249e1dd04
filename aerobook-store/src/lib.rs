pub mod app_config;
pub mod distribution;
pub mod events;
pub mod redis_repo;

pub use distribution::HttpGateway;
pub use events::EventProducer;
pub use redis_repo::{RedisClient, RedisSessionStore};
