use aerobook_core::error::{DEFAULT_BOOKING_EXISTS_CODES, DEFAULT_SESSION_EXPIRED_CODES};
use aerobook_core::gateway::ISSUE_REJECTED_STATUS;
use aerobook_core::ErrorClassifier;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,
}

fn default_session_ttl() -> u64 { 3600 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    #[serde(default = "default_recovery_topic")]
    pub recovery_topic: String,
}

fn default_recovery_topic() -> String { "booking.leg-recovered".to_string() }

/// Flight-distribution API endpoint and how its error codes are read.
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub client_id: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_session_expired_codes")]
    pub session_expired_codes: Vec<i32>,
    #[serde(default = "default_booking_exists_codes")]
    pub booking_exists_codes: Vec<i32>,
    #[serde(default = "default_rejected_status")]
    pub issue_rejected_status: i32,
}

fn default_timeout() -> u64 { 30 }
fn default_session_expired_codes() -> Vec<i32> { DEFAULT_SESSION_EXPIRED_CODES.to_vec() }
fn default_booking_exists_codes() -> Vec<i32> { DEFAULT_BOOKING_EXISTS_CODES.to_vec() }
fn default_rejected_status() -> i32 { ISSUE_REJECTED_STATUS }

impl UpstreamConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn classifier(&self) -> ErrorClassifier {
        ErrorClassifier {
            session_expired_codes: self.session_expired_codes.clone(),
            booking_exists_codes: self.booking_exists_codes.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_initial_delay_ms() -> u64 { 1000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `AEROBOOK__UPSTREAM__BASE_URL=...`
            .add_source(config::Environment::with_prefix("AEROBOOK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    const MINIMAL: &str = r#"
        [server]
        port = 3000

        [redis]
        url = "redis://127.0.0.1/"

        [kafka]
        brokers = "localhost:9092"
        topic = "booking.settled"

        [upstream]
        base_url = "http://localhost:8090"
        client_id = "aerobook"
    "#;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = parse(MINIMAL);

        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay(), Duration::from_secs(1));
        assert_eq!(config.upstream.call_timeout(), Duration::from_secs(30));
        assert_eq!(config.upstream.issue_rejected_status, 2);
        assert_eq!(config.upstream.classifier(), ErrorClassifier::default());
        assert_eq!(config.redis.session_ttl_seconds, 3600);
    }

    #[test]
    fn test_error_codes_configurable() {
        let toml = format!(
            "{}\nsession_expired_codes = [6, 41]\nbooking_exists_codes = [21, 22]\n",
            MINIMAL
        );
        let classifier = parse(&toml).upstream.classifier();

        assert!(classifier.classify_fault(41, "Trace gone").is_session_expired());
        assert_eq!(
            classifier.classify_fault(22, "Duplicate").kind(),
            aerobook_core::ErrorKind::BookingAlreadyExists
        );
    }
}
