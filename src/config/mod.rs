use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Bounds applied by the validation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsLimits {
    pub min_days: i64,
    pub max_days: i64,
    pub max_range_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub limits: AnalyticsLimits,
    /// Snapshots older than this are removed by retention cleanup.
    pub snapshot_retention_days: i64,
    /// Minimum businesses in a category before benchmarks are reported.
    pub benchmark_min_peers: usize,
    /// Event window used for benchmark and competitor math.
    pub benchmark_window_days: i64,
    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Capacity of the ingestion channel; events beyond it are dropped.
    pub buffer_size: usize,
    /// Actor-local buffer to shared buffer interval.
    pub fast_flush_interval_ms: u64,
    /// Shared buffer to database interval.
    pub flush_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());
        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./tally.db".to_string());
        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 5)?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_parse("PORT", 8080u16)?;

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            server: ServerConfig { host, port },
            analytics: AnalyticsConfig {
                limits: AnalyticsLimits {
                    min_days: env_parse("ANALYTICS_MIN_DAYS", 1)?,
                    max_days: env_parse("ANALYTICS_MAX_DAYS", 365)?,
                    max_range_days: env_parse("ANALYTICS_MAX_RANGE_DAYS", 365)?,
                },
                snapshot_retention_days: env_parse("SNAPSHOT_RETENTION_DAYS", 730)?,
                benchmark_min_peers: env_parse("BENCHMARK_MIN_PEERS", 3)?,
                benchmark_window_days: env_parse("BENCHMARK_WINDOW_DAYS", 30)?,
                tracker: TrackerConfig {
                    buffer_size: env_parse("TRACKER_BUFFER_SIZE", 100_000)?,
                    fast_flush_interval_ms: env_parse("TRACKER_FAST_FLUSH_MS", 100)?,
                    flush_interval_secs: env_parse("TRACKER_FLUSH_SECS", 5)?,
                },
            },
        })
    }
}

fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {name}: {e}")),
        Err(_) => Ok(default),
    }
}
