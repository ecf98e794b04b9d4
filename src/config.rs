use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: PathBuf,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub aws_region: String,
    pub aws_endpoint_url: Option<String>,
    pub chunk_size: u64,
    pub worker_concurrency: usize,
    pub chunks_concurrency: usize,
    pub file_monitor_interval: u64,
    pub file_stability_threshold: u64,
    pub log_level: String,
}

pub const DEFAULT_AWS_REGION: &str = "us-east-1";

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/uploads.db")),
            aws_access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_else(|_| "test".into()),
            aws_secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY")
                .unwrap_or_else(|_| "test".into()),
            aws_region: std::env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_AWS_REGION.into()),
            aws_endpoint_url: std::env::var("AWS_ENDPOINT_URL").ok(),
            chunk_size: std::env::var("CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5 * 1024 * 1024),
            worker_concurrency: std::env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            chunks_concurrency: std::env::var("CHUNKS_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            file_monitor_interval: std::env::var("FILE_MONITOR_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            file_stability_threshold: std::env::var("FILE_STABILITY_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_when_env_unset() {
        // Construct directly rather than through from_env, which reads the
        // real process environment and would be racy under parallel tests.
        let config = AppConfig {
            port: 3000,
            database_url: PathBuf::from("./data/uploads.db"),
            aws_access_key_id: "test".into(),
            aws_secret_access_key: "test".into(),
            aws_region: DEFAULT_AWS_REGION.into(),
            aws_endpoint_url: None,
            chunk_size: 5 * 1024 * 1024,
            worker_concurrency: 5,
            chunks_concurrency: 10,
            file_monitor_interval: 60,
            file_stability_threshold: 30,
            log_level: "info".into(),
        };
        assert_eq!(config.chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.worker_concurrency, 5);
        assert_eq!(config.chunks_concurrency, 10);
        assert_eq!(config.aws_region, "us-east-1");
    }
}
