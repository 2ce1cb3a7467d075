use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct Env {
    pub server_address: IpAddr,
    pub server_port: u16,
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,
    #[serde(default)]
    pub worker_id: u8,
    #[serde(default)]
    pub process_id: u8,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_media_base_url")]
    pub media_base_url: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_status_channel_capacity")]
    pub status_channel_capacity: usize,
}

fn default_max_connections() -> u32 {
    10
}

fn default_api_prefix() -> String {
    "/api".to_owned()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_media_base_url() -> String {
    "/uploads".to_owned()
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_status_channel_capacity() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use crate::config::{DEFAULT_MAX_UPLOAD_BYTES, Env};
    use std::path::PathBuf;

    #[test]
    fn optional_settings_fall_back_to_defaults() {
        let vars = [
            ("SERVER_ADDRESS", "127.0.0.1"),
            ("SERVER_PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/civicfeed"),
        ]
        .map(|(key, value)| (key.to_owned(), value.to_owned()));

        let env: Env = envy::from_iter(vars).unwrap();
        assert_eq!(env.server_port, 8080);
        assert_eq!(env.database_max_connections, 10);
        assert_eq!(env.api_prefix, "/api");
        assert_eq!(env.upload_dir, PathBuf::from("uploads"));
        assert_eq!(env.media_base_url, "/uploads");
        assert_eq!(env.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(env.worker_id, 0);
    }

    #[test]
    fn settings_are_read_from_the_environment() {
        let vars = [
            ("SERVER_ADDRESS", "0.0.0.0"),
            ("SERVER_PORT", "80"),
            ("DATABASE_URL", "postgres://db/civicfeed"),
            ("WORKER_ID", "3"),
            ("API_PREFIX", "/v1"),
            ("MAX_UPLOAD_BYTES", "1024"),
        ]
        .map(|(key, value)| (key.to_owned(), value.to_owned()));

        let env: Env = envy::from_iter(vars).unwrap();
        assert_eq!(env.worker_id, 3);
        assert_eq!(env.api_prefix, "/v1");
        assert_eq!(env.max_upload_bytes, 1024);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let vars = [("SERVER_ADDRESS", "0.0.0.0"), ("SERVER_PORT", "80")]
            .map(|(key, value)| (key.to_owned(), value.to_owned()));
        assert!(envy::from_iter::<_, Env>(vars).is_err());
    }
}
