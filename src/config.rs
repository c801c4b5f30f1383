use std::{env, net::SocketAddr, time::Duration};

use crate::error::AppError;

const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_PLACEHOLDER_IMAGE: &str =
    "https://images.unsplash.com/photo-1493976040374-85c8e12f0c0e?auto=format&fit=crop&q=80&w=400";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub cookie_secret: String,
    pub max_image_bytes: usize,
    pub placeholder_image_url: String,
    /// Visitor sessions untouched this long are dropped.
    pub session_idle: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://tripboard.db".to_string());
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let cookie_secret = env::var("COOKIE_SECRET")
            .unwrap_or_else(|_| "change-me-tripboard-cookie-secret".to_string());

        let max_image_bytes = match env::var("MAX_IMAGE_BYTES") {
            Ok(raw) => raw
                .parse()
                .map_err(|err| AppError::Config(format!("invalid MAX_IMAGE_BYTES: {err}")))?,
            Err(_) => DEFAULT_MAX_IMAGE_BYTES,
        };

        let placeholder_image_url = env::var("PLACEHOLDER_IMAGE_URL")
            .unwrap_or_else(|_| DEFAULT_PLACEHOLDER_IMAGE.to_string());

        let session_idle = match env::var("SESSION_IDLE_SECS") {
            Ok(raw) => raw
                .parse()
                .map(Duration::from_secs)
                .map_err(|err| AppError::Config(format!("invalid SESSION_IDLE_SECS: {err}")))?,
            Err(_) => DEFAULT_SESSION_IDLE,
        };

        Ok(Self {
            database_url,
            listen_addr,
            cookie_secret,
            max_image_bytes,
            placeholder_image_url,
            session_idle,
        })
    }

    /// Settings for tests and embedding: in-process defaults around a given database.
    pub fn with_database(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cookie_secret: "tripboard-test-cookie-secret".into(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            placeholder_image_url: DEFAULT_PLACEHOLDER_IMAGE.to_string(),
            session_idle: DEFAULT_SESSION_IDLE,
        }
    }
}
