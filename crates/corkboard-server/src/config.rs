use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use corkboard_api::images::{DEFAULT_BASE_URL, DEFAULT_MODEL, ImageConfig};

/// Secret used when none is configured. Fine for local runs only.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Inline base64 images make form posts large.
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub max_body_bytes: usize,
    pub images: ImageConfig,
}

impl Config {
    /// Read configuration from the process environment (after `.env`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = match get("CORKBOARD_JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                warn!("CORKBOARD_JWT_SECRET is unset, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let port = match get("CORKBOARD_PORT") {
            Some(p) => p.parse().with_context(|| format!("invalid CORKBOARD_PORT '{}'", p))?,
            None => 3000,
        };

        let max_body_bytes = match get("CORKBOARD_MAX_BODY_BYTES") {
            Some(n) => n
                .parse()
                .with_context(|| format!("invalid CORKBOARD_MAX_BODY_BYTES '{}'", n))?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        let api_token = get("REPLICATE_API_TOKEN").filter(|t| !t.is_empty());
        if api_token.is_none() {
            warn!("REPLICATE_API_TOKEN is unset, image generation is disabled");
        }

        Ok(Self {
            host: get("CORKBOARD_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("CORKBOARD_DB_PATH")
                .unwrap_or_else(|| "corkboard.db".into())
                .into(),
            jwt_secret,
            max_body_bytes,
            images: ImageConfig {
                base_url: get("REPLICATE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
                model: get("REPLICATE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
                api_token,
                timeout: Duration::from_secs(120),
            },
        })
    }
}
