use anyhow::{Context, Result};

use crate::id::DEFAULT_ID_LENGTH;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Public base URL used when generating short links, e.g. "https://go.example.com"
    /// Must NOT have a trailing slash.
    pub base_url: String,

    /// Number of characters in a generated short id.
    pub short_id_length: usize,

    /// When set, `X-Forwarded-For` / `X-Real-IP` take precedence over the
    /// peer address when recording a visit. Only enable behind a proxy that
    /// overwrites these headers.
    pub trust_proxy_headers: bool,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup so tests don't have to
    /// touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".into())
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let base_url = lookup("BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        url::Url::parse(&base_url)
            .with_context(|| format!("BASE_URL '{base_url}' is not an absolute URL"))?;

        let short_id_length = match lookup("SHORT_ID_LENGTH") {
            Some(raw) => raw
                .parse::<usize>()
                .context("SHORT_ID_LENGTH must be a positive integer")?,
            None => DEFAULT_ID_LENGTH,
        };

        if !(4..=32).contains(&short_id_length) {
            anyhow::bail!("SHORT_ID_LENGTH must be between 4 and 32, got {short_id_length}");
        }

        let trust_proxy_headers = lookup("TRUST_PROXY_HEADERS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            base_url,
            short_id_length,
            trust_proxy_headers,
        })
    }
}
