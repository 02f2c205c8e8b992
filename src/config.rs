use serde::Deserialize;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Score store connection string. `None` leaves the score endpoints unavailable.
    pub database_url: Option<String>,
    pub port: u16,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub generation_timeout_secs: u64,
    pub generation_max_retries: u32,
    pub score_cache_ttl_secs: u64,
    pub n8n_webhook_url: Option<String>,
    pub n8n_timeout_secs: u64,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: match std::env::var("DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
            {
                Ok(url) if !url.trim().is_empty() => {
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Some(url)
                }
                _ => None,
            },
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            gemini_api_key: std::env::var("GEMINI_API_KEY")
                .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("GEMINI_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            gemini_base_url: std::env::var("GEMINI_BASE_URL")
                .map(|url| validate_http_url("GEMINI_BASE_URL", url))
                .unwrap_or_else(|_| Ok(DEFAULT_GEMINI_BASE_URL.to_string()))?,
            gemini_model: std::env::var("GEMINI_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            generation_timeout_secs: parse_bounded("GENERATION_TIMEOUT_SECS", 30, 1, 300)?,
            generation_max_retries: parse_bounded("GENERATION_MAX_RETRIES", 1, 0, 3)? as u32,
            score_cache_ttl_secs: parse_bounded("SCORE_CACHE_TTL_SECS", 3600, 0, 86_400)?,
            n8n_webhook_url: match std::env::var("N8N_WEBHOOK_URL") {
                Ok(url) if !url.trim().is_empty() => {
                    Some(validate_http_url("N8N_WEBHOOK_URL", url)?)
                }
                _ => None,
            },
            n8n_timeout_secs: parse_bounded("N8N_TIMEOUT_SECS", 60, 1, 600)?,
            run_migrations: std::env::var("RUN_MIGRATIONS")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        match config.database_url {
            Some(ref url) => tracing::debug!(
                "Database URL: {}...",
                url.chars().take(20).collect::<String>()
            ),
            None => tracing::warn!("DATABASE_URL not set; score endpoints will be unavailable"),
        }
        tracing::debug!(
            "Gemini: {} (model {})",
            config.gemini_base_url,
            config.gemini_model
        );
        if config.n8n_webhook_url.is_none() {
            tracing::warn!("N8N_WEBHOOK_URL not set; assistant proxy will be unavailable");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Reads an optional numeric variable, falling back to `default`, and rejects values outside
/// `min..=max`.
fn parse_bounded(name: &str, default: u64, min: u64, max: u64) -> anyhow::Result<u64> {
    let value = match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer", name))?,
        _ => default,
    };
    if value < min || value > max {
        anyhow::bail!("{} must be between {} and {}", name, min, max);
    }
    Ok(value)
}

fn validate_http_url(name: &str, url: String) -> anyhow::Result<String> {
    if url.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url.trim_end_matches('/').to_string())
}
