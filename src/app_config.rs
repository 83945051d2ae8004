use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::http::DEFAULT_ALLOWED_ORIGIN;
use crate::responder::{AIService, ReplySettings};
use crate::store::{ChatStore, MemoryStore, TursoStore};

#[derive(Debug, Clone)]
pub struct AppConfig {
    // --- Server ---
    pub port: u16,
    pub client_url: Option<String>,
    pub ws_channel_capacity: usize,

    // --- Turso ---
    pub turso_db_url: Option<String>,
    pub turso_auth_token: Option<String>,

    // --- AI ---
    pub groq_model: String,
    pub groq_api_key: Option<String>,
    pub groq_base_url: String,
    pub ai_history_limit: usize,
    pub ai_reply_delay_min_ms: u64,
    pub ai_reply_delay_max_ms: u64,
    pub ai_drop_reply_when_disabled: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // dotenv belongs HERE, nowhere else
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            port: parsed(&get, "PORT", 8000)?,
            client_url: get("CLIENT_URL"),
            ws_channel_capacity: parsed(&get, "WS_CHANNEL_CAPACITY", 256)?,

            turso_db_url: get("TURSO_DATABASE_URL"),
            turso_auth_token: get("TURSO_AUTH_TOKEN"),

            groq_model: get("GROQ_MODEL").unwrap_or_else(|| "llama-3.3-70b-versatile".into()),
            groq_api_key: get("GROQ_API_KEY"),
            groq_base_url: get("GROQ_BASE_URL").unwrap_or_else(|| "https://api.groq.com/openai/v1".into()),
            ai_history_limit: parsed(&get, "AI_HISTORY_LIMIT", 5)?,
            ai_reply_delay_min_ms: parsed(&get, "AI_REPLY_DELAY_MIN_MS", 1000)?,
            ai_reply_delay_max_ms: parsed(&get, "AI_REPLY_DELAY_MAX_MS", 2000)?,
            ai_drop_reply_when_disabled: parsed(&get, "AI_DROP_REPLY_WHEN_DISABLED", false)?,
        };

        if config.ai_reply_delay_min_ms > config.ai_reply_delay_max_ms {
            anyhow::bail!(
                "AI_REPLY_DELAY_MIN_MS ({}) exceeds AI_REPLY_DELAY_MAX_MS ({})",
                config.ai_reply_delay_min_ms,
                config.ai_reply_delay_max_ms
            );
        }
        if config.turso_db_url.is_some() != config.turso_auth_token.is_some() {
            anyhow::bail!("TURSO_DATABASE_URL and TURSO_AUTH_TOKEN must be set together");
        }

        Ok(config)
    }

    pub fn reply_settings(&self) -> ReplySettings {
        ReplySettings {
            history_limit: self.ai_history_limit,
            min_delay: Duration::from_millis(self.ai_reply_delay_min_ms),
            max_delay: Duration::from_millis(self.ai_reply_delay_max_ms),
            drop_if_disabled: self.ai_drop_reply_when_disabled,
            ..ReplySettings::default()
        }
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec![DEFAULT_ALLOWED_ORIGIN.to_string()];
        if let Some(url) = &self.client_url {
            if url != DEFAULT_ALLOWED_ORIGIN {
                origins.push(url.clone());
            }
        }
        origins
    }

    /// Turso when configured, otherwise an in-process store
    pub async fn build_store(&self) -> Result<Arc<dyn ChatStore>> {
        match (&self.turso_db_url, &self.turso_auth_token) {
            (Some(url), Some(token)) => {
                let store = TursoStore::connect(url, token).await?;
                info!("Turso store connected");
                Ok(Arc::new(store))
            }
            _ => {
                info!("Turso not configured; using in-memory store");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }

    pub fn build_responder(&self) -> Result<AIService> {
        AIService::new(
            self.groq_model.clone(),
            self.groq_api_key.clone(),
            self.groq_base_url.clone(),
        )
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.parse().with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.ws_channel_capacity, 256);
        assert!(config.turso_db_url.is_none());
        assert!(config.groq_api_key.is_none());
        assert_eq!(config.groq_model, "llama-3.3-70b-versatile");

        let settings = config.reply_settings();
        assert_eq!(settings.history_limit, 5);
        assert_eq!(settings.min_delay, Duration::from_millis(1000));
        assert_eq!(settings.max_delay, Duration::from_millis(2000));
        assert!(!settings.drop_if_disabled);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PORT", "9000"),
            ("AI_HISTORY_LIMIT", "3"),
            ("AI_REPLY_DELAY_MIN_MS", "0"),
            ("AI_REPLY_DELAY_MAX_MS", "10"),
            ("AI_DROP_REPLY_WHEN_DISABLED", "true"),
            ("GROQ_API_KEY", "  key  "),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.groq_api_key.as_deref(), Some("key"));
        let settings = config.reply_settings();
        assert_eq!(settings.history_limit, 3);
        assert_eq!(settings.max_delay, Duration::from_millis(10));
        assert!(settings.drop_if_disabled);
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = config(&[("GROQ_API_KEY", "   "), ("PORT", "")]).unwrap();
        assert!(config.groq_api_key.is_none());
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn test_malformed_values_fail() {
        let err = config(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
        assert!(config(&[("AI_DROP_REPLY_WHEN_DISABLED", "yes")]).is_err());
    }

    #[test]
    fn test_inverted_delay_range_fails() {
        assert!(config(&[("AI_REPLY_DELAY_MIN_MS", "3000")]).is_err());
    }

    #[test]
    fn test_turso_needs_both_values() {
        assert!(config(&[("TURSO_DATABASE_URL", "libsql://db.turso.io")]).is_err());
    }

    #[test]
    fn test_allowed_origins() {
        assert_eq!(config(&[]).unwrap().allowed_origins(), [DEFAULT_ALLOWED_ORIGIN]);
        let origins = config(&[("CLIENT_URL", "https://support.example.com")]).unwrap().allowed_origins();
        assert_eq!(origins, [DEFAULT_ALLOWED_ORIGIN, "https://support.example.com"]);
    }

    #[tokio::test]
    async fn test_build_store_falls_back_to_memory() {
        let store = config(&[]).unwrap().build_store().await.unwrap();
        assert!(store.list_conversations().await.unwrap().is_empty());
    }
}
