use serde::{Deserialize, Serialize};
use std::{env, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::warn;

use crate::types::MatchDay;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("no credentials configured: set CLIENT_ID/CLIENT_SECRET/REFRESH_TOKEN, ACCESS_TOKEN or API_KEY")]
    NoCredentials,
    #[error("invalid MATCH_DAYS value: {0}")]
    InvalidDays(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub origin: String,
    pub relay_prefix: String,
    pub days: Vec<MatchDay>,
}

impl SourceConfig {
    pub fn day_url(&self, day: MatchDay) -> String {
        format!("{}{}", self.origin.trim_end_matches('/'), day.path())
    }

    /// The bare site root, used by some pages as a placeholder detail link.
    pub fn root_url(&self) -> String {
        format!("{}/", self.origin.trim_end_matches('/'))
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            origin: "https://www.kooraliive.com".to_string(),
            relay_prefix: "https://api.allorigins.win/raw?url=".to_string(),
            days: vec![MatchDay::Today, MatchDay::Tomorrow],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimits {
    pub requests_per_second: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapingConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    OAuth {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
    ApiKey(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlogConfig {
    pub blog_id: String,
    pub api_base: String,
    pub token_url: String,
    pub credentials: Credentials,
    /// Appended as `key=` to read requests when present.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishConfig {
    pub inter_request_delay_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_secs: u64,
    pub retry_multiplier: f64,
    pub skip_finished: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            inter_request_delay_secs: 3,
            max_retries: 3,
            retry_base_delay_secs: 5,
            retry_multiplier: 1.5,
            skip_finished: true,
        }
    }
}

impl PublishConfig {
    pub fn inter_request_delay(&self) -> Duration {
        Duration::from_secs(self.inter_request_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupConfig {
    pub state_file: String,
    pub min_age_hours: i64,
    pub max_age_hours: i64,
    pub grace_minutes: i64,
    pub source_utc_offset_minutes: i32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            state_file: "match_urls.json".to_string(),
            min_age_hours: 3,
            max_age_hours: 24,
            grace_minutes: 30,
            source_utc_offset_minutes: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotConfig {
    pub source: SourceConfig,
    pub rate_limits: RateLimits,
    pub scraping: ScrapingConfig,
    pub blog: BlogConfig,
    pub publish: PublishConfig,
    pub cleanup: CleanupConfig,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let blog_id = get("BLOG_ID").ok_or(ConfigError::Missing("BLOG_ID"))?;
        let api_key = get("API_KEY");
        let credentials = match (get("CLIENT_ID"), get("CLIENT_SECRET"), get("REFRESH_TOKEN")) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Credentials::OAuth {
                client_id,
                client_secret,
                refresh_token,
            },
            _ => match (get("ACCESS_TOKEN"), api_key.clone()) {
                (Some(token), _) => Credentials::Bearer(token),
                (None, Some(key)) => Credentials::ApiKey(key),
                (None, None) => return Err(ConfigError::NoCredentials),
            },
        };

        let mut source = SourceConfig::default();
        if let Some(origin) = get("SOURCE_ORIGIN") {
            source.origin = origin.trim_end_matches('/').to_string();
        }
        // An explicitly empty relay means "fetch directly".
        if let Some(relay) = lookup("RELAY_PREFIX") {
            source.relay_prefix = relay.trim().to_string();
        }
        if let Some(days) = get("MATCH_DAYS") {
            source.days = days
                .split(',')
                .filter(|d| !d.trim().is_empty())
                .map(|d| d.parse::<MatchDay>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ConfigError::InvalidDays(days.clone()))?;
        }

        let mut rate_limits = RateLimits::default();
        if let Some(rps) = parse_var(&get, "RATE_LIMIT_RPS") {
            rate_limits.requests_per_second = rps;
        }

        let mut scraping = ScrapingConfig::default();
        if let Some(user_agent) = get("SCRAPER_USER_AGENT") {
            scraping.user_agent = user_agent;
        }
        if let Some(timeout) = parse_var(&get, "SCRAPER_TIMEOUT_SECS") {
            scraping.request_timeout_secs = timeout;
        }

        let blog = BlogConfig {
            blog_id,
            api_base: get("BLOGGER_API_BASE")
                .unwrap_or_else(|| "https://www.googleapis.com/blogger/v3".to_string())
                .trim_end_matches('/')
                .to_string(),
            token_url: get("OAUTH_TOKEN_URL")
                .unwrap_or_else(|| "https://oauth2.googleapis.com/token".to_string()),
            credentials,
            api_key,
        };

        let mut publish = PublishConfig::default();
        if let Some(delay) = parse_var(&get, "PUBLISH_DELAY_SECS") {
            publish.inter_request_delay_secs = delay;
        }
        if let Some(retries) = parse_var(&get, "MAX_RETRIES") {
            publish.max_retries = retries;
        }
        if let Some(base) = parse_var(&get, "RETRY_BASE_DELAY_SECS") {
            publish.retry_base_delay_secs = base;
        }
        if let Some(multiplier) = parse_var::<f64, _>(&get, "RETRY_MULTIPLIER") {
            if multiplier.is_finite() && multiplier >= 1.0 {
                publish.retry_multiplier = multiplier;
            } else {
                warn!("Ignoring RETRY_MULTIPLIER outside [1.0, inf): {}", multiplier);
            }
        }
        if let Some(skip) = parse_var(&get, "SKIP_FINISHED_MATCHES") {
            publish.skip_finished = skip;
        }

        let mut cleanup = CleanupConfig::default();
        if let Some(path) = get("STATE_FILE") {
            cleanup.state_file = path;
        }
        if let Some(hours) = parse_var(&get, "CLEANUP_MIN_AGE_HOURS") {
            cleanup.min_age_hours = hours;
        }
        if let Some(hours) = parse_var(&get, "CLEANUP_MAX_AGE_HOURS") {
            cleanup.max_age_hours = hours;
        }
        if let Some(minutes) = parse_var(&get, "FINISH_GRACE_MINUTES") {
            cleanup.grace_minutes = minutes;
        }
        if let Some(offset) = parse_var(&get, "SOURCE_UTC_OFFSET_MINUTES") {
            cleanup.source_utc_offset_minutes = offset;
        }

        Ok(Self {
            source,
            rate_limits,
            scraping,
            blog,
            publish,
            cleanup,
        })
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Option<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {}={}", key, raw);
            None
        }
    }
}
