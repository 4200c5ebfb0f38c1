use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tracing::{error, info};

use crate::{
    config::{BotConfig, SourceConfig},
    types::MatchDay,
};

#[async_trait]
pub trait HtmlFetcher: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String>;
}

/// Fetches pages through a public relay that takes the target as an
/// url-encoded query parameter.
pub struct RelayFetcher {
    client: reqwest::Client,
    relay_prefix: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RelayFetcher {
    pub fn new(config: &BotConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.scraping.user_agent)
            .timeout(Duration::from_secs(config.scraping.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.rate_limits.requests_per_second)
                .ok_or_else(|| anyhow!("Invalid requests_per_second value"))?,
        );

        Ok(Self {
            client,
            relay_prefix: config.source.relay_prefix.clone(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn relay_url(&self, target: &str) -> String {
        if self.relay_prefix.is_empty() {
            target.to_string()
        } else {
            format!("{}{}", self.relay_prefix, urlencoding::encode(target))
        }
    }
}

#[async_trait]
impl HtmlFetcher for RelayFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.rate_limiter.until_ready().await;

        let request_url = self.relay_url(url);
        let response = self
            .client
            .get(&request_url)
            .header("Accept", "text/html,application/xhtml+xml")
            .send()
            .await
            .with_context(|| format!("Request failed for {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch {}: HTTP {}", url, response.status());
        }

        let html = response.text().await?;
        info!("Downloaded {} bytes from {}", html.len(), url);
        Ok(html)
    }
}

/// Schedule page for one day. Any failure is logged and reported as an
/// empty page so the run carries on with "no matches".
pub async fn fetch_day<F: HtmlFetcher + ?Sized>(fetcher: &F, source: &SourceConfig, day: MatchDay) -> String {
    let url = source.day_url(day);
    info!("Fetching matches for {} from {}", day, url);
    match fetcher.fetch_html(&url).await {
        Ok(html) => html,
        Err(e) => {
            error!("Error fetching matches for {}: {:#}", day, e);
            String::new()
        }
    }
}

/// Fetches several schedule pages concurrently, results in request order.
pub async fn fetch_days<F: HtmlFetcher + ?Sized>(
    fetcher: &F,
    source: &SourceConfig,
    days: &[MatchDay],
) -> Vec<(MatchDay, String)> {
    let pages = join_all(days.iter().map(|&day| fetch_day(fetcher, source, day))).await;
    days.iter().copied().zip(pages).collect()
}
