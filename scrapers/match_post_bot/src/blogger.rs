//! Blogger v3 REST client.
//!
//! Three authentication modes are supported: a static bearer token, an OAuth
//! refresh token exchanged for short-lived access tokens, and a bare API key.
//! With OAuth, a 401 triggers exactly one refresh and one re-issue of the
//! same request.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    config::{BotConfig, Credentials},
    retry::{RetryPolicy, Sleeper},
    types::PostRecord,
};

/// Refresh this long before the provider-reported expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limited (HTTP {status}): {message}")]
    RateLimited { status: u16, message: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("token refresh failed: {0}")]
    Token(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }

    /// Failures worth retrying when exchanging a refresh token.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) | ApiError::RateLimited { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

fn is_rate_limit_message(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    ["rate limit", "ratelimit", "quota", "too many requests"]
        .iter()
        .any(|needle| body.contains(needle))
}

/// 429 is always a rate limit; 403 only when the body says so.
pub fn classify_status(status: StatusCode, body: String) -> ApiError {
    let code = status.as_u16();
    match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited { status: code, message: body },
        StatusCode::FORBIDDEN if is_rate_limit_message(&body) => {
            ApiError::RateLimited { status: code, message: body }
        }
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(body),
        _ => ApiError::Status { status: code, message: body },
    }
}

async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, body))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() + TOKEN_EXPIRY_MARGIN < at)
    }
}

/// Exchanges the refresh token for access tokens and caches the result.
pub struct TokenProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cached: Mutex<Option<CachedToken>>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl TokenProvider {
    pub async fn access_token(&self) -> Result<String, ApiError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }
        let token = self.fetch_with_retry().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    pub async fn refresh(&self) -> Result<String, ApiError> {
        let mut cached = self.cached.lock().await;
        let token = self.fetch_with_retry().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch_with_retry(&self) -> Result<CachedToken, ApiError> {
        self.retry
            .run(self.sleeper.as_ref(), || self.request_token(), ApiError::is_transient)
            .await
    }

    async fn request_token(&self) -> Result<CachedToken, ApiError> {
        info!("Requesting new access token");
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(match classify_status(status, body) {
                ApiError::Status { status, message } if status < 500 => ApiError::Token(message),
                ApiError::Unauthorized(message) => ApiError::Token(message),
                other => other,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        Ok(CachedToken {
            value: token.access_token,
            expires_at: token.expires_in.map(|secs| Instant::now() + Duration::from_secs(secs)),
        })
    }
}

enum Auth {
    Bearer(String),
    OAuth(TokenProvider),
    ApiKey(String),
}

#[async_trait]
pub trait BlogApi: Send + Sync {
    async fn search_posts(&self, query: &str) -> Result<Vec<PostRecord>, ApiError>;
    async fn insert_post(&self, title: &str, content: &str) -> Result<PostRecord, ApiError>;
    async fn get_post(&self, post_id: &str) -> Result<Option<PostRecord>, ApiError>;
    async fn delete_post(&self, post_id: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Deserialize)]
struct PostList {
    #[serde(default)]
    items: Vec<PostRecord>,
}

pub struct BloggerClient {
    client: reqwest::Client,
    api_base: String,
    blog_id: String,
    auth: Auth,
    api_key: Option<String>,
}

impl BloggerClient {
    pub fn new(config: &BotConfig, sleeper: Arc<dyn Sleeper>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.scraping.request_timeout_secs))
            .build()
            .context("Failed to create API client")?;

        let blog = &config.blog;
        let auth = match &blog.credentials {
            Credentials::Bearer(token) => Auth::Bearer(token.clone()),
            Credentials::ApiKey(key) => Auth::ApiKey(key.clone()),
            Credentials::OAuth {
                client_id,
                client_secret,
                refresh_token,
            } => Auth::OAuth(TokenProvider {
                client: client.clone(),
                token_url: blog.token_url.clone(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                refresh_token: refresh_token.clone(),
                cached: Mutex::new(None),
                retry: RetryPolicy::from_config(&config.publish),
                sleeper,
            }),
        };

        Ok(Self {
            client,
            api_base: blog.api_base.clone(),
            blog_id: blog.blog_id.clone(),
            auth,
            api_key: blog.api_key.clone(),
        })
    }

    /// Seeds the OAuth cache, e.g. with a token obtained out of band.
    pub fn with_access_token(mut self, token: &str) -> Self {
        if let Auth::OAuth(provider) = &mut self.auth {
            *provider.cached.get_mut() = Some(CachedToken {
                value: token.to_string(),
                expires_at: None,
            });
        }
        self
    }

    fn posts_url(&self) -> String {
        format!("{}/blogs/{}/posts", self.api_base, self.blog_id)
    }

    async fn bearer(&self, force_refresh: bool) -> Result<Option<String>, ApiError> {
        match &self.auth {
            Auth::Bearer(token) => Ok(Some(token.clone())),
            Auth::OAuth(provider) if force_refresh => provider.refresh().await.map(Some),
            Auth::OAuth(provider) => provider.access_token().await.map(Some),
            Auth::ApiKey(_) => Ok(None),
        }
    }

    fn authorize(&self, request: RequestBuilder, token: Option<&str>, read: bool) -> RequestBuilder {
        let request = match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        match (&self.auth, &self.api_key) {
            (Auth::ApiKey(key), _) => request.query(&[("key", key)]),
            (_, Some(key)) if read => request.query(&[("key", key)]),
            _ => request,
        }
    }

    async fn send<B>(&self, build: B, read: bool) -> Result<Response, ApiError>
    where
        B: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        let token = self.bearer(false).await?;
        let response = self
            .authorize(build(&self.client), token.as_deref(), read)
            .send()
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check(response).await;
        }
        if !matches!(self.auth, Auth::OAuth(_)) {
            return check(response).await;
        }

        warn!("Access token rejected, refreshing and retrying once");
        let token = self.bearer(true).await?;
        let response = self
            .authorize(build(&self.client), token.as_deref(), read)
            .send()
            .await?;
        check(response).await
    }
}

#[async_trait]
impl BlogApi for BloggerClient {
    async fn search_posts(&self, query: &str) -> Result<Vec<PostRecord>, ApiError> {
        let url = format!("{}/search", self.posts_url());
        let response = self
            .send(|client| client.get(&url).query(&[("q", query)]), true)
            .await?;
        let list: PostList = serde_json::from_str(&response.text().await?)?;
        debug!("Search {:?} returned {} posts", query, list.items.len());
        Ok(list.items)
    }

    async fn insert_post(&self, title: &str, content: &str) -> Result<PostRecord, ApiError> {
        let url = format!("{}/", self.posts_url());
        let body = json!({
            "kind": "blogger#post",
            "blog": { "id": self.blog_id },
            "title": title,
            "content": content,
        });
        let response = self.send(|client| client.post(&url).json(&body), false).await?;
        Ok(serde_json::from_str(&response.text().await?)?)
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<PostRecord>, ApiError> {
        let url = format!("{}/{}", self.posts_url(), post_id);
        match self.send(|client| client.get(&url), true).await {
            Ok(response) => Ok(Some(serde_json::from_str(&response.text().await?)?)),
            Err(ApiError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_post(&self, post_id: &str) -> Result<(), ApiError> {
        let url = format!("{}/{}", self.posts_url(), post_id);
        self.send(|client| client.delete(&url), false).await?;
        info!("Deleted post {}", post_id);
        Ok(())
    }
}
