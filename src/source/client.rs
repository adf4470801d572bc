use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::token::{AccessToken, TokenCache};
use super::{PageQuery, SourceError, SourcePage};
use crate::config::SourceConfig;
use crate::ports::LedgerSource;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    #[serde(alias = "expiresAt", alias = "expires_at")]
    expiresat: String,
}

/// HTTP client for the cooperative's delivery ledger.
#[derive(Clone)]
pub struct SourceClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    tokens: Arc<TokenCache>,
    retry: RetryPolicy,
}

impl SourceClient {
    pub fn new(config: &SourceConfig, tokens: Arc<TokenCache>, retry: RetryPolicy) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        SourceClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            tokens,
            retry,
        }
    }

    pub async fn login(&self) -> Result<AccessToken, SourceError> {
        self.retry.run("ledger-source-login", || self.login_once()).await
    }

    async fn login_once(&self) -> Result<AccessToken, SourceError> {
        let url = format!("{}/account/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await?;

        let response = check_status(response).await?;
        let body = response.json::<LoginResponse>().await?;
        let expires_at = parse_expiry(&body.expiresat)
            .ok_or_else(|| SourceError::InvalidResponse(format!("unreadable token expiry '{}'", body.expiresat)))?;

        info!(expires_at = %expires_at, "ledger source login succeeded");
        Ok(AccessToken::new(body.token, expires_at))
    }

    async fn token(&self) -> Result<String, SourceError> {
        self.tokens.get_or_refresh(|| self.login()).await
    }

    /// A rejected token is dropped and the page asked for once more with a
    /// fresh login; a second rejection is returned to the caller.
    async fn fetch_page_once(&self, query: &PageQuery) -> Result<SourcePage, SourceError> {
        match self.request_page(query).await {
            Err(SourceError::Unauthorized) => {
                warn!(skip = query.skip, "ledger source rejected cached token; logging in again");
                self.tokens.invalidate().await;
                let retried = self.request_page(query).await;
                if matches!(retried, Err(SourceError::Unauthorized)) {
                    self.tokens.invalidate().await;
                }
                retried
            }
            other => other,
        }
    }

    async fn request_page(&self, query: &PageQuery) -> Result<SourcePage, SourceError> {
        let token = self.token().await?;
        let url = format!("{}/transaction/querytransactions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&query.body())
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(SourceError::Unauthorized);
        }

        let response = check_status(response).await?;
        let page = response
            .json::<SourcePage>()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        debug!(
            skip = query.skip,
            take = query.take,
            count = page.count,
            returned = page.records.len(),
            "fetched ledger source page"
        );
        Ok(page)
    }
}

#[async_trait]
impl LedgerSource for SourceClient {
    async fn fetch_page(&self, query: &PageQuery) -> Result<SourcePage, SourceError> {
        self.retry
            .run("ledger-source-page", || self.fetch_page_once(query))
            .await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SourceError::Status {
        status: status.as_u16(),
        body,
    })
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw.trim()) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
