//! Ledger client
//!
//! Fetches raw expense records for a group from the expense-sharing
//! service. Authentication is an OAuth2 client-credentials exchange; the
//! access token is kept until it expires, expense data is always refetched.

use crate::config::LedgerConfig;
use crate::error::LedgerChatError;
use crate::models::RawExpense;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// All expense records of a group. An empty group yields an empty list.
    async fn fetch_expenses(&self, group_id: u64) -> Result<Vec<RawExpense>>;

    /// Display name of a group.
    async fn fetch_group(&self, group_id: u64) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        self.expires_at.map_or(true, |at| Utc::now() < at)
    }
}

#[derive(Debug, Deserialize)]
struct ExpensesPage {
    #[serde(default)]
    expenses: Vec<RawExpense>,
}

#[derive(Debug, Deserialize)]
struct GroupEnvelope {
    group: GroupInfo,
}

#[derive(Debug, Deserialize)]
struct GroupInfo {
    name: String,
}

/// HTTP client for the Splitwise v3 API.
pub struct SplitwiseClient {
    client: Client,
    config: LedgerConfig,
    token: Mutex<Option<CachedToken>>,
}

impl SplitwiseClient {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LedgerChatError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: LedgerConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.access_token.clone());
        }

        let token = self.request_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn request_token(&self) -> Result<CachedToken> {
        let (client_id, client_secret) = match (&self.config.client_id, &self.config.client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => (id, secret),
            _ => {
                return Err(LedgerChatError::AuthError(
                    "SPLITWISE_CLIENT_ID and SPLITWISE_CLIENT_SECRET must be set".to_string(),
                ))
            }
        };

        info!(token_url = %self.config.token_url, "Requesting ledger access token");

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ];

        let resp = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| LedgerChatError::TransportError(format!("token request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(%status, "Token endpoint rejected credentials");
            return Err(LedgerChatError::AuthError(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let raw: TokenResponse = resp
            .json()
            .await
            .map_err(|e| LedgerChatError::AuthError(format!("failed to parse token response: {}", e)))?;

        let expires_at = raw.expires_in.and_then(|secs| {
            let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
            Utc::now().checked_add_signed(ChronoDuration::seconds(secs))
        });

        Ok(CachedToken {
            access_token: raw.access_token,
            expires_at,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let token = self.access_token().await?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(&token)
            .query(query)
            .send()
            .await
            .map_err(|e| LedgerChatError::TransportError(format!("ledger request failed: {}", e)))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            // Force a fresh exchange on the next call
            *self.token.lock().await = None;
            warn!(%status, url, "Ledger service rejected access token");
            return Err(LedgerChatError::AuthError(format!(
                "ledger service returned {}",
                status
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(%status, url, "Ledger request failed");
            return Err(LedgerChatError::TransportError(format!(
                "ledger service returned {}: {}",
                status, body
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| LedgerChatError::TransportError(format!("invalid ledger response: {}", e)))
    }
}

/// Upper bound on expense pages fetched for one group.
const MAX_PAGES: usize = 1000;

#[async_trait]
impl LedgerClient for SplitwiseClient {
    async fn fetch_expenses(&self, group_id: u64) -> Result<Vec<RawExpense>> {
        let url = format!("{}/get_expenses", self.config.base_url);
        let limit = self.config.page_size;
        let mut offset = 0usize;
        let mut expenses = Vec::new();
        let mut seen = HashSet::new();

        for page_number in 0..MAX_PAGES {
            let page: ExpensesPage = self
                .get_json(
                    &url,
                    &[
                        ("group_id", group_id.to_string()),
                        ("limit", limit.to_string()),
                        ("offset", offset.to_string()),
                    ],
                )
                .await?;

            let count = page.expenses.len();
            let before = expenses.len();
            expenses.extend(
                page.expenses
                    .into_iter()
                    .filter(|e| e.id.map_or(true, |id| seen.insert(id))),
            );
            let added = expenses.len() - before;
            debug!(group_id, offset, count, added, "Fetched expense page");

            if count < limit {
                break;
            }
            if added == 0 {
                warn!(group_id, offset, "Ledger returned a page of already seen expenses, stopping");
                break;
            }
            if page_number + 1 == MAX_PAGES {
                warn!(group_id, pages = MAX_PAGES, "Page limit reached, ledger records may be incomplete");
            }
            offset += limit;
        }

        info!(group_id, records = expenses.len(), "Fetched ledger records");
        Ok(expenses)
    }

    async fn fetch_group(&self, group_id: u64) -> Result<String> {
        let url = format!("{}/get_group/{}", self.config.base_url, group_id);
        let envelope: GroupEnvelope = self.get_json(&url, &[]).await?;
        Ok(envelope.group.name)
    }
}
