//! Bank feed client

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

use super::model::IncomingTransaction;

#[async_trait]
pub trait BankFeed: Send + Sync {
    /// Incoming transfers settled between `from` and `to`, inclusive
    async fn settled_credits(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<IncomingTransaction>>;
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    transactions: Vec<IncomingTransaction>,
}

/// REST bank feed authenticated with a bearer token
pub struct HttpBankFeed {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl HttpBankFeed {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

#[async_trait]
impl BankFeed for HttpBankFeed {
    async fn settled_credits(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<IncomingTransaction>> {
        let mut request = self
            .client
            .get(format!("{}/transactions", self.base_url))
            .query(&[
                ("from", from.to_string()),
                ("to", to.to_string()),
                ("direction", "credit".to_string()),
                ("status", "settled".to_string()),
            ]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("bank feed unreachable")?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("bank feed returned {}", status));
        }

        let body: TransactionsResponse = response
            .json()
            .await
            .context("unexpected bank feed response")?;
        tracing::debug!(count = body.transactions.len(), %from, %to, "Bank feed fetched");
        Ok(body.transactions)
    }
}
