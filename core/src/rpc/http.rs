//! JSON-over-HTTP relayer client.
//!
//! ```text
//! GET  /indexedTransactions  → { "data": [IndexedTransaction] }
//! POST /relayTransaction     ← TransactionEnvelope → { "data": TxResult }
//! POST /updatemerkletree     → 2xx
//! ```

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tessera_config::RelayerRuntime;

use super::{IndexedTransaction, Indexer, TransactionEnvelope, TxResult};
use crate::error::RelayerError;

/// Relayer responses wrap their payload in `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DataResponse<T> {
    data: T,
}

pub struct HttpRelayer {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRelayer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RelayerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayerError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(cfg: &RelayerRuntime) -> Result<Self, RelayerError> {
        Self::new(cfg.url.clone(), cfg.timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RelayerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() && status.as_u16() != 429 {
            return Err(RelayerError::Rejected(format!("{status}: {body}")));
        }
        Err(RelayerError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RelayerError> {
        response
            .json::<DataResponse<T>>()
            .await
            .map(|r| r.data)
            .map_err(|e| RelayerError::Decode(e.to_string()))
    }
}

fn transport(e: reqwest::Error) -> RelayerError {
    RelayerError::Transport(e.to_string())
}

impl Indexer for HttpRelayer {
    fn indexed_transactions(
        &self,
    ) -> impl Future<Output = Result<Vec<IndexedTransaction>, RelayerError>> + Send {
        let request = self.client.get(self.url("/indexedTransactions"));
        async move {
            let response = request.send().await.map_err(transport)?;
            let transactions: Vec<IndexedTransaction> =
                Self::decode(Self::check(response).await?).await?;
            debug!(count = transactions.len(), "fetched indexed transactions");
            Ok(transactions)
        }
    }

    fn submit(
        &self,
        envelope: &TransactionEnvelope,
    ) -> impl Future<Output = Result<TxResult, RelayerError>> + Send {
        let request = self.client.post(self.url("/relayTransaction")).json(envelope);
        async move {
            let response = request.send().await.map_err(transport)?;
            Self::decode(Self::check(response).await?).await
        }
    }

    fn update_ledger_view(&self) -> impl Future<Output = Result<(), RelayerError>> + Send {
        let request = self.client.post(self.url("/updatemerkletree"));
        async move {
            let response = request.send().await.map_err(transport)?;
            Self::check(response).await.map(|_| ())
        }
    }
}
