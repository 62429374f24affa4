//! Bounded retries with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use tessera_config::RetryConfig;
use tessera_privacy::{Address, Commitment, Nullifier};

use super::{IndexedTransaction, Indexer, LedgerRpc, TransactionEnvelope, TxResult};
use crate::error::RelayerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt + 1`: `base * 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, RelayerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RelayerError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt + 1 >= attempts => {
                    return Err(RelayerError::Unavailable {
                        operation,
                        attempts,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.backoff(attempt);
                    warn!(operation, attempt, error = %e, ?delay, "remote call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            base_delay: Duration::from_millis(cfg.base_backoff_ms),
            max_delay: Duration::from_millis(cfg.max_backoff_ms),
        }
    }
}

/// A collaborator whose reads go through a [`RetryPolicy`].
///
/// Submission is not retried here: the spend path decides when a retry is
/// safe.
#[derive(Debug, Clone)]
pub struct Retrying<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> Retrying<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<C: Indexer> Indexer for Retrying<C> {
    fn indexed_transactions(
        &self,
    ) -> impl Future<Output = Result<Vec<IndexedTransaction>, RelayerError>> + Send {
        self.policy
            .run("indexed_transactions", || self.inner.indexed_transactions())
    }

    fn submit(
        &self,
        envelope: &TransactionEnvelope,
    ) -> impl Future<Output = Result<TxResult, RelayerError>> + Send {
        self.inner.submit(envelope)
    }

    fn update_ledger_view(&self) -> impl Future<Output = Result<(), RelayerError>> + Send {
        self.policy
            .run("update_ledger_view", || self.inner.update_ledger_view())
    }
}

impl<C: LedgerRpc> LedgerRpc for Retrying<C> {
    fn account_exists(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<bool, RelayerError>> + Send {
        self.policy
            .run("account_exists", move || self.inner.account_exists(address))
    }

    fn latest_root(&self) -> impl Future<Output = Result<[u8; 32], RelayerError>> + Send {
        self.policy.run("latest_root", || self.inner.latest_root())
    }

    fn recency_token(&self) -> impl Future<Output = Result<String, RelayerError>> + Send {
        self.policy.run("recency_token", || self.inner.recency_token())
    }

    fn nullifier_account(&self, nullifier: &Nullifier) -> Address {
        self.inner.nullifier_account(nullifier)
    }

    fn queued_leaves_account(&self, left_leaf: &Commitment) -> Address {
        self.inner.queued_leaves_account(left_leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(4), Duration::from_millis(1000), "capped");
        assert_eq!(policy.backoff(40), Duration::from_millis(1000), "no overflow");
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast(3)
            .run("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(RelayerError::Transport("down".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_unavailable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast(2)
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RelayerError::Status { status: 503, body: String::new() }) }
            })
            .await;

        match result {
            Err(RelayerError::Unavailable { operation, attempts, .. }) => {
                assert_eq!(operation, "op");
                assert_eq!(attempts, 2);
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast(5)
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RelayerError::Decode("bad json".into())) }
            })
            .await;

        assert_eq!(result, Err(RelayerError::Decode("bad json".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "decode errors are not retried");
    }
}
