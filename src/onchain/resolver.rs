//! Signature → mint resolution.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{LedgerClient, TransactionMeta};
use crate::retry::{retry, Attempt, RetryPolicy};

pub struct IdentifierResolver {
    ledger: Arc<dyn LedgerClient>,
    reference_mint: String,
    policy: RetryPolicy,
}

impl IdentifierResolver {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        reference_mint: impl Into<String>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            ledger,
            reference_mint: reference_mint.into(),
            policy: RetryPolicy::new(max_attempts, retry_delay),
        }
    }

    /// Fetch the transaction behind `signature` and return the new token's mint.
    ///
    /// Missing transactions, missing metadata and fetch errors are retried up
    /// to the policy's budget; once metadata is present the answer is final.
    pub async fn resolve(&self, signature: &str) -> Option<String> {
        if signature.trim().is_empty() {
            debug!("empty signature, nothing to resolve");
            return None;
        }

        let outcome = retry(self.policy, |attempt| async move {
            match self.ledger.fetch_transaction(signature).await {
                Ok(Some(record)) => match record.meta {
                    Some(meta) => Attempt::Done(extract_mint(&meta, &self.reference_mint)),
                    None => Attempt::Retry("transaction has no metadata".to_string()),
                },
                Ok(None) => Attempt::Retry("transaction not found".to_string()),
                Err(e) => {
                    warn!(
                        signature = %signature,
                        attempt,
                        max = self.policy.max_attempts,
                        error = %e,
                        "transaction fetch failed"
                    );
                    Attempt::Retry(e.to_string())
                }
            }
        })
        .await;

        match outcome {
            Ok(Some(mint)) => {
                info!(signature = %signature, mint = %mint, "resolved token mint");
                Some(mint)
            }
            Ok(None) => {
                info!(signature = %signature, "no token mint in balance changes");
                None
            }
            Err(exhausted) => {
                warn!(
                    signature = %signature,
                    attempts = exhausted.attempts,
                    reason = %exhausted.last_reason,
                    "gave up resolving signature"
                );
                None
            }
        }
    }
}

/// Pick the new token out of a transaction's token balance changes.
///
/// With exactly two entries the one that is not `reference` wins; when both
/// or neither are `reference` the first entry is returned as-is. Otherwise the
/// first non-reference entry wins.
pub fn extract_mint(meta: &TransactionMeta, reference: &str) -> Option<String> {
    let balances = meta.token_balances()?;

    match balances {
        [] => None,
        [first, second] => {
            if first.mint == reference && second.mint != reference {
                Some(second.mint.clone())
            } else {
                Some(first.mint.clone())
            }
        }
        _ => balances
            .iter()
            .find(|b| b.mint != reference)
            .map(|b| b.mint.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onchain::types::{LedgerError, LedgerRecord, TokenBalance};
    use crate::onchain::WSOL_MINT;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    type Scripted = Result<Option<LedgerRecord>, LedgerError>;

    struct ScriptedLedger {
        responses: Mutex<VecDeque<Scripted>>,
        calls: AtomicU32,
    }

    impl ScriptedLedger {
        fn new(responses: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl LedgerClient for ScriptedLedger {
        async fn fetch_transaction(&self, _signature: &str) -> Result<Option<LedgerRecord>, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }
    }

    fn balance(mint: &str) -> TokenBalance {
        TokenBalance {
            mint: mint.to_string(),
            ..TokenBalance::default()
        }
    }

    fn record(post: Option<Vec<&str>>, pre: Option<Vec<&str>>) -> LedgerRecord {
        LedgerRecord {
            meta: Some(TransactionMeta {
                post_token_balances: post.map(|m| m.into_iter().map(balance).collect()),
                pre_token_balances: pre.map(|m| m.into_iter().map(balance).collect()),
            }),
            ..LedgerRecord::default()
        }
    }

    fn meta(post: Vec<&str>) -> TransactionMeta {
        record(Some(post), None).meta.unwrap()
    }

    fn resolver(ledger: Arc<ScriptedLedger>) -> IdentifierResolver {
        IdentifierResolver::new(ledger, WSOL_MINT, 3, Duration::from_millis(2000))
    }

    #[test]
    fn test_two_entries_returns_non_reference() {
        assert_eq!(extract_mint(&meta(vec![WSOL_MINT, "MINTXYZ"]), WSOL_MINT), Some("MINTXYZ".to_string()));
        assert_eq!(extract_mint(&meta(vec!["MINTXYZ", WSOL_MINT]), WSOL_MINT), Some("MINTXYZ".to_string()));
    }

    #[test]
    fn test_two_entries_both_or_neither_reference_returns_first() {
        assert_eq!(
            extract_mint(&meta(vec![WSOL_MINT, WSOL_MINT]), WSOL_MINT),
            Some(WSOL_MINT.to_string())
        );
        assert_eq!(extract_mint(&meta(vec!["AAA", "BBB"]), WSOL_MINT), Some("AAA".to_string()));
    }

    #[test]
    fn test_many_entries_first_non_reference() {
        assert_eq!(
            extract_mint(&meta(vec![WSOL_MINT, WSOL_MINT, "NEWMINT", "OTHER"]), WSOL_MINT),
            Some("NEWMINT".to_string())
        );
        assert_eq!(extract_mint(&meta(vec![WSOL_MINT, WSOL_MINT, WSOL_MINT]), WSOL_MINT), None);
        assert_eq!(extract_mint(&meta(vec!["ONLY"]), WSOL_MINT), Some("ONLY".to_string()));
        assert_eq!(extract_mint(&meta(vec![]), WSOL_MINT), None);
    }

    #[test]
    fn test_falls_back_to_pre_balances_only_when_post_absent() {
        let pre_only = record(None, Some(vec![WSOL_MINT, "PREMINT"])).meta.unwrap();
        assert_eq!(extract_mint(&pre_only, WSOL_MINT), Some("PREMINT".to_string()));

        let empty_post = record(Some(vec![]), Some(vec![WSOL_MINT, "PREMINT"])).meta.unwrap();
        assert_eq!(extract_mint(&empty_post, WSOL_MINT), None);

        assert_eq!(extract_mint(&TransactionMeta::default(), WSOL_MINT), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_on_first_attempt() {
        let ledger = ScriptedLedger::new(vec![Ok(Some(record(Some(vec![WSOL_MINT, "MINTXYZ"]), None)))]);
        let mint = resolver(ledger.clone()).resolve("SIG123").await;
        assert_eq!(mint.as_deref(), Some("MINTXYZ"));
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_missing_record_and_errors() {
        let ledger = ScriptedLedger::new(vec![
            Ok(None),
            Err(LedgerError::Rpc {
                code: -32004,
                message: "block not available".to_string(),
            }),
            Ok(Some(record(Some(vec!["MINTXYZ", WSOL_MINT]), None))),
        ]);
        let start = tokio::time::Instant::now();
        let mint = resolver(ledger.clone()).resolve("SIG123").await;

        assert_eq!(mint.as_deref(), Some("MINTXYZ"));
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_meta_retried_then_not_found() {
        let ledger = ScriptedLedger::new(vec![
            Ok(Some(LedgerRecord::default())),
            Ok(Some(LedgerRecord::default())),
            Ok(Some(LedgerRecord::default())),
        ]);
        assert_eq!(resolver(ledger.clone()).resolve("SIG123").await, None);
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_balances_are_final() {
        let ledger = ScriptedLedger::new(vec![Ok(Some(record(Some(vec![]), None)))]);
        assert_eq!(resolver(ledger.clone()).resolve("SIG123").await, None);
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_signature_skips_lookup() {
        let ledger = ScriptedLedger::new(vec![]);
        assert_eq!(resolver(ledger.clone()).resolve("   ").await, None);
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 0);
    }
}
