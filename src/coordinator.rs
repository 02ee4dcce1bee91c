//! The transaction state machine between the host purchase queue and the
//! verification endpoint.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use crate::error::VerificationError;
use crate::events::{EventBus, StoreEvent};
use crate::models::{Transaction, TransactionHandle, TransactionState};
use crate::store::EntitlementStore;
use crate::verify::ReceiptVerifier;

/// Host purchase queue acknowledgment surface.
///
/// `finalize` stops redelivery of a transaction. The coordinator guarantees
/// it is invoked at most once per handle.
pub trait PaymentQueue: Send + Sync {
    fn finalize(&self, handle: &TransactionHandle);
}

/// Host-supplied source of the opaque receipt blob.
///
/// The platform attests to the full purchase history in one signed blob; the
/// core submits it verbatim and never inspects it.
pub trait ReceiptSource: Send + Sync {
    fn load(&self) -> Option<Vec<u8>>;
}

/// Tunable policy decisions.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorPolicy {
    /// Finalize transactions whose receipt was permanently rejected by the
    /// verification endpoint instead of leaving them for endless
    /// redelivery. Off by default, favoring no-lost-entitlement over
    /// no-stuck-transaction.
    pub finalize_rejected_receipts: bool,
}

/// Consumes transaction updates from the host queue, drives verification,
/// records entitlements, and decides when a transaction may be acknowledged.
///
/// A transaction is finalized only after the entitlement is durably
/// recorded; anything less leaves it open so the host queue redelivers it.
pub struct TransactionCoordinator<V, Q> {
    verifier: V,
    store: EntitlementStore,
    queue: Q,
    receipts: Arc<dyn ReceiptSource>,
    events: EventBus,
    policy: CoordinatorPolicy,
    /// Handles already acknowledged; guards against duplicate delivery.
    /// Grows with the number of distinct terminal transactions for the
    /// process lifetime.
    finalized: StdMutex<HashSet<TransactionHandle>>,
    /// Per-product exclusion so verify + mark-purchased + finalize for one
    /// product never interleaves with itself. Entries are pruned once the
    /// last settlement for a product releases its lock.
    product_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<V, Q> TransactionCoordinator<V, Q>
where
    V: ReceiptVerifier,
    Q: PaymentQueue,
{
    pub fn new(
        verifier: V,
        store: EntitlementStore,
        queue: Q,
        receipts: Arc<dyn ReceiptSource>,
        events: EventBus,
        policy: CoordinatorPolicy,
    ) -> Self {
        Self {
            verifier,
            store,
            queue,
            receipts,
            events,
            policy,
            finalized: StdMutex::new(HashSet::new()),
            product_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Process one batch of transaction updates from the host queue.
    ///
    /// Each transaction is classified in delivery order. Purchased and
    /// restored transactions settle concurrently - verification calls may
    /// complete in any order - while the per-product lock keeps settlements
    /// for the same product serialized.
    pub async fn handle_updated_transactions(&self, transactions: &[Transaction]) {
        let mut settling = Vec::new();

        for tx in transactions {
            match tx.state {
                TransactionState::Purchasing => {
                    tracing::debug!(product_id = %tx.product_id, "purchasing, awaiting outcome");
                }
                TransactionState::Deferred => {
                    // e.g. pending parental approval; the queue will deliver
                    // a terminal state later.
                    tracing::info!(product_id = %tx.product_id, "purchase deferred");
                }
                TransactionState::Failed => self.fail(tx),
                TransactionState::Purchased | TransactionState::Restored => {
                    settling.push(self.settle(tx));
                }
            }
        }

        futures::future::join_all(settling).await;
    }

    /// Failed transactions have nothing to verify: surface the error unless
    /// the user cancelled, then acknowledge immediately.
    fn fail(&self, tx: &Transaction) {
        match tx.error_code {
            Some(code) if !tx.is_user_cancelled() => {
                tracing::warn!(product_id = %tx.product_id, code, "transaction failed");
                self.events.emit(StoreEvent::PurchaseFailed {
                    product_id: tx.product_id.clone(),
                    error_code: Some(code),
                });
            }
            Some(_) => {
                tracing::debug!(product_id = %tx.product_id, "purchase cancelled by user");
            }
            None => {
                tracing::debug!(product_id = %tx.product_id, "transaction failed without error code");
            }
        }
        self.finalize(&tx.handle);
    }

    /// Verify, record the entitlement, then acknowledge - in that order,
    /// under the product's lock.
    async fn settle(&self, tx: &Transaction) {
        let product_id = tx.entitled_product_id().to_string();

        let lock = self.product_lock(&product_id).await;
        {
            let _guard = lock.lock().await;
            self.settle_locked(tx, &product_id).await;
        }

        // Two strong references mean the map's entry and ours: no other
        // settlement for this product is waiting, drop the entry.
        let mut locks = self.product_locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&product_id);
        }
    }

    async fn settle_locked(&self, tx: &Transaction, product_id: &str) {
        // Redelivery of an already-settled transaction: the entitlement is
        // durable, only the acknowledgment may still be owed.
        if self.is_finalized(&tx.handle) {
            tracing::debug!(handle = %tx.handle, "transaction already finalized");
            return;
        }

        let Some(receipt) = self.receipts.load() else {
            // No receipt available yet; leave the transaction open and let
            // the queue redeliver once the host can produce one.
            tracing::warn!(%product_id, "no receipt available, leaving transaction open");
            return;
        };

        match self.verifier.submit(&receipt).await {
            Ok(session) => {
                if let Some(current) = session.current_subscription(chrono::Utc::now()) {
                    tracing::info!(
                        session_id = session.id(),
                        current = %current.product_id,
                        level = %current.level,
                        "verification session established"
                    );
                } else {
                    tracing::info!(
                        session_id = session.id(),
                        "verification session established, no active subscription"
                    );
                }

                match self.store.mark_purchased(product_id) {
                    Ok(_newly) => self.finalize(&tx.handle),
                    Err(e) => {
                        // Entitlement not durable: keep the transaction open
                        // so verification is re-attempted after redelivery.
                        tracing::error!(%product_id, error = %e, "failed to persist entitlement");
                    }
                }
            }
            Err(VerificationError::Rejected(code)) => {
                tracing::error!(%product_id, code, "receipt permanently rejected");
                if self.policy.finalize_rejected_receipts {
                    self.finalize(&tx.handle);
                }
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(%product_id, error = %e, "verification unavailable, awaiting redelivery");
            }
            Err(e) => {
                tracing::error!(%product_id, error = %e, "verification misconfigured");
            }
        }
    }

    fn is_finalized(&self, handle: &TransactionHandle) -> bool {
        self.finalized
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(handle)
    }

    /// Acknowledge a transaction to the host queue, exactly once per handle.
    fn finalize(&self, handle: &TransactionHandle) {
        {
            let mut done = self.finalized.lock().unwrap_or_else(|e| e.into_inner());
            if !done.insert(handle.clone()) {
                tracing::debug!(handle = %handle, "duplicate finalize suppressed");
                return;
            }
        }
        self.queue.finalize(handle);
    }

    async fn product_lock(&self, product_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.product_locks.lock().await;
        locks
            .entry(product_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
