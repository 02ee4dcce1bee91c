//! Test fixtures shared by the storegate integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use storegate::verify::session_from_body;
use storegate::{
    EntitlementStore, EventBus, MemoryStorage, PaymentQueue, ReceiptSource, ReceiptVerifier,
    Transaction, TransactionHandle, TransactionState, VerificationError, VerificationSession,
};

/// Install a log subscriber so `RUST_LOG` controls test output. Safe to
/// call from every test; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub const SUB_MONTHLY: &str = "com.example.app.sub.monthly";
pub const SUB_ALL: &str = "com.example.app.sub.allaccess";
pub const CONSUMABLE: &str = "com.example.app.consumable";

/// A verification-response purchase entry in the upstream wire format.
pub fn entry(product_id: &str, purchase_date: &str, expires_date: &str) -> Value {
    json!({
        "product_id": product_id,
        "purchase_date": purchase_date,
        "expires_date": expires_date,
    })
}

/// A successful verification response carrying the given `in_app` entries.
pub fn receipt_body(entries: Vec<Value>) -> Value {
    json!({
        "status": 0,
        "receipt": { "in_app": entries },
    })
}

/// Parse a canned response body into a session, as the client would.
pub fn session_from(entries: Vec<Value>) -> VerificationSession {
    session_from_body(receipt_body(entries)).expect("canned response should parse")
}

/// Entitlement store backed by in-memory storage, plus its event bus.
pub fn memory_store() -> (EntitlementStore, EventBus) {
    let events = EventBus::new(32);
    let store = EntitlementStore::new(Arc::new(MemoryStorage::new()), events.clone());
    (store, events)
}

/// Scripted verifier: pops one result per submit, panics when exhausted.
pub struct MockVerifier {
    results: Mutex<VecDeque<Result<VerificationSession, VerificationError>>>,
    calls: AtomicUsize,
}

impl MockVerifier {
    pub fn with_results(results: Vec<Result<VerificationSession, VerificationError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Verifier that answers every submit with an empty successful session.
    pub fn always_ok(calls: usize) -> Self {
        let results = (0..calls)
            .map(|_| Ok(session_from(vec![])))
            .collect();
        Self::with_results(results)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReceiptVerifier for &MockVerifier {
    async fn submit(&self, _receipt: &[u8]) -> Result<VerificationSession, VerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Suspend mid-verification so concurrently settling transactions
        // genuinely overlap at an await point.
        tokio::task::yield_now().await;
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .expect("mock verifier ran out of scripted results")
    }
}

/// Host queue that records every finalize call.
#[derive(Default)]
pub struct RecordingQueue {
    finalized: Mutex<Vec<TransactionHandle>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finalized(&self) -> Vec<TransactionHandle> {
        self.finalized.lock().unwrap().clone()
    }
}

impl PaymentQueue for &RecordingQueue {
    fn finalize(&self, handle: &TransactionHandle) {
        self.finalized.lock().unwrap().push(handle.clone());
    }
}

/// Receipt source returning a fixed blob.
pub struct StaticReceipt(pub Vec<u8>);

impl ReceiptSource for StaticReceipt {
    fn load(&self) -> Option<Vec<u8>> {
        Some(self.0.clone())
    }
}

/// Receipt source for hosts that cannot produce a receipt yet.
pub struct NoReceipt;

impl ReceiptSource for NoReceipt {
    fn load(&self) -> Option<Vec<u8>> {
        None
    }
}

pub fn purchased(product_id: &str, handle: &str) -> Transaction {
    Transaction {
        product_id: product_id.to_string(),
        state: TransactionState::Purchased,
        original_product_id: None,
        error_code: None,
        handle: TransactionHandle::new(handle),
    }
}

pub fn restored(product_id: &str, original: Option<&str>, handle: &str) -> Transaction {
    Transaction {
        product_id: product_id.to_string(),
        state: TransactionState::Restored,
        original_product_id: original.map(str::to_string),
        error_code: None,
        handle: TransactionHandle::new(handle),
    }
}

pub fn failed(product_id: &str, error_code: Option<i64>, handle: &str) -> Transaction {
    Transaction {
        product_id: product_id.to_string(),
        state: TransactionState::Failed,
        original_product_id: None,
        error_code,
        handle: TransactionHandle::new(handle),
    }
}
