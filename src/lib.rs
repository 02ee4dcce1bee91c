//! Storegate - receipt-verified entitlement engine for in-app purchases
//!
//! Storegate sits between a host purchase queue and a remote receipt
//! verification endpoint and guarantees that paid content is unlocked exactly
//! once per transaction: never before verification succeeds, and never lost
//! if the process restarts mid-verification or the network call fails.
//!
//! The pieces are wired together explicitly at startup - there are no global
//! singletons. The host registers a purchase-queue observer, forwards
//! transaction batches to [`TransactionCoordinator::handle_updated_transactions`],
//! and subscribes to the [`EventBus`] for purchase outcomes.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storegate::{EntitlementStore, EventBus, MemoryStorage};
//!
//! let events = EventBus::new(32);
//! let store = EntitlementStore::new(Arc::new(MemoryStorage::new()), events.clone());
//!
//! store.mark_purchased("com.example.app.pro").unwrap();
//! assert!(store.is_purchased("com.example.app.pro"));
//! ```
//!
//! ## Delivery guarantees
//!
//! A transaction is finalized (acknowledged to the host queue) only after the
//! entitlement has been durably recorded. Verification failures leave the
//! transaction open so the host queue redelivers it; `mark_purchased` and
//! finalize are both idempotent, which makes the redelivery path safe.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod models;
pub mod store;
pub mod util;
pub mod verify;

// Coordinator and host-queue seams
pub use coordinator::{CoordinatorPolicy, PaymentQueue, ReceiptSource, TransactionCoordinator};

// Error types
pub use error::{StoreError, VerificationError};

// Events
pub use events::{EventBus, StoreEvent};

// Models
pub use models::{
    SubscriptionLevel, SubscriptionRecord, Transaction, TransactionHandle, TransactionState,
    VerificationSession,
};

// Storage
pub use store::{EntitlementStore, FileStorage, MemoryStorage, StorageAdapter};

// Verification
pub use verify::{ReceiptVerifier, VerificationClient, VerifierConfig};

// Configuration
pub use config::Config;
