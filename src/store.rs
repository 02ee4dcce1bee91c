//! Durable entitlement flags and the key-value layer beneath them.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::events::{EventBus, StoreEvent};
use crate::models::SubscriptionRecord;

/// Storage keys
pub mod keys {
    pub const ENTITLEMENTS: &str = "storegate:entitlements";
}

/// Key-value durability layer assumed available from the host environment.
///
/// `set` must not return until the value is durable; a crash after a
/// successful `set` must not lose the write.
pub trait StorageAdapter: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &str) -> Option<String>;

    /// Durably set a value by key
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value by key
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// File-based storage adapter.
///
/// Stores entitlement data in `storegate.json` within the specified
/// directory. Writes go through a temp file and an atomic rename so a crash
/// mid-write never corrupts the previous state.
pub struct FileStorage {
    path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    /// Create a new file storage in the given directory.
    ///
    /// The directory must exist and be writable. Returns `None` if it
    /// doesn't exist or isn't accessible.
    pub fn new(storage_dir: &Path) -> Option<Self> {
        if !storage_dir.is_dir() {
            return None;
        }

        let path = storage_dir.join("storegate.json");

        let cache = if path.exists() {
            let contents = std::fs::read_to_string(&path).ok()?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            HashMap::new()
        };

        Some(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    /// Persist the cache: write a sibling temp file, fsync, rename over the
    /// live file.
    fn save(&self) -> Result<(), StoreError> {
        let contents = {
            let cache = self
                .cache
                .read()
                .unwrap_or_else(|e| e.into_inner());
            serde_json::to_string_pretty(&*cache)?
        };

        let tmp = self.path.with_extension("json.tmp");
        {
            use std::io::Write;
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StorageAdapter for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache.insert(key.to_string(), value.to_string());
        }
        self.save()
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache.remove(key);
        }
        self.save()
    }
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("path", &self.path)
            .finish()
    }
}

/// In-memory storage adapter, for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageAdapter for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.map
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.map
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Durable mapping of product identifier to purchased flag.
///
/// A flag is set only after a verification session has confirmed the
/// purchase, and one-time flags never revert. Subscription products keep
/// only the fact that a purchase occurred; continued entitlement is
/// recomputed from the latest known [`SubscriptionRecord`], never read back
/// from the stored flag.
#[derive(Clone)]
pub struct EntitlementStore {
    storage: Arc<dyn StorageAdapter>,
    events: EventBus,
}

impl std::fmt::Debug for EntitlementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementStore")
            .field("storage", &"<storage>")
            .finish()
    }
}

impl EntitlementStore {
    pub fn new(storage: Arc<dyn StorageAdapter>, events: EventBus) -> Self {
        Self { storage, events }
    }

    fn load(&self) -> BTreeSet<String> {
        self.storage
            .get(keys::ENTITLEMENTS)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    /// Durably record that `product_id` has been paid for.
    ///
    /// Returns `Ok(true)` and broadcasts a [`StoreEvent::PurchaseCompleted`]
    /// when the flag is newly set. Duplicate calls are safe no-ops that do
    /// not re-broadcast, so callers on the redelivery path stay idempotent.
    /// The flag is persisted before this returns.
    pub fn mark_purchased(&self, product_id: &str) -> Result<bool, StoreError> {
        let mut entitled = self.load();
        if !entitled.insert(product_id.to_string()) {
            tracing::debug!(%product_id, "already entitled, skipping");
            return Ok(false);
        }

        let raw = serde_json::to_string(&entitled)?;
        self.storage.set(keys::ENTITLEMENTS, &raw)?;

        tracing::info!(%product_id, "entitlement recorded");
        self.events.emit(StoreEvent::PurchaseCompleted {
            product_id: product_id.to_string(),
        });
        Ok(true)
    }

    /// Whether a purchase was ever confirmed for `product_id`.
    pub fn is_purchased(&self, product_id: &str) -> bool {
        self.load().contains(product_id)
    }

    /// All product identifiers with a confirmed purchase, sorted.
    pub fn purchased_products(&self) -> Vec<String> {
        self.load().into_iter().collect()
    }

    /// Whether a subscription product is entitled right now.
    ///
    /// Requires both a confirmed purchase and an active window in the latest
    /// known record - the stored flag alone says nothing about a time-boxed
    /// product's continued entitlement.
    pub fn is_active_subscription(
        &self,
        product_id: &str,
        current: Option<&SubscriptionRecord>,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.is_purchased(product_id) {
            return false;
        }
        match current {
            Some(record) => record.product_id == product_id && record.is_active_at(now),
            None => false,
        }
    }
}
