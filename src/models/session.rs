use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::VerificationError;
use crate::models::SubscriptionRecord;

/// The result of one successful remote verification call.
///
/// Created once per call, never mutated afterwards, and retained only long
/// enough to answer the immediate caller - there is no session history.
#[derive(Debug, Clone)]
pub struct VerificationSession {
    id: String,
    raw: Arc<Value>,
    subscriptions: Vec<SubscriptionRecord>,
}

impl VerificationSession {
    /// Build a session from a parsed verification response body.
    ///
    /// The purchase-history list is taken from the top-level
    /// `latest_receipt_info` array when present (it reflects renewal state),
    /// falling back to `receipt.in_app`. Entries that fail record
    /// construction - one-time products without expiry semantics - are
    /// silently skipped. A response with neither array yields a session with
    /// zero subscriptions.
    pub fn from_response(raw: Value) -> Result<Self, VerificationError> {
        if !raw.is_object() {
            return Err(VerificationError::InvalidSession(
                "response body is not a JSON object".into(),
            ));
        }

        let entries = raw
            .get("latest_receipt_info")
            .and_then(Value::as_array)
            .or_else(|| {
                raw.get("receipt")
                    .and_then(|r| r.get("in_app"))
                    .and_then(Value::as_array)
            });

        let subscriptions = entries
            .map(|purchases| {
                purchases
                    .iter()
                    .filter_map(SubscriptionRecord::from_entry)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            raw: Arc::new(raw),
            subscriptions,
        })
    }

    /// Unique session identifier. Equality of sessions is equality of ids.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The verification response this session was parsed from.
    pub fn raw_response(&self) -> &Value {
        &self.raw
    }

    /// Subscription records in response order.
    pub fn subscriptions(&self) -> &[SubscriptionRecord] {
        &self.subscriptions
    }

    /// The single entitlement in force at `now`: among active records, the
    /// one with the latest purchase date. Equal purchase dates are broken
    /// deterministically - the lexicographically smallest product id wins -
    /// so selection is reproducible.
    pub fn current_subscription(&self, now: DateTime<Utc>) -> Option<&SubscriptionRecord> {
        self.subscriptions
            .iter()
            .filter(|s| s.is_active_at(now))
            .max_by(|a, b| {
                a.purchase_date
                    .cmp(&b.purchase_date)
                    .then_with(|| b.product_id.cmp(&a.product_id))
            })
    }
}

impl PartialEq for VerificationSession {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for VerificationSession {}
