use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// Receipt date layout: `yyyy-MM-dd HH:mm:ss <zone>`. The zone token is
/// handled separately because the upstream service emits names like
/// `Etc/GMT` that no strftime directive parses.
const RECEIPT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Entitlement tier of a subscription product.
///
/// The tier is not carried in the verification response; it follows the
/// product-identifier naming convention where an all-access product ends in
/// a component containing `all` (e.g. `com.example.sub.allaccess`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionLevel {
    Tier1,
    TierAll,
}

impl SubscriptionLevel {
    pub fn from_product_id(product_id: &str) -> Self {
        let last = product_id.rsplit('.').next().unwrap_or(product_id);
        if last.contains("all") {
            SubscriptionLevel::TierAll
        } else {
            SubscriptionLevel::Tier1
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier1 => "tier1",
            Self::TierAll => "tier_all",
        }
    }
}

impl std::fmt::Display for SubscriptionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One subscription entitlement parsed from a verification response entry.
///
/// Immutable once constructed. One-time (non-renewing) products lack expiry
/// semantics and fail construction; callers skip those entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub product_id: String,
    pub purchase_date: DateTime<Utc>,
    pub expires_date: DateTime<Utc>,
    pub level: SubscriptionLevel,
}

impl SubscriptionRecord {
    /// Build a record from one purchase entry of a verification response.
    ///
    /// Returns `None` when required fields are missing or a date is
    /// unparsable - the entry is discarded, not treated as fatal.
    pub fn from_entry(entry: &Value) -> Option<Self> {
        let product_id = entry.get("product_id")?.as_str()?.to_string();
        let purchase_date = parse_receipt_date(entry.get("purchase_date")?.as_str()?)?;
        let expires_date = parse_receipt_date(entry.get("expires_date")?.as_str()?)?;
        let level = SubscriptionLevel::from_product_id(&product_id);

        Some(Self {
            product_id,
            purchase_date,
            expires_date,
            level,
        })
    }

    /// Whether `now` falls inside the paid window. Both ends are inclusive.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.purchase_date <= now && now <= self.expires_date
    }
}

/// Parse a receipt timestamp like `2024-01-01 00:00:00 UTC`.
///
/// Only UTC-equivalent zone tokens are accepted; anything else makes the
/// record unparsable and the entry is skipped.
fn parse_receipt_date(s: &str) -> Option<DateTime<Utc>> {
    let (datetime, zone) = s.rsplit_once(' ')?;
    if !matches!(zone, "UTC" | "GMT" | "Etc/GMT") {
        return None;
    }
    NaiveDateTime::parse_from_str(datetime, RECEIPT_DATE_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}
