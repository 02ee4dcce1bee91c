use thiserror::Error;

/// Errors surfaced by receipt verification.
///
/// The variants map to how the coordinator treats a failed transaction:
/// transient failures leave it open for redelivery, permanent ones are logged
/// (and optionally finalized, see `CoordinatorPolicy`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// The shared account secret was not configured. Fatal at startup,
    /// never retryable per call.
    #[error("verification shared secret is not configured")]
    MissingAccountSecret,

    /// The endpoint answered but the response shape was not usable.
    /// Treated as transient - it may reflect a server-side hiccup.
    #[error("unusable verification response: {0}")]
    InvalidSession(String),

    /// Network-level failure (connect, timeout, TLS). Transient.
    #[error("verification transport failure: {0}")]
    TransportFailure(String),

    /// The verification endpoint explicitly rejected the receipt.
    /// Permanent for this receipt.
    #[error("receipt rejected by verification endpoint (status {0})")]
    Rejected(i64),
}

impl VerificationError {
    /// Whether leaving the transaction open for host-queue redelivery can
    /// plausibly succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VerificationError::TransportFailure(_) | VerificationError::InvalidSession(_)
        )
    }
}

/// Errors from the entitlement durability layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage backend unavailable: {0}")]
    Backend(String),
}
