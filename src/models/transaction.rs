/// Error code the host queue reports when the user backed out of the
/// purchase dialog. Cancellations are suppressed from failure events.
pub const ERROR_CODE_PAYMENT_CANCELLED: i64 = 2;

/// Lifecycle state of a purchase-queue transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Purchasing,
    Purchased,
    Failed,
    Restored,
    Deferred,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchasing => "purchasing",
            Self::Purchased => "purchased",
            Self::Failed => "failed",
            Self::Restored => "restored",
            Self::Deferred => "deferred",
        }
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque reference to a host-queue transaction.
///
/// The core never inspects its contents; it is passed back unchanged on
/// finalize and compared only to guard against duplicate finalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionHandle(String);

impl TransactionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One purchase-queue event for a single product attempt.
///
/// Supplied by the host queue, not owned by the core.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub product_id: String,
    pub state: TransactionState,
    /// For restored transactions, the product identifier of the original
    /// purchase this restore refers to.
    pub original_product_id: Option<String>,
    /// Host error code for failed transactions.
    pub error_code: Option<i64>,
    pub handle: TransactionHandle,
}

impl Transaction {
    /// The product identifier that becomes entitled when this transaction
    /// settles. Restores entitle the original purchase's product.
    pub fn entitled_product_id(&self) -> &str {
        match self.state {
            TransactionState::Restored => self
                .original_product_id
                .as_deref()
                .unwrap_or(&self.product_id),
            _ => &self.product_id,
        }
    }

    /// Whether the failure was the user backing out of the purchase dialog.
    pub fn is_user_cancelled(&self) -> bool {
        self.error_code == Some(ERROR_CODE_PAYMENT_CANCELLED)
    }
}
