//! Receipt verification against the remote verification endpoint.

mod client;
mod inflight;

pub use client::{VerificationClient, VerifierConfig, DEFAULT_ENDPOINT, DEFAULT_SANDBOX_ENDPOINT};

use serde_json::Value;

use crate::error::VerificationError;
use crate::models::VerificationSession;

/// Status the endpoint returns for a valid receipt.
pub const STATUS_OK: i64 = 0;

/// Status meaning the receipt was sent to the wrong environment (a sandbox
/// receipt posted to the production endpoint). The documented protocol is to
/// retry once against the sandbox endpoint before surfacing an error.
pub const STATUS_WRONG_ENVIRONMENT: i64 = 21007;

/// Submits a receipt blob for remote verification.
///
/// The seam between the coordinator and the network; tests substitute a
/// scripted implementation.
pub trait ReceiptVerifier: Send + Sync {
    fn submit(
        &self,
        receipt: &[u8],
    ) -> impl std::future::Future<Output = Result<VerificationSession, VerificationError>> + Send;
}

/// Interpret a verification response body: check the numeric status field,
/// then parse the purchase history into a session.
///
/// Callers handle [`STATUS_WRONG_ENVIRONMENT`] before this point; any other
/// non-zero status maps to [`VerificationError::Rejected`].
pub fn session_from_body(body: Value) -> Result<VerificationSession, VerificationError> {
    let status = body
        .get("status")
        .and_then(Value::as_i64)
        .ok_or_else(|| VerificationError::InvalidSession("missing numeric status field".into()))?;

    if status != STATUS_OK {
        return Err(VerificationError::Rejected(status));
    }

    VerificationSession::from_response(body)
}
