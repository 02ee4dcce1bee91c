use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::VerificationError;
use crate::models::VerificationSession;
use crate::verify::inflight::Inflight;
use crate::verify::{session_from_body, ReceiptVerifier, STATUS_WRONG_ENVIRONMENT};

/// Production verification endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://buy.itunes.apple.com/verifyReceipt";

/// Sandbox endpoint, consulted when the primary reports the
/// wrong-environment status.
pub const DEFAULT_SANDBOX_ENDPOINT: &str = "https://sandbox.itunes.apple.com/verifyReceipt";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for [`VerificationClient`].
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub endpoint: String,
    pub sandbox_endpoint: String,
    /// Per-app shared secret issued by the verification service.
    pub shared_secret: String,
    /// Upper bound on one verification round trip. The upstream protocol
    /// specifies no timeout; timeouts classify as transport failures.
    pub timeout: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            sandbox_endpoint: DEFAULT_SANDBOX_ENDPOINT.to_string(),
            shared_secret: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct VerifyRequest {
    #[serde(rename = "receipt-data")]
    receipt_data: String,
    password: String,
}

/// HTTP client for the remote verification endpoint.
///
/// At most one remote call is in flight per distinct receipt blob (keyed by
/// SHA-256 digest); a concurrent submit for the same blob joins the
/// outstanding call instead of issuing a duplicate request.
#[derive(Debug)]
pub struct VerificationClient {
    http: reqwest::Client,
    endpoint: String,
    sandbox_endpoint: String,
    shared_secret: String,
    inflight: Inflight<[u8; 32], Result<VerificationSession, VerificationError>>,
}

impl VerificationClient {
    /// Build a client. Fails fast with
    /// [`VerificationError::MissingAccountSecret`] when no shared secret is
    /// configured - a per-call retry can never fix that.
    pub fn new(config: &VerifierConfig) -> Result<Self, VerificationError> {
        if config.shared_secret.is_empty() {
            return Err(VerificationError::MissingAccountSecret);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("storegate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VerificationError::TransportFailure(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            sandbox_endpoint: config.sandbox_endpoint.clone(),
            shared_secret: config.shared_secret.clone(),
            inflight: Inflight::new(),
        })
    }

    async fn post_receipt(
        &self,
        url: &str,
        body: &VerifyRequest,
    ) -> Result<Value, VerificationError> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| VerificationError::TransportFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VerificationError::TransportFailure(format!(
                "verification endpoint returned HTTP {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| VerificationError::InvalidSession(e.to_string()))
    }

    async fn submit_uncoalesced(
        &self,
        receipt: &[u8],
    ) -> Result<VerificationSession, VerificationError> {
        let request = VerifyRequest {
            receipt_data: BASE64.encode(receipt),
            password: self.shared_secret.clone(),
        };

        let mut body = self.post_receipt(&self.endpoint, &request).await?;

        // A sandbox receipt posted to the production endpoint answers with
        // the wrong-environment status; the documented protocol is one retry
        // against the sandbox endpoint.
        if body.get("status").and_then(Value::as_i64) == Some(STATUS_WRONG_ENVIRONMENT) {
            tracing::info!("receipt is for the sandbox environment, retrying there");
            body = self.post_receipt(&self.sandbox_endpoint, &request).await?;
        }

        let session = session_from_body(body)?;
        tracing::debug!(
            session_id = session.id(),
            subscriptions = session.subscriptions().len(),
            "verification succeeded"
        );
        Ok(session)
    }
}

impl ReceiptVerifier for VerificationClient {
    async fn submit(&self, receipt: &[u8]) -> Result<VerificationSession, VerificationError> {
        let digest: [u8; 32] = Sha256::digest(receipt).into();
        self.inflight
            .run(digest, self.submit_uncoalesced(receipt))
            .await
    }
}
