use std::env;
use std::time::Duration;

use crate::coordinator::CoordinatorPolicy;
use crate::verify::{
    VerificationClient, VerifierConfig, DEFAULT_ENDPOINT, DEFAULT_SANDBOX_ENDPOINT,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub verify_endpoint: String,
    pub verify_sandbox_endpoint: String,
    /// Shared account secret for the verification endpoint. Missing or empty
    /// is a fatal configuration error, surfaced when the client is built.
    pub verify_shared_secret: String,
    pub verify_timeout_secs: u64,
    /// Directory the entitlement file lives in.
    pub entitlements_dir: String,
    pub finalize_rejected_receipts: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            verify_endpoint: env::var("VERIFY_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            verify_sandbox_endpoint: env::var("VERIFY_SANDBOX_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_SANDBOX_ENDPOINT.to_string()),
            verify_shared_secret: env::var("VERIFY_SHARED_SECRET").unwrap_or_default(),
            verify_timeout_secs: env::var("VERIFY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            entitlements_dir: env::var("ENTITLEMENTS_DIR").unwrap_or_else(|_| ".".to_string()),
            finalize_rejected_receipts: env::var("FINALIZE_REJECTED_RECEIPTS")
                .map(|v| v == "1" || v == "true")
                .unwrap_or(false),
        }
    }

    pub fn verifier(&self) -> VerifierConfig {
        VerifierConfig {
            endpoint: self.verify_endpoint.clone(),
            sandbox_endpoint: self.verify_sandbox_endpoint.clone(),
            shared_secret: self.verify_shared_secret.clone(),
            timeout: Duration::from_secs(self.verify_timeout_secs),
        }
    }

    /// Build the verification client from this configuration.
    pub fn verification_client(&self) -> Result<VerificationClient, crate::VerificationError> {
        VerificationClient::new(&self.verifier())
    }

    pub fn policy(&self) -> CoordinatorPolicy {
        CoordinatorPolicy {
            finalize_rejected_receipts: self.finalize_rejected_receipts,
        }
    }
}
