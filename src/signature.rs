//! Travis CI webhook signature verification
//!
//! Travis signs the `payload` form value with its private key
//! (RSASSA-PKCS1-v1_5 over SHA-1) and sends the base64 signature in the
//! `Signature` header. The public key is published in the `/config` document
//! of the Travis API.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use serde_json::Value;
use sha1::Sha1;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{RelayError, Result};

pub const SIGNATURE_HEADER: &str = "Signature";
const PUBLIC_KEY_POINTER: &str = "/config/notifications/webhook/public_key";

/// Public key used to check Travis notification signatures.
pub struct TravisPublicKey {
    verifying_key: VerifyingKey<Sha1>,
}

impl fmt::Debug for TravisPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TravisPublicKey").finish_non_exhaustive()
    }
}

impl TravisPublicKey {
    /// Accepts SPKI (`BEGIN PUBLIC KEY`) and PKCS#1 (`BEGIN RSA PUBLIC KEY`)
    /// PEM documents.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        let key = match RsaPublicKey::from_public_key_pem(pem) {
            Ok(key) => key,
            Err(spki_err) => RsaPublicKey::from_pkcs1_pem(pem).map_err(|pkcs1_err| {
                RelayError::KeyFetch(format!(
                    "Public key is not a valid RSA PEM (SPKI: {}; PKCS#1: {})",
                    spki_err, pkcs1_err
                ))
            })?,
        };

        Ok(Self {
            verifying_key: VerifyingKey::new(key),
        })
    }

    /// Checks a base64 signature against the payload it claims to cover.
    pub fn verify(&self, payload: &[u8], signature_b64: &str) -> Result<()> {
        let raw = STANDARD.decode(signature_b64.trim()).map_err(|e| {
            RelayError::InvalidSignature(format!("signature is not valid base64: {}", e))
        })?;
        let signature = Signature::try_from(raw.as_slice())
            .map_err(|e| RelayError::InvalidSignature(format!("malformed signature: {}", e)))?;

        self.verifying_key
            .verify(payload, &signature)
            .map_err(|_| RelayError::InvalidSignature("signature does not match payload".into()))
    }
}

/// Reads the PEM public key out of a Travis `/config` document.
pub fn extract_public_key_pem(document: &Value) -> Result<&str> {
    document
        .pointer(PUBLIC_KEY_POINTER)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            RelayError::KeyFetch(
                "response has no config.notifications.webhook.public_key".to_string(),
            )
        })
}

/// Fetches and parses the Travis public key. Called once at startup.
pub async fn fetch_travis_public_key(
    client: &reqwest::Client,
    config_url: &str,
    timeout: Duration,
) -> Result<TravisPublicKey> {
    info!("Fetching Travis CI public key from {}", config_url);

    let response = client
        .get(config_url)
        .timeout(timeout)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| RelayError::KeyFetch(format!("GET {} failed: {}", config_url, e)))?;

    let document: Value = response.json().await.map_err(|e| {
        RelayError::KeyFetch(format!("{} did not return JSON: {}", config_url, e))
    })?;

    let pem = extract_public_key_pem(&document)?;
    debug!("Travis CI public key:\n{}", pem);
    TravisPublicKey::from_pem(pem)
}
