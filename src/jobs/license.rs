//! Operating license verification.
//!
//! The license is a JSON file `{expiry_time, signer, email, signature}`. The
//! signature is a base64 ed25519 signature over the same JSON object with
//! `signature` set to the empty string, serialized in field order without
//! whitespace. A license that is missing, unsigned, forged or past
//! `expiry_time` (RFC 3339) is fatal: the gate stops authorizing swipes.

use crate::errors::{Error, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Contents of the license file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// RFC 3339 instant after which the license is void
    pub expiry_time: String,
    /// Issuer name
    pub signer: String,
    /// Issuer contact
    pub email: String,
    /// Base64 ed25519 signature
    pub signature: String,
}

impl License {
    /// Bytes covered by the signature.
    pub fn signing_payload(&self) -> Result<Vec<u8>> {
        let unsigned = Self {
            signature: String::new(),
            ..self.clone()
        };
        Ok(serde_json::to_vec(&unsigned)?)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::License {
        message: message.into(),
    }
}

fn decode_public_key(public_key: &str) -> Result<VerifyingKey> {
    let bytes = STANDARD
        .decode(public_key.trim())
        .map_err(|e| invalid(format!("public key is not base64: {e}")))?;
    let key: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| invalid("public key must be 32 bytes"))?;
    VerifyingKey::from_bytes(&key).map_err(|e| invalid(format!("invalid public key: {e}")))
}

/// Reads and verifies the license at `path` against `public_key` (base64).
///
/// # Errors
/// `Error::License` for every way the license can be unusable.
pub fn validate_license(path: &Path, public_key: &str, now: DateTime<Utc>) -> Result<License> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| invalid(format!("cannot read {}: {e}", path.display())))?;
    let license: License =
        serde_json::from_str(&raw).map_err(|e| invalid(format!("malformed license: {e}")))?;

    let verifying_key = decode_public_key(public_key)?;
    let signature_bytes = STANDARD
        .decode(license.signature.trim())
        .map_err(|e| invalid(format!("signature is not base64: {e}")))?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| invalid("signature must be 64 bytes"))?;

    verifying_key
        .verify_strict(&license.signing_payload()?, &signature)
        .map_err(|_| invalid("signature does not match"))?;

    let expiry = DateTime::parse_from_rfc3339(license.expiry_time.trim())
        .map_err(|e| invalid(format!("expiry_time {:?}: {e}", license.expiry_time)))?;
    if now > expiry {
        return Err(invalid(format!("license expired at {expiry}")));
    }

    info!("License valid until {} (signed by {})", expiry, license.signer);
    Ok(license)
}
