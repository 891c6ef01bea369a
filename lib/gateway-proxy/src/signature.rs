//! Request signing proving the gateway's identity to downstream agents
//!
//! The signed message is `"{user_id}\n{METHOD}\n{path}\n{timestamp}"`. Agents
//! recompute it from the forwarded request and check it against the public key
//! carried alongside the signature.

use crate::error::{ProxyError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use gateway_core::{CoreError, SignatureService, UserId};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::Method;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const SIGNATURE_HEADER: HeaderName = HeaderName::from_static("x-gateway-signature");
pub const PUBLIC_KEY_HEADER: HeaderName = HeaderName::from_static("x-gateway-publickey");
pub const TIMESTAMP_HEADER: HeaderName = HeaderName::from_static("x-gateway-timestamp");
pub const PRINCIPAL_HEADER: HeaderName = HeaderName::from_static("x-gateway-principal");

/// Headers owned by the gateway. Inbound copies are always discarded.
pub const SIGNED_HEADERS: [HeaderName; 4] = [SIGNATURE_HEADER, PUBLIC_KEY_HEADER, TIMESTAMP_HEADER, PRINCIPAL_HEADER];

/// Process-lifetime Ed25519 key pair
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Fresh key from a random 32-byte seed
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Key from a hex encoded 32-byte seed, surrounding whitespace ignored
    pub fn from_hex(seed: &str) -> gateway_core::Result<Self> {
        let bytes = hex::decode(seed.trim()).map_err(|e| CoreError::SigningKeyUnavailable(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::SigningKeyUnavailable("seed must be 32 bytes".to_string()))?;
        Ok(Self::from_seed(seed))
    }

    /// Short hex digest of the public key, safe to log
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.key.verifying_key().as_bytes());
        hex::encode(&digest[..8])
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl SignatureService for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> gateway_core::Result<String> {
        Ok(STANDARD.encode(self.key.sign(message).to_bytes()))
    }

    fn public_key(&self) -> String {
        STANDARD.encode(self.key.verifying_key().as_bytes())
    }
}

pub fn canonical_message(user_id: UserId, method: &Method, path: &str, timestamp: i64) -> String {
    format!("{}\n{}\n{}\n{}", user_id, method.as_str(), path, timestamp)
}

/// Remove every gateway-owned header a caller may have sent
pub fn strip_signature_headers(headers: &mut HeaderMap) {
    for name in SIGNED_HEADERS.iter() {
        headers.remove(name);
    }
}

/// Sign a request and attach the signature headers
pub fn sign_request(
    headers: &mut HeaderMap,
    signer: &dyn SignatureService,
    user_id: UserId,
    method: &Method,
    path: &str,
    timestamp: i64,
) -> Result<()> {
    let message = canonical_message(user_id, method, path, timestamp);
    let signature = signer
        .sign(message.as_bytes())
        .map_err(|e| ProxyError::Signature(e.to_string()))?;

    let values = [
        (SIGNATURE_HEADER, signature),
        (PUBLIC_KEY_HEADER, signer.public_key()),
        (TIMESTAMP_HEADER, timestamp.to_string()),
        (PRINCIPAL_HEADER, user_id.to_string()),
    ];
    for (name, value) in values {
        let value = HeaderValue::from_str(&value).map_err(|e| ProxyError::Signature(e.to_string()))?;
        headers.insert(name, value);
    }
    Ok(())
}

/// Check the signature headers of a forwarded request, returning the signed principal
pub fn verify_request(headers: &HeaderMap, method: &Method, path: &str) -> Result<UserId> {
    let header = |name: &HeaderName| -> Result<&str> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ProxyError::Signature(format!("missing {} header", name)))
    };

    let signature = decode(header(&SIGNATURE_HEADER)?)?;
    let public_key = decode(header(&PUBLIC_KEY_HEADER)?)?;
    let timestamp: i64 = header(&TIMESTAMP_HEADER)?
        .parse()
        .map_err(|_| ProxyError::Signature("invalid timestamp".to_string()))?;
    let user_id: u32 = header(&PRINCIPAL_HEADER)?
        .parse()
        .map_err(|_| ProxyError::Signature("invalid principal".to_string()))?;
    let user_id = UserId(user_id);

    let public_key: [u8; 32] = public_key
        .try_into()
        .map_err(|_| ProxyError::Signature("public key must be 32 bytes".to_string()))?;
    let signature: [u8; 64] = signature
        .try_into()
        .map_err(|_| ProxyError::Signature("signature must be 64 bytes".to_string()))?;

    let verifying_key = VerifyingKey::from_bytes(&public_key).map_err(|e| ProxyError::Signature(e.to_string()))?;
    let message = canonical_message(user_id, method, path, timestamp);
    verifying_key
        .verify(message.as_bytes(), &Signature::from_bytes(&signature))
        .map_err(|e| ProxyError::Signature(e.to_string()))?;

    Ok(user_id)
}

fn decode(value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| ProxyError::Signature(format!("invalid base64: {}", e)))
}
