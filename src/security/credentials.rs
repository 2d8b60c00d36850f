//! Bearer credential verification.
//!
//! # Responsibilities
//! - Decode the configured RSA public key once at startup
//! - Extract the bearer token from the `Authorization` header
//! - Verify signature and time claims with clock-skew leeway
//! - Turn verified claims into an `Identity`
//!
//! # Design Decisions
//! - A bad public key is a startup failure, never a per-request error
//! - RS256, RS384 and RS512 are all accepted; anything else is rejected
//! - `exp` is mandatory; `nbf` is honoured when present
//! - Tokens are never logged beyond their first 20 characters

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::security::claims::{Claims, Identity};

const BEARER_PREFIX: &str = "Bearer ";
const LOGGED_TOKEN_CHARS: usize = 20;
const PEM_LINE_WIDTH: usize = 64;
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

/// Public key could not be loaded. Fatal at startup.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("public key material is empty")]
    Empty,

    #[error("public key is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("public key is not a valid RSA key: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

/// Per-request verification failure. Always answered with 401.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("Missing or invalid Authorization header")]
    MissingOrMalformedAuthHeader,

    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is not yet valid")]
    ClockSkewExceeded,

    #[error("Token is malformed")]
    MalformedToken,
}

impl CredentialError {
    fn from_jwt(error: &jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            ErrorKind::ExpiredSignature => CredentialError::TokenExpired,
            ErrorKind::ImmatureSignature => CredentialError::ClockSkewExceeded,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidRsaKey(_) => CredentialError::SignatureInvalid,
            _ => CredentialError::MalformedToken,
        }
    }
}

/// Decoded RSA public key, immutable after startup.
#[derive(Clone)]
pub struct PublicKey {
    decoding: DecodingKey,
    fingerprint: String,
}

impl PublicKey {
    /// Accepts PEM with or without armor lines, on one line or many.
    pub fn from_pem(material: &str) -> Result<Self, KeyError> {
        let label = if material.contains("BEGIN RSA PUBLIC KEY") {
            "RSA PUBLIC KEY"
        } else {
            "PUBLIC KEY"
        };

        let mut body = material
            .replace(&format!("-----BEGIN {}-----", label), "")
            .replace(&format!("-----END {}-----", label), "");
        body.retain(|c| !c.is_whitespace());
        if body.is_empty() {
            return Err(KeyError::Empty);
        }

        let der = STANDARD.decode(body.as_bytes())?;
        let pem = armor(label, &der);
        let decoding = DecodingKey::from_rsa_pem(pem.as_bytes())?;

        let digest = hex::encode(Sha256::digest(&der));
        Ok(Self {
            decoding,
            fingerprint: digest[..16].to_string(),
        })
    }

    /// Short SHA-256 fingerprint of the DER key, safe to log.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

fn armor(label: &str, der: &[u8]) -> String {
    let encoded = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {}-----\n", label);
    for line in encoded.as_bytes().chunks(PEM_LINE_WIDTH) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {}-----\n", label));
    pem
}

/// Verifies bearer tokens against one public key.
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    key: PublicKey,
    validation: Validation,
}

impl CredentialVerifier {
    pub fn new(key: PublicKey, clock_skew_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.leeway = clock_skew_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);
        Self { key, validation }
    }

    pub fn key(&self) -> &PublicKey {
        &self.key
    }

    /// Verify a raw token (no `Bearer ` prefix) and extract the caller.
    pub fn verify(&self, token: &str) -> Result<Identity, CredentialError> {
        let data = decode::<Claims>(token, &self.key.decoding, &self.validation).map_err(|e| {
            let error = CredentialError::from_jwt(&e);
            tracing::warn!(
                token = %redact(token),
                reason = %e,
                "Token verification failed"
            );
            error
        })?;

        Ok(Identity::from(data.claims))
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, CredentialError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(CredentialError::MissingOrMalformedAuthHeader)
}

/// First characters of a token followed by `...`, for logs.
pub fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(LOGGED_TOKEN_CHARS).collect();
    format!("{}...", prefix)
}
