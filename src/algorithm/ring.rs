use std::fmt;

use ::ring::signature::{UnparsedPublicKey, RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use const_oid::db::rfc5912::RSA_ENCRYPTION;
use pkcs8::{Document, SubjectPublicKeyInfoRef};

use crate::{HttpSignatureVerify, InvalidKey};

/// Implementation of the verification half of the 'rsa-sha256' HTTP
/// signature scheme (RSASSA-PKCS1-v1_5 with SHA-256). Keys must be between
/// 1024 and 8192 bits.
pub struct RsaSha256Verify(UnparsedPublicKey<Vec<u8>>);

impl fmt::Debug for RsaSha256Verify {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("RsaSha256Verify")
    }
}

impl RsaSha256Verify {
    /// Create a new instance of the signature scheme using the
    /// provided PKCS#1 `RSAPublicKey` DER document.
    pub fn from_der(public_key: &[u8]) -> Result<Self, InvalidKey> {
        if public_key.is_empty() {
            return Err(InvalidKey::new("Empty public key"));
        }
        Ok(Self(UnparsedPublicKey::new(
            &RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY,
            public_key.to_vec(),
        )))
    }

    /// Create a new instance of the signature scheme using the provided
    /// `-----BEGIN PUBLIC KEY-----` (SubjectPublicKeyInfo) PEM document, the
    /// format ActivityPub actors publish as `publicKeyPem`.
    pub fn from_pem(public_key: &str) -> Result<Self, InvalidKey> {
        let (_label, document) = Document::from_pem(public_key.trim()).map_err(InvalidKey::new)?;
        let spki: SubjectPublicKeyInfoRef<'_> = document.decode_msg().map_err(InvalidKey::new)?;

        if spki.algorithm.oid != RSA_ENCRYPTION {
            return Err(InvalidKey::new("Not an RSA public key"));
        }

        let raw_bytes = spki
            .subject_public_key
            .as_bytes()
            .ok_or_else(|| InvalidKey::new("Malformed key"))?;

        Self::from_der(raw_bytes)
    }
}

impl HttpSignatureVerify for RsaSha256Verify {
    fn http_verify(&self, bytes_to_verify: &[u8], signature: &str) -> bool {
        let tag = match STANDARD.decode(signature.trim()) {
            Ok(tag) => tag,
            Err(_) => return false,
        };
        self.0.verify(bytes_to_verify, &tag).is_ok()
    }
}
