use std::fmt;

use ::openssl::hash::MessageDigest;
use ::openssl::pkey::{PKey, Public};
use ::openssl::rsa::{Padding, Rsa};
use ::openssl::sign::Verifier;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::{HttpSignatureVerify, InvalidKey};

/// Implementation of the verification half of the 'rsa-sha256' HTTP
/// signature scheme (RSASSA-PKCS1-v1_5 with SHA-256).
pub struct RsaSha256Verify(PKey<Public>);

impl fmt::Debug for RsaSha256Verify {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("RsaSha256Verify")
    }
}

impl RsaSha256Verify {
    /// Create a new instance of the signature scheme using the
    /// provided PKCS#1 `RSAPublicKey` DER document.
    pub fn from_der(public_key: &[u8]) -> Result<Self, InvalidKey> {
        let rsa = Rsa::public_key_from_der_pkcs1(public_key).map_err(InvalidKey::new)?;
        Ok(Self(PKey::from_rsa(rsa).map_err(InvalidKey::new)?))
    }

    /// Create a new instance of the signature scheme using the provided
    /// `-----BEGIN PUBLIC KEY-----` (SubjectPublicKeyInfo) PEM document, the
    /// format ActivityPub actors publish as `publicKeyPem`.
    pub fn from_pem(public_key: &str) -> Result<Self, InvalidKey> {
        let rsa = Rsa::public_key_from_pem(public_key.trim().as_bytes()).map_err(InvalidKey::new)?;
        Ok(Self(PKey::from_rsa(rsa).map_err(InvalidKey::new)?))
    }
}

impl HttpSignatureVerify for RsaSha256Verify {
    fn http_verify(&self, bytes_to_verify: &[u8], signature: &str) -> bool {
        let tag = match STANDARD.decode(signature.trim()) {
            Ok(tag) => tag,
            Err(_) => return false,
        };
        let mut verifier = match Verifier::new(MessageDigest::sha256(), &self.0) {
            Ok(verifier) => verifier,
            Err(_) => return false,
        };
        if verifier.set_rsa_padding(Padding::PKCS1).is_err() {
            return false;
        }
        match verifier.verify_oneshot(&tag, bytes_to_verify) {
            Ok(valid) => valid,
            Err(e) => {
                log::debug!("RSA verification error: {}", e);
                false
            }
        }
    }
}
