use std::fmt::{self, Debug};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[cfg(feature = "openssl")]
mod openssl;
#[cfg(feature = "openssl")]
pub use self::openssl::*;

#[cfg(all(feature = "ring", not(feature = "openssl")))]
mod ring;
#[cfg(all(feature = "ring", not(feature = "openssl")))]
pub use self::ring::*;

/// The signature algorithms accepted in the `algorithm` parameter of a
/// `Signature` header.
///
/// Algorithm registry: https://tools.ietf.org/id/draft-cavage-http-signatures-12.html#hsa-registry
///
/// `hs2019` defers the choice of scheme to the key metadata. Only RSA keys
/// are supported, so both names resolve to RSASSA-PKCS1-v1_5 with SHA-256.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// `rsa-sha256`
    RsaSha256,
    /// `hs2019`
    Hs2019,
}

impl SignatureAlgorithm {
    /// Returns the name exactly as it appears in the `algorithm` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::RsaSha256 => "rsa-sha256",
            SignatureAlgorithm::Hs2019 => "hs2019",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `algorithm` parameter named a scheme other than `rsa-sha256` or `hs2019`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported signature algorithm: {0}")]
pub struct UnsupportedAlgorithm(pub String);

impl FromStr for SignatureAlgorithm {
    type Err = UnsupportedAlgorithm;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rsa-sha256" => Ok(SignatureAlgorithm::RsaSha256),
            "hs2019" => Ok(SignatureAlgorithm::Hs2019),
            other => Err(UnsupportedAlgorithm(other.into())),
        }
    }
}

/// A public key could not be loaded into the verification backend.
#[derive(Debug, Error)]
#[error("Invalid public key: {0}")]
pub struct InvalidKey(Box<dyn std::error::Error + Send + Sync>);

impl InvalidKey {
    #[allow(dead_code)]
    pub(crate) fn new<E: Into<Box<dyn std::error::Error + Send + Sync>>>(source: E) -> Self {
        Self(source.into())
    }
}

/// Implementations of this trait verify a signature over the canonical
/// signature string using a public key.
pub trait HttpSignatureVerify: Debug + Send + Sync + 'static {
    /// Returns true if the base64-encoded `signature` is valid for the provided
    /// content.
    ///
    /// Malformed signatures, malformed keys and internal failures of the
    /// cryptographic backend must all return `false` rather than panic.
    fn http_verify(&self, bytes_to_verify: &[u8], signature: &str) -> bool;
}

/// Implementations of this trait correspond to digest algorithms
/// listed here:
/// https://www.iana.org/assignments/http-dig-alg/http-dig-alg.xhtml
pub trait HttpDigest: Debug + Send + Sync + 'static {
    /// Must return the name exactly as specified in the above list of HTTP
    /// digest algorithms.
    fn name(&self) -> &str;
    /// Returns the encoded digest, ready for comparison with the value in the
    /// HTTP Digest header.
    fn http_digest(&self, bytes_to_digest: &[u8]) -> String;
}

impl HttpDigest for Sha256 {
    fn name(&self) -> &str {
        "SHA-256"
    }
    fn http_digest(&self, bytes_to_digest: &[u8]) -> String {
        STANDARD.encode(Self::digest(bytes_to_digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names_are_exact() {
        assert_eq!(
            "rsa-sha256".parse::<SignatureAlgorithm>().unwrap(),
            SignatureAlgorithm::RsaSha256
        );
        assert_eq!(
            "hs2019".parse::<SignatureAlgorithm>().unwrap(),
            SignatureAlgorithm::Hs2019
        );
        assert!("rsa-sha1".parse::<SignatureAlgorithm>().is_err());
        assert!("hmac-sha256".parse::<SignatureAlgorithm>().is_err());
        assert!("RSA-SHA256".parse::<SignatureAlgorithm>().is_err());
    }

    #[test]
    fn sha256_digest_is_base64() {
        assert_eq!(
            Sha256::new().http_digest(br#"{"hello": "world"}"#),
            "X48E9qOokqqrvdts8nOJRJN3OWDUoyWxBf7kbu9DBPE="
        );
        assert_eq!(
            Sha256::new().http_digest(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    const SIGNATURE_STRING: &str = "(created): 1700000000\n(expires): 1700000300\ndigest: SHA-256=X48E9qOokqqrvdts8nOJRJN3OWDUoyWxBf7kbu9DBPE=";
    const SIGNATURE: &str = "e2CoNjMpef8cgmU2SGxzx4Q9ttqtKK1XnyK0KMznL/a9l8UDtGQokm5csSySBaP+DorekPWPjhwXmKIXD5KQGjCNpMKhFakmdZ1ugVIqWwl00SBb3Bipyq2WJkKH51/zP0k7HsjMcGseiJNT+XLbk16xMYEPpKKQ3SuLJJsDpyTVPXpuzAonzZRL8mDU+eYoPafR8yWcogRlX1xmfz4/cmMZfmeVD3S9ML0Sxo+F0MylyxJsxkastNEORgK842jp2x1d53rW7WhCK5hlYlpOu7FJGnd/U9dWVHfRJWAklPwKGtE4BYndVO0Y5azbmpyruIRK6Lu0uYCdiHo5e9Clbg==";

    #[cfg(any(feature = "ring", feature = "openssl"))]
    #[test]
    fn rsa_sha256_verify() {
        let pem = RsaSha256Verify::from_pem(include_str!("../test_data/public.pem")).unwrap();
        let der = RsaSha256Verify::from_der(include_bytes!("../test_data/public_pkcs1.der")).unwrap();

        for key in [&pem, &der] {
            assert!(key.http_verify(SIGNATURE_STRING.as_bytes(), SIGNATURE));
            assert!(!key.http_verify(b"(created): 1700000000", SIGNATURE));
            assert!(!key.http_verify(SIGNATURE_STRING.as_bytes(), "not base64!"));
            assert!(!key.http_verify(SIGNATURE_STRING.as_bytes(), ""));
        }

        let other = RsaSha256Verify::from_pem(include_str!("../test_data/other_public.pem")).unwrap();
        assert!(!other.http_verify(SIGNATURE_STRING.as_bytes(), SIGNATURE));
    }

    #[cfg(any(feature = "ring", feature = "openssl"))]
    #[test]
    fn rsa_sha256_verify_1024_bit_key() {
        const SIGNATURE_1024: &str = "NJFwVj6K7/PS8VSKliKvnvUbHhwKVVc5lcT8fTjXrSMUvbQg9CIHo4inhSL3RHTDIbOo383o6YqpS/yEgTRLlpwS+qsepWGfN2tYCGr/DEuQk0fcKgW1maa2w5UocNyrzYtY77Xar59A0fed3zQLOZ6TocHuwcCvsGCLHwCI2rk=";

        let key = RsaSha256Verify::from_pem(include_str!("../test_data/public_1024.pem")).unwrap();
        assert!(key.http_verify(SIGNATURE_STRING.as_bytes(), SIGNATURE_1024));
        assert!(!key.http_verify(SIGNATURE_STRING.as_bytes(), SIGNATURE));
    }

    #[cfg(any(feature = "ring", feature = "openssl"))]
    #[test]
    fn invalid_public_keys() {
        assert!(RsaSha256Verify::from_pem("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----").is_err());
        assert!(RsaSha256Verify::from_pem("not a key").is_err());
        assert!(RsaSha256Verify::from_der(&[]).is_err());
    }
}
