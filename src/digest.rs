use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::header::HeaderName;
use itertools::Itertools;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::algorithm::HttpDigest;
use crate::context::VerificationContext;

/// Name of the `Digest` request header.
pub static DIGEST: HeaderName = HeaderName::from_static("digest");

/// The only digest algorithm accepted as proof of body integrity.
const SHA_256: &str = "sha-256";

/// The body of a request did not match its `Digest` header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DigestError {
    /// `digest` was signed but the request has no `Digest` header.
    #[error("Digest header missing")]
    Missing,
    /// The `Digest` header carries no SHA-256 entry.
    #[error("Only SHA-256 is supported in Digest header. Offered algorithms: {offered}")]
    UnsupportedAlgorithm {
        /// Comma separated list of the algorithms found in the header.
        offered: String,
    },
    /// The SHA-256 entry is not valid base64.
    #[error("Invalid Digest value. The provided Digest value is not a valid base64 string. Given digest: {0}")]
    NotBase64(String),
    /// The SHA-256 entry does not decode to 32 bytes.
    #[error("Invalid Digest value. The provided Digest value is not a SHA-256 digest. Given digest: {0}")]
    NotSha256(String),
    /// The body hashes to a different value.
    #[error("Invalid Digest value. Computed SHA-256 digest: {computed}; given: {given}")]
    Mismatch {
        /// Digest of the received body.
        computed: String,
        /// Digest claimed by the request.
        given: String,
    },
}

/// Parse a `Digest` header into `(algorithm, value)` pairs. Algorithm names
/// are lowercased; entries without `=` have an empty value.
pub fn parse_digest_header(value: &str) -> Vec<(String, &str)> {
    value
        .split(',')
        .map(|part| {
            let (alg, digest) = part.split_once('=').unwrap_or((part, ""));
            (alg.trim().to_ascii_lowercase(), digest.trim())
        })
        .collect()
}

/// Check the raw request body against the SHA-256 entry of the `Digest` header.
///
/// Malformed values are reported before the body is hashed.
pub fn verify_body_digest(ctx: &VerificationContext) -> Result<(), DigestError> {
    let values = ctx.headers().get_all(&DIGEST);
    if values.iter().next().is_none() {
        return Err(DigestError::Missing);
    }
    // Repeated header lines form a single list
    let header = values
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
        .join(", ");
    let digests = parse_digest_header(&header);

    let given = digests
        .iter()
        .find(|(alg, _)| alg == SHA_256)
        .map(|(_, value)| *value)
        .ok_or_else(|| DigestError::UnsupportedAlgorithm {
            offered: digests.iter().map(|(alg, _)| alg).join(", "),
        })?;

    let decoded = STANDARD
        .decode(given)
        .map_err(|_| DigestError::NotBase64(given.into()))?;
    if decoded.len() != 32 {
        return Err(DigestError::NotSha256(given.into()));
    }

    let computed = Sha256::new().http_digest(ctx.body());
    if computed.as_bytes().ct_eq(given.as_bytes()).into() {
        Ok(())
    } else {
        Err(DigestError::Mismatch {
            computed,
            given: given.into(),
        })
    }
}
