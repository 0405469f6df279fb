use std::sync::Arc;

use http::{Method, StatusCode};
use thiserror::Error;

use crate::algorithm::{SignatureAlgorithm, UnsupportedAlgorithm};
use crate::canonicalize::{canonicalize, CanonicalizeConfig, CanonicalizeError};
use crate::context::VerificationContext;
use crate::digest::{verify_body_digest, DigestError};
use crate::params::{ParseError, SignatureParams};
use crate::resolver::{KeyResolver, ResolveError};
use crate::time_window::matches_time_window;
use crate::SIGNATURE;

/// A signed header list did not cover enough of the request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CoverageError {
    /// Neither `date` nor `(created)` was signed.
    #[error("The Date header or (created) pseudo-header must be signed")]
    DateOrCreated,
    /// Neither `digest` nor `(request-target)` was signed.
    #[error("The Digest header or (request-target) pseudo-header must be signed")]
    DigestOrRequestTarget,
    /// A GET request did not sign `host`.
    #[error("The Host header must be signed when doing a GET request")]
    HostForGet,
    /// A POST request did not sign `digest`.
    #[error("The Digest header must be signed when doing a POST request")]
    DigestForPost,
}

/// Stable classification of a verification failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum FailureKind {
    NotSigned,
    ParseError,
    MissingRequiredParameter,
    UnsupportedAlgorithm,
    TimeWindowExceeded,
    InsufficientHeaderCoverage,
    DigestHeaderMissing,
    DigestAlgorithmUnsupported,
    DigestMalformed,
    DigestMismatch,
    InvalidPseudoHeader,
    KeyNotFound,
    DomainDisallowed,
    KeyResolutionTransientError,
    SignatureMismatch,
}

/// The first check a request failed. The `Display` output is the reason
/// reported to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum VerificationFailure {
    /// There is no `Signature` header.
    #[error("Request not signed")]
    NotSigned,
    /// The `Signature` header is malformed.
    #[error("Error parsing signature parameters")]
    Parse(#[source] ParseError),
    /// `keyId` or `signature` is missing or blank.
    #[error("Incompatible request signature. keyId and signature are required")]
    MissingRequiredParameter,
    /// The algorithm is neither `rsa-sha256` nor `hs2019`.
    #[error("Unsupported signature algorithm (only rsa-sha256 and hs2019 are supported)")]
    UnsupportedAlgorithm(#[source] UnsupportedAlgorithm),
    /// The request was signed too long ago, or too far in the future.
    #[error("Signed request date outside acceptable time window")]
    TimeWindowExceeded,
    /// The signature does not cover enough of the request.
    #[error(transparent)]
    InsufficientHeaderCoverage(#[from] CoverageError),
    /// The body does not match the signed `Digest` header.
    #[error(transparent)]
    Digest(#[from] DigestError),
    /// A pseudo-header could not be reconstructed.
    #[error(transparent)]
    Canonicalize(#[from] CanonicalizeError),
    /// The resolver knows no key for this key ID.
    #[error("Public key not found for key {0}")]
    KeyNotFound(String),
    /// The resolver refuses keys from this key ID's domain.
    #[error("Public key not found for key {key_id}")]
    DomainDisallowed {
        /// The requested key ID.
        key_id: String,
        /// The refused domain.
        domain: String,
    },
    /// The resolver failed in a way that may succeed later.
    #[error("Failed to fetch remote data: {0}")]
    KeyResolution(String),
    /// The signature does not match the signature string.
    #[error("Verification failed for {identity} using rsa-sha256 (RSASSA-PKCS1-v1_5 with SHA-256)")]
    SignatureMismatch {
        /// The identity owning the resolved key.
        identity: String,
    },
}

impl VerificationFailure {
    /// Classify this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotSigned => FailureKind::NotSigned,
            Self::Parse(_) => FailureKind::ParseError,
            Self::MissingRequiredParameter => FailureKind::MissingRequiredParameter,
            Self::UnsupportedAlgorithm(_) => FailureKind::UnsupportedAlgorithm,
            Self::TimeWindowExceeded => FailureKind::TimeWindowExceeded,
            Self::InsufficientHeaderCoverage(_) => FailureKind::InsufficientHeaderCoverage,
            Self::Digest(DigestError::Missing) => FailureKind::DigestHeaderMissing,
            Self::Digest(DigestError::UnsupportedAlgorithm { .. }) => {
                FailureKind::DigestAlgorithmUnsupported
            }
            Self::Digest(DigestError::NotBase64(_)) | Self::Digest(DigestError::NotSha256(_)) => {
                FailureKind::DigestMalformed
            }
            Self::Digest(DigestError::Mismatch { .. }) => FailureKind::DigestMismatch,
            Self::Canonicalize(_) => FailureKind::InvalidPseudoHeader,
            Self::KeyNotFound(_) => FailureKind::KeyNotFound,
            Self::DomainDisallowed { .. } => FailureKind::DomainDisallowed,
            Self::KeyResolution(_) => FailureKind::KeyResolutionTransientError,
            Self::SignatureMismatch { .. } => FailureKind::SignatureMismatch,
        }
    }

    /// The HTTP status with which the request should be rejected.
    pub fn status_code(&self) -> StatusCode {
        match self {
            VerificationFailure::DomainDisallowed { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// The result of verifying a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The request was signed by the key of `identity`.
    Verified {
        /// The identity owning the key which signed the request.
        identity: String,
    },
    /// The request must be rejected.
    Failed(VerificationFailure),
}

impl VerificationOutcome {
    /// Whether the signature was verified.
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationOutcome::Verified { .. })
    }
    /// The identity which signed the request, if verified.
    pub fn identity(&self) -> Option<&str> {
        match self {
            VerificationOutcome::Verified { identity } => Some(identity),
            VerificationOutcome::Failed(_) => None,
        }
    }
    /// The failure, if not verified.
    pub fn failure(&self) -> Option<&VerificationFailure> {
        match self {
            VerificationOutcome::Verified { .. } => None,
            VerificationOutcome::Failed(failure) => Some(failure),
        }
    }
    /// The human readable failure reason, if not verified.
    pub fn failure_reason(&self) -> Option<String> {
        self.failure().map(ToString::to_string)
    }
    /// `200 OK` when verified, otherwise the status to reject the request with.
    pub fn status_code(&self) -> StatusCode {
        self.failure()
            .map_or(StatusCode::OK, VerificationFailure::status_code)
    }
    /// Convert into a `Result` carrying the verified identity.
    pub fn into_result(self) -> Result<String, VerificationFailure> {
        match self {
            VerificationOutcome::Verified { identity } => Ok(identity),
            VerificationOutcome::Failed(failure) => Err(failure),
        }
    }
}

impl From<Result<String, VerificationFailure>> for VerificationOutcome {
    fn from(other: Result<String, VerificationFailure>) -> Self {
        match other {
            Ok(identity) => VerificationOutcome::Verified { identity },
            Err(failure) => VerificationOutcome::Failed(failure),
        }
    }
}

/// The configuration used for verifying HTTP requests.
#[derive(Debug, Clone)]
pub struct VerifyingConfig {
    key_resolver: Arc<dyn KeyResolver>,
    canonicalize: CanonicalizeConfig,
}

impl VerifyingConfig {
    /// Creates a new verifying configuration using the given key resolver.
    pub fn new<KR: KeyResolver>(key_resolver: KR) -> Self {
        VerifyingConfig {
            key_resolver: Arc::new(key_resolver),
            canonicalize: CanonicalizeConfig::new(),
        }
    }

    /// Returns the key resolver.
    pub fn key_resolver(&self) -> &dyn KeyResolver {
        &*self.key_resolver
    }
    /// Returns the configuration used to rebuild signature strings.
    pub fn canonicalize_config(&self) -> &CanonicalizeConfig {
        &self.canonicalize
    }
    /// Returns whether `(request-target)` is rebuilt with the method `post`
    /// regardless of the actual request method, as some legacy senders do.
    ///
    /// This is set to `false` by default.
    pub fn legacy_request_target(&self) -> bool {
        self.canonicalize.legacy_request_target()
    }
    /// Controls whether `(request-target)` is rebuilt with the method `post` (in-place).
    ///
    /// This is set to `false` by default.
    pub fn set_legacy_request_target(&mut self, legacy_request_target: bool) -> &mut Self {
        self.canonicalize
            .set_legacy_request_target(legacy_request_target);
        self
    }
    /// Controls whether `(request-target)` is rebuilt with the method `post`.
    ///
    /// This is set to `false` by default.
    pub fn with_legacy_request_target(mut self, legacy_request_target: bool) -> Self {
        self.set_legacy_request_target(legacy_request_target);
        self
    }
}

/// Import this trait to get access to the `verify` method on
/// `VerificationContext`.
pub trait VerifyingExt {
    /// Verify the request using the given verification configuration.
    fn verify(&self, config: &VerifyingConfig) -> VerificationOutcome;
}

impl VerifyingExt for VerificationContext {
    fn verify(&self, config: &VerifyingConfig) -> VerificationOutcome {
        let outcome = VerificationOutcome::from(verify_request(self, config));
        match &outcome {
            VerificationOutcome::Verified { identity } => {
                debug!("Verified {} {} as {}", self.method(), self.path(), identity)
            }
            VerificationOutcome::Failed(failure) => info!(
                "Rejected {} {} ({}): {}",
                self.method(),
                self.path(),
                failure.status_code(),
                failure
            ),
        }
        outcome
    }
}

fn check_coverage(method: &Method, signed_headers: &[String]) -> Result<(), CoverageError> {
    let signed = |name: &str| signed_headers.iter().any(|h| h == name);

    if !signed("date") && !signed("(created)") {
        return Err(CoverageError::DateOrCreated);
    }
    if !signed("(request-target)") && !signed("digest") {
        return Err(CoverageError::DigestOrRequestTarget);
    }
    if *method == Method::GET && !signed("host") {
        return Err(CoverageError::HostForGet);
    }
    if *method == Method::POST && !signed("digest") {
        return Err(CoverageError::DigestForPost);
    }
    Ok(())
}

fn verify_request(
    ctx: &VerificationContext,
    config: &VerifyingConfig,
) -> Result<String, VerificationFailure> {
    let header = ctx
        .header(&SIGNATURE)
        .filter(|v| !v.as_bytes().iter().all(u8::is_ascii_whitespace))
        .ok_or(VerificationFailure::NotSigned)?;
    let header = String::from_utf8_lossy(header.as_bytes());

    let params = SignatureParams::parse(&header).map_err(VerificationFailure::Parse)?;

    let (key_id, signature) = match (params.key_id(), params.signature()) {
        (Some(key_id), Some(signature)) => (key_id, signature),
        _ => return Err(VerificationFailure::MissingRequiredParameter),
    };

    let algorithm: SignatureAlgorithm = params
        .algorithm_name()
        .parse()
        .map_err(VerificationFailure::UnsupportedAlgorithm)?;

    if !matches_time_window(ctx, &params) {
        return Err(VerificationFailure::TimeWindowExceeded);
    }

    let signed_headers = params.signed_headers();
    check_coverage(ctx.method(), &signed_headers)?;

    if signed_headers.iter().any(|h| h == "digest") {
        verify_body_digest(ctx)?;
    }

    let signature_string = canonicalize(ctx, &params, &config.canonicalize)?;

    debug!("Resolving {} key {}", algorithm, key_id);
    let resolved = config
        .key_resolver
        .resolve(key_id)
        .map_err(|e| match e {
            ResolveError::NotFound => VerificationFailure::KeyNotFound(key_id.into()),
            ResolveError::Disallowed { domain } => VerificationFailure::DomainDisallowed {
                key_id: key_id.into(),
                domain,
            },
            ResolveError::Transient(msg) => VerificationFailure::KeyResolution(msg),
        })?;

    if !resolved
        .key()
        .http_verify(signature_string.as_bytes(), signature)
    {
        return Err(VerificationFailure::SignatureMismatch {
            identity: resolved.identity().into(),
        });
    }

    Ok(resolved.identity().into())
}
