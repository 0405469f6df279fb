use thiserror::Error;

use crate::context::VerificationContext;
use crate::header::{Header, PseudoHeader};
use crate::params::SignatureParams;

/// The types of error which may occur whilst computing the canonical "signature string"
/// for a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CanonicalizeError {
    /// `(created)` or `(expires)` was signed with an algorithm other than `hs2019`.
    #[error("Invalid pseudo-header {header} for {algorithm}")]
    InvalidPseudoHeader {
        /// The offending pseudo-header.
        header: &'static str,
        /// The algorithm named in the signature.
        algorithm: String,
    },
    /// `(created)` or `(expires)` was signed but the matching parameter is absent.
    #[error("Pseudo-header {0} used but corresponding argument missing")]
    MissingPseudoHeaderValue(&'static str),
}

/// Configuration for computing the canonical "signature string" of a request.
#[derive(Debug, Default, Clone)]
pub struct CanonicalizeConfig {
    legacy_request_target: bool,
}

impl CanonicalizeConfig {
    /// Creates a new canonicalization configuration using the default values.
    pub fn new() -> Self {
        Self::default()
    }
    /// Returns whether `(request-target)` always uses the method `post`
    /// instead of the actual request method.
    ///
    /// This is set to `false` by default.
    pub fn legacy_request_target(&self) -> bool {
        self.legacy_request_target
    }
    /// Controls whether `(request-target)` always uses the method `post` (in-place).
    pub fn set_legacy_request_target(&mut self, legacy_request_target: bool) -> &mut Self {
        self.legacy_request_target = legacy_request_target;
        self
    }
    /// Controls whether `(request-target)` always uses the method `post`.
    pub fn with_legacy_request_target(mut self, legacy_request_target: bool) -> Self {
        self.set_legacy_request_target(legacy_request_target);
        self
    }
}

/// Opaque struct storing a computed signature string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureString {
    content: Vec<u8>,
}

impl SignatureString {
    /// Obtain a view of this signature string as a byte slice
    pub fn as_bytes(&self) -> &[u8] {
        &self.content
    }
}

impl From<SignatureString> for Vec<u8> {
    fn from(other: SignatureString) -> Self {
        other.content
    }
}

/// Multiple instances of a header are joined with `", "`.
fn header_value(ctx: &VerificationContext, header: &Header) -> Vec<u8> {
    let name = match header {
        Header::Normal(name) => name,
        Header::Pseudo(_) => return Vec::new(),
    };
    let mut value = Vec::new();
    for (i, v) in ctx.headers().get_all(name).iter().enumerate() {
        if i > 0 {
            value.extend(b", ");
        }
        value.extend(v.as_bytes());
    }
    value
}

fn pseudo_value(params: &SignatureParams, header: PseudoHeader) -> Result<&str, CanonicalizeError> {
    if !params.is_hs2019() {
        return Err(CanonicalizeError::InvalidPseudoHeader {
            header: header.as_str(),
            algorithm: params.algorithm_name().into(),
        });
    }
    let value = match header {
        PseudoHeader::Created => params.created(),
        _ => params.expires(),
    };
    value.ok_or(CanonicalizeError::MissingPseudoHeaderValue(header.as_str()))
}

/// Reconstruct the signature string covered by `params` for this request.
///
/// Lines appear in the order of the `headers` parameter and are separated by
/// `\n`. Headers which are signed but absent from the request contribute an
/// empty value.
pub fn canonicalize(
    ctx: &VerificationContext,
    params: &SignatureParams,
    config: &CanonicalizeConfig,
) -> Result<SignatureString, CanonicalizeError> {
    let mut content = Vec::new();
    for name in params.signed_headers() {
        let value = match name.parse::<Header>() {
            Ok(Header::Pseudo(PseudoHeader::RequestTarget)) => {
                let method = if config.legacy_request_target {
                    "post".to_owned()
                } else {
                    ctx.method().as_str().to_ascii_lowercase()
                };
                format!("{} {}", method, ctx.path()).into_bytes()
            }
            Ok(Header::Pseudo(pseudo)) => pseudo_value(params, pseudo)?.as_bytes().to_vec(),
            Ok(header) => header_value(ctx, &header),
            Err(_) => Vec::new(),
        };

        if !content.is_empty() {
            content.push(b'\n');
        }
        content.extend(name.as_bytes());
        content.extend(b": ");
        content.extend(value);
    }

    Ok(SignatureString { content })
}

#[cfg(test)]
mod tests {
    use http::header::{HeaderName, HeaderValue, DATE, HOST};
    use http::Method;

    use super::*;

    const BASIC_SIGNATURE_STRING: &str = "(request-target): get /foo?param=value&pet=dog\nhost: example.com\ndate: Sun, 05 Jan 2014 21:31:40 GMT";

    fn request(method: Method) -> VerificationContext {
        VerificationContext::new(method, "/foo?param=value&pet=dog")
            .with_header(HOST, HeaderValue::from_static("example.com"))
            .with_header(
                DATE,
                HeaderValue::from_static("Sun, 05 Jan 2014 21:31:40 GMT"),
            )
            .with_header(
                HeaderName::from_static("digest"),
                HeaderValue::from_static("SHA-256=X48E9qOokqqrvdts8nOJRJN3OWDUoyWxBf7kbu9DBPE="),
            )
    }

    fn params(header: &str) -> SignatureParams {
        header.parse().unwrap()
    }

    fn canonical(ctx: &VerificationContext, header: &str) -> Result<String, CanonicalizeError> {
        canonicalize(ctx, &params(header), &CanonicalizeConfig::new())
            .map(|s| String::from_utf8(s.into()).unwrap())
    }

    #[test]
    fn basic_signature_string() {
        let s = canonical(
            &request(Method::GET),
            r#"keyId="Test",algorithm="rsa-sha256",headers="(request-target) host date""#,
        )
        .unwrap();

        assert_eq!(s, BASIC_SIGNATURE_STRING);
    }

    #[test]
    fn legacy_request_target_always_uses_post() {
        let params = params(r#"algorithm="rsa-sha256",headers="(request-target)""#);
        let config = CanonicalizeConfig::new().with_legacy_request_target(true);
        let s = canonicalize(&request(Method::GET), &params, &config).unwrap();

        assert_eq!(s.as_bytes(), b"(request-target): post /foo?param=value&pet=dog");
    }

    #[test]
    fn pseudo_headers_for_hs2019() {
        let s = canonical(
            &request(Method::POST),
            r#"algorithm="hs2019",created=1700000000,expires="1700000300",headers="(created) (expires) digest""#,
        )
        .unwrap();

        assert_eq!(
            s,
            "(created): 1700000000\n(expires): 1700000300\ndigest: SHA-256=X48E9qOokqqrvdts8nOJRJN3OWDUoyWxBf7kbu9DBPE="
        );
    }

    #[test]
    fn pseudo_headers_rejected_for_rsa_sha256() {
        let err = canonical(
            &request(Method::POST),
            r#"algorithm="rsa-sha256",created=1700000000,headers="(created) date""#,
        )
        .unwrap_err();

        assert_eq!(
            err,
            CanonicalizeError::InvalidPseudoHeader {
                header: "(created)",
                algorithm: "rsa-sha256".into(),
            }
        );
        assert_eq!(err.to_string(), "Invalid pseudo-header (created) for rsa-sha256");
    }

    #[test]
    fn pseudo_header_requires_parameter() {
        let err = canonical(&request(Method::POST), r#"headers="(created) (expires)",created=1"#)
            .unwrap_err();

        assert_eq!(err, CanonicalizeError::MissingPseudoHeaderValue("(expires)"));
    }

    #[test]
    fn missing_headers_are_empty() {
        let s = canonical(
            &request(Method::POST),
            r#"algorithm="rsa-sha256",headers="Content-Type date""#,
        )
        .unwrap();

        assert_eq!(s, "content-type: \ndate: Sun, 05 Jan 2014 21:31:40 GMT");
    }

    #[test]
    fn repeated_headers_are_joined() {
        let req = http::Request::builder()
            .uri("/")
            .header("X-Example", "one")
            .header("X-Example", "two")
            .body(Vec::<u8>::new())
            .unwrap();
        let ctx = VerificationContext::from_request(&req);

        let s = canonical(&ctx, r#"algorithm="rsa-sha256",headers="x-example""#).unwrap();
        assert_eq!(s, "x-example: one, two");
    }

    #[test]
    fn output_is_deterministic() {
        let ctx = request(Method::POST);
        let header = r#"headers="(request-target) host date digest (created)",created=5"#;
        assert_eq!(canonical(&ctx, header), canonical(&ctx, header));
    }
}
