use std::io::Read;

use anyhow::{anyhow, Context};
use http::header::{HeaderName, HeaderValue};
use http::Method;

use crate::context::VerificationContext;

impl VerificationContext {
    /// Snapshot a rouille request. The request body is consumed, so this can
    /// only be done once per request; the body remains available through
    /// [`VerificationContext::body`].
    pub fn from_rouille(req: &rouille::Request) -> anyhow::Result<Self> {
        let method: Method = req
            .method()
            .parse()
            .with_context(|| format!("{:?}", req.method()))?;

        let mut res = Self::new(method, req.raw_url());
        for (name, value) in req.headers() {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("{:?}", name))?;
            let header_value =
                HeaderValue::from_str(value).with_context(|| format!("{:?}", value))?;
            res = res.with_appended_header(header_name, header_value);
        }

        let mut body = Vec::new();
        req.data()
            .ok_or_else(|| anyhow!("Request body was already consumed"))?
            .read_to_end(&mut body)
            .context("Failed to read request body")?;

        Ok(res.with_body(body))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{RsaSha256Verify, SimpleKeyResolver, VerifyingConfig, VerifyingExt};

    #[test]
    fn it_works() {
        let mut resolver = SimpleKeyResolver::default();
        resolver.add(
            "https://example.com/users/test#main-key",
            "https://example.com/users/test",
            Arc::new(RsaSha256Verify::from_pem(include_str!("../test_data/public.pem")).unwrap()),
        );
        let config = VerifyingConfig::new(resolver);

        let request = rouille::Request::fake_http(
            "POST",
            "/users/test/inbox",
            vec![
                ("Host".into(), "example.com".into()),
                ("Content-Type".into(), "application/activity+json".into()),
                ("Date".into(), "Tue, 14 Nov 2023 22:13:20 GMT".into()),
                ("Digest".into(), "SHA-256=X48E9qOokqqrvdts8nOJRJN3OWDUoyWxBf7kbu9DBPE=".into()),
                ("Signature".into(), "keyId=\"https://example.com/users/test#main-key\",algorithm=\"rsa-sha256\",headers=\"(request-target) host date digest\",signature=\"tD6zjCq4dWCuo0lEAuJ5kP4iG1wtz3ErpWn0LkzGtV52f7Nk8CT/oTQ2QNvly3OqeEEuqkAxy6R4VgTD4FaO+oNJEsrwdk/oi3Z/01DAccKFtXUJ3Uhx4gBf3uhMSKHzHjIO1UQCR8RjkKtZgI+Y6EfJCcxUl4zyIx7KxOYdnZFYl/7jWkJSrbJGfkBWkSHmJNwbahw83zZgeg3anw2TcQpZnWDuXg+IIiB/4oMXb1Q4eF4JJMkvLjlVBH+XpVYW4cs9QGmbliIdJq8/rZX2tYAzGbXxS9hTbYbloujSJsPWc8WHKt+OO+ZvUR91KECYf+eWxX7fUH13mWdIvljIIw==\"".into()),
            ],
            br#"{"hello": "world"}"#[..].into(),
        );

        let ctx = VerificationContext::from_rouille(&request)
            .unwrap()
            .at(Utc.timestamp_opt(1_700_000_100, 0).unwrap());

        assert_eq!(ctx.method(), Method::POST);
        assert_eq!(ctx.path(), "/users/test/inbox");
        assert_eq!(ctx.header_str("content-type"), Some("application/activity+json"));
        assert_eq!(ctx.body(), br#"{"hello": "world"}"#);
        assert_eq!(
            ctx.verify(&config).identity(),
            Some("https://example.com/users/test")
        );
    }

    #[test]
    fn body_can_only_be_taken_once() {
        let request = rouille::Request::fake_http("GET", "/outbox?page=2", vec![], Vec::new());

        let ctx = VerificationContext::from_rouille(&request).unwrap();
        assert_eq!(ctx.path(), "/outbox?page=2");
        assert!(ctx.body().is_empty());

        assert!(VerificationContext::from_rouille(&request).is_err());
    }
}
