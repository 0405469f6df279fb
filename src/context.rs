use std::io::BufRead;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use http::header::{AsHeaderName, HeaderMap, HeaderName, HeaderValue, IntoHeaderName, HOST};
use http::{Method, Request};
use url::Url;

/// Immutable snapshot of an incoming request, taken once at the system
/// boundary and handed by reference to the verifier.
///
/// Header names are case-insensitive. The evaluation instant defaults to
/// the time of construction and can be pinned with [`VerificationContext::at`].
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationContext {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Vec<u8>,
    now: DateTime<Utc>,
}

impl VerificationContext {
    /// Constructs a new context for a request with no headers and an empty body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            now: Utc::now(),
        }
    }

    /// Constructs a new context from an absolute URL, setting the `Host`
    /// header from the URL's authority.
    pub fn from_url(method: Method, url: &str) -> anyhow::Result<Self> {
        let url: Url = url.parse().with_context(|| format!("{:?}", url))?;

        let path = if let Some(query) = url.query() {
            format!("{}?{}", url.path(), query)
        } else {
            url.path().into()
        };
        let mut res = Self::new(method, path);
        if let Some(host) = url.host_str() {
            let host = match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_owned(),
            };
            res = res.with_header(HOST, HeaderValue::from_str(&host)?);
        }
        Ok(res)
    }

    /// Snapshot an `http::Request`. The path includes the query string, if any.
    pub fn from_request<B: AsRef<[u8]>>(req: &Request<B>) -> Self {
        let path = req
            .uri()
            .path_and_query()
            .map_or_else(|| req.uri().path(), |pq| pq.as_str());
        Self {
            method: req.method().clone(),
            path: path.to_owned(),
            headers: req.headers().clone(),
            body: req.body().as_ref().to_vec(),
            now: Utc::now(),
        }
    }

    /// Sets a header, replacing any previous values.
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds a header value, keeping any previous values.
    pub fn with_appended_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the raw request body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Pins the instant against which time windows are evaluated.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Returns the request method.
    pub fn method(&self) -> &Method {
        &self.method
    }
    /// Returns the request path, including any query string.
    pub fn path(&self) -> &str {
        &self.path
    }
    /// Returns all request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
    /// Returns the first value of a header.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&HeaderValue> {
        self.headers.get(name)
    }
    /// Returns the first value of a header, if it is present and valid UTF-8.
    pub fn header_str<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.header(name).and_then(|v| v.to_str().ok())
    }
    /// Returns the raw request body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
    /// Returns the instant against which time windows are evaluated.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Parse a raw HTTP/1.x request (request line, headers, blank line, body).
    pub fn from_reader<R: BufRead>(reader: &mut R) -> anyhow::Result<Self> {
        let mut line = String::new();

        // Request line
        reader.read_line(&mut line)?;
        let mut parts = line.split_ascii_whitespace();

        let method: Method = parts
            .next()
            .ok_or_else(|| anyhow!("Missing request method"))?
            .parse()?;
        let path = parts
            .next()
            .ok_or_else(|| anyhow!("Missing request path"))?
            .to_owned();

        let mut headers = HeaderMap::new();
        let has_body = loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break false;
            }
            if line.trim().is_empty() {
                break true;
            }

            let (name_str, value_str) = line
                .split_once(':')
                .ok_or_else(|| anyhow!("Malformed header line {:?}", line))?;
            let name_str = name_str.trim();
            let header_name = HeaderName::from_bytes(name_str.as_bytes())
                .with_context(|| format!("{:?}", name_str))?;
            let value_str = value_str.trim();
            let header_value = HeaderValue::from_str(value_str)
                .with_context(|| format!("{:?}", value_str))?;
            headers.append(header_name, header_value);
        };

        let mut body = Vec::new();
        if has_body {
            reader.read_to_end(&mut body)?;
        }

        Ok(Self {
            method,
            path,
            headers,
            body,
            now: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use http::header::{CONTENT_TYPE, DATE};

    use super::*;

    const RAW_REQUEST: &str = "POST /users/test/inbox HTTP/1.1\r\n\
        Host: example.com\r\n\
        Date: Tue, 14 Nov 2023 22:13:20 GMT\r\n\
        Content-Type: application/activity+json\r\n\
        \r\n\
        {\"hello\": \"world\"}";

    #[test]
    fn reads_raw_request() {
        let ctx = VerificationContext::from_reader(&mut RAW_REQUEST.as_bytes()).unwrap();

        assert_eq!(ctx.method(), Method::POST);
        assert_eq!(ctx.path(), "/users/test/inbox");
        assert_eq!(ctx.header_str("host"), Some("example.com"));
        assert_eq!(ctx.header_str("HOST"), Some("example.com"));
        assert_eq!(
            ctx.header_str(DATE),
            Some("Tue, 14 Nov 2023 22:13:20 GMT")
        );
        assert_eq!(
            ctx.header_str(CONTENT_TYPE),
            Some("application/activity+json")
        );
        assert_eq!(ctx.body(), br#"{"hello": "world"}"#);
    }

    #[test]
    fn keeps_repeated_headers() {
        let ctx = VerificationContext::from_reader(
            &mut "GET / HTTP/1.1\nAccept: text/html\nAccept: application/json\n".as_bytes(),
        )
        .unwrap();

        let values: Vec<_> = ctx.headers().get_all("accept").iter().collect();
        assert_eq!(values, ["text/html", "application/json"]);
    }

    #[test]
    fn reads_request_without_body() {
        let ctx = VerificationContext::from_reader(
            &mut "GET /outbox?page=1 HTTP/1.1\nHost: example.com\n".as_bytes(),
        )
        .unwrap();

        assert_eq!(ctx.method(), Method::GET);
        assert_eq!(ctx.path(), "/outbox?page=1");
        assert!(ctx.body().is_empty());
    }

    #[test]
    fn rejects_malformed_request() {
        assert!(VerificationContext::from_reader(&mut "".as_bytes()).is_err());
        assert!(
            VerificationContext::from_reader(&mut "GET / HTTP/1.1\nno colon here\n".as_bytes())
                .is_err()
        );
    }

    #[test]
    fn url_sets_host_and_query() {
        let ctx = VerificationContext::from_url(
            Method::POST,
            "http://example.com:8080/foo?param=value&pet=dog",
        )
        .unwrap();

        assert_eq!(ctx.path(), "/foo?param=value&pet=dog");
        assert_eq!(ctx.header_str(HOST), Some("example.com:8080"));
    }

    #[test]
    fn converts_http_request() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("https://example.com/users/test?a=b")
            .header("Host", "example.com")
            .body(Vec::new())
            .unwrap();
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let ctx = VerificationContext::from_request(&req).at(now);

        assert_eq!(ctx.path(), "/users/test?a=b");
        assert_eq!(ctx.header_str("host"), Some("example.com"));
        assert_eq!(ctx.now(), now);
    }
}
