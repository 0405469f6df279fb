use std::cmp::min;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use http::header::DATE;
use thiserror::Error;

use crate::context::VerificationContext;
use crate::params::SignatureParams;
use crate::DATE_FORMAT;

/// Upper bound on the lifetime of a signature, in seconds from its creation.
pub const EXPIRATION_WINDOW_LIMIT: i64 = 12 * 3600;
/// Tolerated clock drift between signer and verifier, in seconds.
pub const CLOCK_SKEW_MARGIN: i64 = 3600;
/// Lifetime of a signature which carries no `expires` parameter, in seconds.
pub const DEFAULT_EXPIRATION: i64 = 5 * 60;

/// Obsolete date formats which HTTP recipients must still accept (RFC 7231 §7.1.1.1).
const OBSOLETE_DATE_FORMATS: &[&str] = &["%A, %d-%b-%y %T GMT", "%a %b %e %T %Y"];

/// A timestamp in the request could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TimeWindowError {
    /// The `created` parameter is not a unix timestamp.
    #[error("Invalid created parameter: {0:?}")]
    InvalidCreated(String),
    /// The `expires` parameter is not a unix timestamp.
    #[error("Invalid expires parameter: {0:?}")]
    InvalidExpires(String),
    /// The `Date` header is not an HTTP date.
    #[error("Invalid Date header: {0:?}")]
    InvalidDate(String),
}

/// The validity interval claimed by a signed request, as unix timestamps.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    created: Option<i64>,
    expires: Option<i64>,
}

impl TimeWindow {
    /// Determine the claimed interval from the signature parameters and the
    /// `Date` header.
    ///
    /// `created` comes from the `created` parameter when using `hs2019`, and
    /// from the `Date` header otherwise. Without `expires`, signatures are
    /// valid for [`DEFAULT_EXPIRATION`] seconds, and never for longer than
    /// [`EXPIRATION_WINDOW_LIMIT`] seconds.
    pub fn from_request(
        ctx: &VerificationContext,
        params: &SignatureParams,
    ) -> Result<Self, TimeWindowError> {
        let created = match (params.is_hs2019(), params.created()) {
            (true, Some(created)) => Some(
                parse_timestamp(created)
                    .ok_or_else(|| TimeWindowError::InvalidCreated(created.into()))?,
            ),
            _ => match ctx.header(DATE) {
                Some(date) if !date.as_bytes().iter().all(u8::is_ascii_whitespace) => {
                    let date = date
                        .to_str()
                        .map_err(|_| TimeWindowError::InvalidDate(format!("{:?}", date)))?;
                    let parsed = parse_http_date(date)
                        .ok_or_else(|| TimeWindowError::InvalidDate(date.into()))?;
                    Some(parsed.timestamp())
                }
                _ => None,
            },
        };

        let mut expires = match params.expires() {
            Some(expires) => Some(
                parse_timestamp(expires)
                    .ok_or_else(|| TimeWindowError::InvalidExpires(expires.into()))?,
            ),
            None => created.map(|created| created.saturating_add(DEFAULT_EXPIRATION)),
        };

        if let (Some(created), Some(exp)) = (created, expires) {
            expires = Some(min(
                exp,
                created.saturating_add(EXPIRATION_WINDOW_LIMIT),
            ));
        }

        Ok(TimeWindow { created, expires })
    }

    /// Unix timestamp at which the signature was created, if known.
    pub fn created(&self) -> Option<i64> {
        self.created
    }

    /// Unix timestamp after which the signature is no longer valid, if known.
    pub fn expires(&self) -> Option<i64> {
        self.expires
    }

    /// Whether `now` falls inside the window, allowing [`CLOCK_SKEW_MARGIN`]
    /// seconds of drift at either end.
    ///
    /// A window with neither bound contains every instant.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let now = now.timestamp();
        if let Some(created) = self.created {
            if created > now.saturating_add(CLOCK_SKEW_MARGIN) {
                return false;
            }
        }
        if let Some(expires) = self.expires {
            if now > expires.saturating_add(CLOCK_SKEW_MARGIN) {
                return false;
            }
        }
        true
    }
}

/// Whether the request was signed within an acceptable time window of the
/// context's evaluation instant. Unparseable timestamps never match.
pub fn matches_time_window(ctx: &VerificationContext, params: &SignatureParams) -> bool {
    match TimeWindow::from_request(ctx, params) {
        Ok(window) => {
            if window.created.is_none() && window.expires.is_none() {
                debug!("No created time, Date header or expiry; accepting without time window");
            }
            window.contains(ctx.now())
        }
        Err(e) => {
            debug!("{}", e);
            false
        }
    }
}

/// Integer unix timestamps; a fractional part is truncated.
fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    value.parse::<i64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.abs() < i64::MAX as f64)
            .map(|v| v.trunc() as i64)
    })
}

/// Parse an HTTP date: IMF-fixdate, any RFC 2822 date, or one of the
/// obsolete RFC 850 / asctime forms.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, DATE_FORMAT) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    OBSOLETE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use http::{HeaderValue, Method};

    use super::*;

    const CREATED: i64 = 1_700_000_000;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn ctx(now: i64) -> VerificationContext {
        VerificationContext::new(Method::POST, "/inbox").at(at(now))
    }

    fn params(header: &str) -> SignatureParams {
        header.parse().unwrap()
    }

    #[test]
    fn created_and_expires_bound_the_window() {
        let p = params(r#"created="1700000000",expires="1700000300""#);
        let window = TimeWindow::from_request(&ctx(CREATED), &p).unwrap();
        assert_eq!(window.created(), Some(CREATED));
        assert_eq!(window.expires(), Some(CREATED + 300));

        assert!(matches_time_window(&ctx(CREATED + 100), &p));
        assert!(matches_time_window(&ctx(CREATED + 300 + CLOCK_SKEW_MARGIN), &p));
        assert!(!matches_time_window(&ctx(CREATED + 301 + CLOCK_SKEW_MARGIN), &p));
        assert!(matches_time_window(&ctx(CREATED - CLOCK_SKEW_MARGIN), &p));
        assert!(!matches_time_window(&ctx(CREATED - CLOCK_SKEW_MARGIN - 1), &p));
    }

    #[test]
    fn default_expiry_is_five_minutes() {
        let p = params(r#"created="1700000000""#);
        let window = TimeWindow::from_request(&ctx(CREATED), &p).unwrap();
        assert_eq!(window.expires(), Some(CREATED + DEFAULT_EXPIRATION));
    }

    #[test]
    fn expiry_is_capped_at_twelve_hours() {
        let p = params(r#"created="1700000000",expires="1800000000""#);
        let window = TimeWindow::from_request(&ctx(CREATED), &p).unwrap();
        assert_eq!(window.expires(), Some(CREATED + EXPIRATION_WINDOW_LIMIT));
        assert!(!matches_time_window(
            &ctx(CREATED + EXPIRATION_WINDOW_LIMIT + CLOCK_SKEW_MARGIN + 1),
            &p
        ));
    }

    #[test]
    fn old_created_is_rejected() {
        let p = params(r#"created="1699950000""#);
        assert!(!matches_time_window(&ctx(CREATED), &p));
    }

    #[test]
    fn created_ignored_for_rsa_sha256() {
        let p = params(r#"algorithm="rsa-sha256",created="1""#);
        let ctx = ctx(CREATED).with_header(
            DATE,
            HeaderValue::from_static("Tue, 14 Nov 2023 22:13:20 GMT"),
        );
        let window = TimeWindow::from_request(&ctx, &p).unwrap();
        assert_eq!(window.created(), Some(CREATED));
        assert!(matches_time_window(&ctx, &p));
    }

    #[test]
    fn date_header_is_used_without_created() {
        let p = params(r#"keyId="a""#);
        let ctx = ctx(CREATED + 100_000).with_header(
            DATE,
            HeaderValue::from_static("Tue, 14 Nov 2023 22:13:20 GMT"),
        );
        assert_eq!(
            TimeWindow::from_request(&ctx, &p).unwrap().created(),
            Some(CREATED)
        );
        assert!(!matches_time_window(&ctx, &p));
    }

    #[test]
    fn malformed_values_fail_closed() {
        let p = params(r#"created="yesterday""#);
        assert_eq!(
            TimeWindow::from_request(&ctx(CREATED), &p),
            Err(TimeWindowError::InvalidCreated("yesterday".into()))
        );
        assert!(!matches_time_window(&ctx(CREATED), &p));

        let p = params(r#"created="1700000000",expires="soon""#);
        assert!(!matches_time_window(&ctx(CREATED), &p));

        let p = params(r#"keyId="a""#);
        let ctx = ctx(CREATED).with_header(DATE, HeaderValue::from_static("not a date"));
        assert!(!matches_time_window(&ctx, &p));
    }

    #[test]
    fn unknown_window_passes() {
        let p = params(r#"keyId="a""#);
        let window = TimeWindow::from_request(&ctx(CREATED), &p).unwrap();
        assert_eq!(window.created(), None);
        assert_eq!(window.expires(), None);
        assert!(matches_time_window(&ctx(CREATED), &p));
    }

    #[test]
    fn expires_alone_bounds_the_window() {
        let p = params(r#"expires="1700000000""#);
        assert!(matches_time_window(&ctx(CREATED + CLOCK_SKEW_MARGIN), &p));
        assert!(!matches_time_window(&ctx(CREATED + CLOCK_SKEW_MARGIN + 1), &p));
    }

    #[test]
    fn fractional_timestamps_are_truncated() {
        assert_eq!(parse_timestamp("1700000000.75"), Some(CREATED));
        assert_eq!(parse_timestamp(" 1700000000 "), Some(CREATED));
        assert_eq!(parse_timestamp("NaN"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn parses_http_dates() {
        let expected = Some(at(CREATED));
        assert_eq!(parse_http_date("Tue, 14 Nov 2023 22:13:20 GMT"), expected);
        assert_eq!(parse_http_date("Tue, 14 Nov 2023 23:13:20 +0100"), expected);
        assert_eq!(parse_http_date("Tuesday, 14-Nov-23 22:13:20 GMT"), expected);
        assert_eq!(parse_http_date("Tue Nov 14 22:13:20 2023"), expected);
        assert_eq!(parse_http_date("14/11/2023"), None);
    }
}
