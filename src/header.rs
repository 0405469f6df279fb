use std::str::FromStr;

use http::header::{HeaderName, InvalidHeaderName};

/// Synthetic entries which may appear in the `headers` list of a signature
/// but which never occur as literal HTTP headers.
#[derive(Debug, Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PseudoHeader {
    /// `(request-target)`: the lowercased method and the request path.
    RequestTarget,
    /// `(created)`: the `created` signature parameter.
    Created,
    /// `(expires)`: the `expires` signature parameter.
    Expires,
}

impl PseudoHeader {
    /// Returns the name of the pseudo-header, including the parentheses.
    pub fn as_str(&self) -> &'static str {
        match self {
            PseudoHeader::RequestTarget => "(request-target)",
            PseudoHeader::Created => "(created)",
            PseudoHeader::Expires => "(expires)",
        }
    }
}

impl FromStr for PseudoHeader {
    type Err = ();
    fn from_str(s: &str) -> Result<PseudoHeader, Self::Err> {
        match s {
            "(request-target)" => Ok(PseudoHeader::RequestTarget),
            "(created)" => Ok(PseudoHeader::Created),
            "(expires)" => Ok(PseudoHeader::Expires),
            _ => Err(()),
        }
    }
}

/// An entry of the signed header list: either a pseudo-header or an
/// ordinary HTTP header name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Header {
    /// A pseudo-header such as `(request-target)`.
    Pseudo(PseudoHeader),
    /// A normal HTTP header. Header names are always lowercase.
    Normal(HeaderName),
}

impl Header {
    /// Returns the name as it appears in the canonical signature string.
    pub fn as_str(&self) -> &str {
        match self {
            Header::Pseudo(h) => h.as_str(),
            Header::Normal(h) => h.as_str(),
        }
    }
}

impl FromStr for Header {
    type Err = InvalidHeaderName;
    fn from_str(s: &str) -> Result<Header, Self::Err> {
        PseudoHeader::from_str(s)
            .map(Into::into)
            .or_else(|_| HeaderName::from_str(s).map(Into::into))
    }
}

impl From<HeaderName> for Header {
    fn from(other: HeaderName) -> Self {
        Header::Normal(other)
    }
}

impl From<PseudoHeader> for Header {
    fn from(other: PseudoHeader) -> Self {
        Header::Pseudo(other)
    }
}
