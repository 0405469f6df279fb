use std::collections::btree_map::{self, BTreeMap};
use std::str::FromStr;

use thiserror::Error;

use crate::algorithm::SignatureAlgorithm;

/// Old versions of node-http-signature prepend the auth scheme to the header value.
const LEGACY_PREFIX: &str = "Signature ";

/// The `Signature` header could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Expected {expected} at offset {offset} of signature header")]
pub struct ParseError {
    offset: usize,
    expected: &'static str,
}

impl ParseError {
    /// Byte offset into the header value at which parsing failed.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// The key/value parameters of a `Signature` header.
///
/// Parameter names are case-sensitive. When a name occurs more than once
/// the last value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureParams {
    params: BTreeMap<String, String>,
}

impl SignatureParams {
    /// Parse the raw value of a `Signature` header.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut parser = Parser { input, pos: 0 };
        let mut params = BTreeMap::new();

        parser.skip_whitespace();
        if parser.eat(LEGACY_PREFIX) {
            parser.skip_whitespace();
        }

        loop {
            let (key, value) = parser.param()?;
            params.insert(key, value);

            parser.skip_whitespace();
            if parser.rest().is_empty() {
                break;
            }
            parser.expect(",", "`,`")?;
            parser.skip_whitespace();
        }

        Ok(Self { params })
    }

    /// Returns the raw value of a parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Returns the value of a parameter, treating whitespace-only values as absent.
    fn non_blank(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.trim().is_empty())
    }

    /// The `keyId` parameter, if present and not blank.
    pub fn key_id(&self) -> Option<&str> {
        self.non_blank("keyId")
    }

    /// The base64 `signature` parameter, if present and not blank.
    pub fn signature(&self) -> Option<&str> {
        self.non_blank("signature")
    }

    /// The `algorithm` parameter, defaulting to `hs2019`.
    pub fn algorithm_name(&self) -> &str {
        self.get("algorithm")
            .unwrap_or_else(|| SignatureAlgorithm::Hs2019.as_str())
    }

    /// Whether the (possibly defaulted) algorithm is `hs2019`.
    pub fn is_hs2019(&self) -> bool {
        self.algorithm_name() == SignatureAlgorithm::Hs2019.as_str()
    }

    /// The `created` parameter, if present and not blank.
    pub fn created(&self) -> Option<&str> {
        self.non_blank("created")
    }

    /// The `expires` parameter, if present and not blank.
    pub fn expires(&self) -> Option<&str> {
        self.non_blank("expires")
    }

    /// The lowercased list of signed headers, in declaration order.
    ///
    /// Defaults to `(created)` for `hs2019` and `date` otherwise.
    pub fn signed_headers(&self) -> Vec<String> {
        let default = if self.is_hs2019() { "(created)" } else { "date" };
        self.get("headers")
            .unwrap_or(default)
            .to_ascii_lowercase()
            .split_whitespace()
            .map(ToOwned::to_owned)
            .collect()
    }

    /// Iterate over all parameters, ordered by name.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.params.iter()
    }
}

impl FromStr for SignatureParams {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'a> IntoIterator for &'a SignatureParams {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+.^_`|~-".contains(c)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn error(&self, expected: &'static str) -> ParseError {
        ParseError {
            offset: self.pos,
            expected,
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, literal: &str) -> bool {
        if self.rest().starts_with(literal) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, literal: &str, expected: &'static str) -> Result<(), ParseError> {
        if self.eat(literal) {
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn token(&mut self) -> Result<&'a str, ParseError> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !is_token_char(c))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("token"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn quoted_string(&mut self) -> Result<String, ParseError> {
        self.expect("\"", "`\"`")?;
        let mut value = String::new();
        let mut chars = self.rest().chars();
        loop {
            let c = chars.next().ok_or_else(|| self.error("closing `\"`"))?;
            self.pos += c.len_utf8();
            match c {
                '"' => return Ok(value),
                '\\' => {
                    let escaped = chars
                        .next()
                        .ok_or_else(|| self.error("escaped character"))?;
                    self.pos += escaped.len_utf8();
                    value.push(escaped);
                }
                c => value.push(c),
            }
        }
    }

    fn param(&mut self) -> Result<(String, String), ParseError> {
        let key = self.token()?.to_owned();
        self.skip_whitespace();
        self.expect("=", "`=`")?;
        self.skip_whitespace();
        let value = if self.rest().starts_with('"') {
            self.quoted_string()?
        } else {
            self.token()?.to_owned()
        };
        Ok((key, value))
    }
}
