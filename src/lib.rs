#![deny(missing_docs)]
//! Verification of the `Signature` header of incoming HTTP requests, as described by
//! the IETF draft 'Signing HTTP Messages'
//! https://tools.ietf.org/id/draft-cavage-http-signatures-06.html
//! together with the `hs2019` algorithm name of later revisions.
//!
//! A verified request is provably from the holder of a specific key, unmodified
//! in every signed part, and was signed inside an acceptable time window.
//!
//! ## Features
//!
//! Server-specific implementations are gated by correspondingly named features.
//!
//! | Crate / Feature name                        | Notes                                              |
//! | ------------------------------------------- | -------------------------------------------------- |
//! | [rouille](https://crates.io/crates/rouille) | Build a `VerificationContext` from a request       |
//! | [ring](https://crates.io/crates/ring)       | RSA backend (default)                              |
//! | [openssl](https://crates.io/crates/openssl) | RSA backend, takes precedence over `ring`          |
//!
//! ### Supported signature algorithms:
//!
//! Algorithm registry: https://tools.ietf.org/id/draft-cavage-http-signatures-12.html#hsa-registry
//!
//! - `rsa-sha256`
//! - `hs2019` (with RSA keys)
//!
//! ### Supported digest algorithms:
//!
//! Digest registry: https://www.iana.org/assignments/http-dig-alg/http-dig-alg.xhtml
//!
//! - `SHA-256`
//!
//! ## Example usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use http_sig_verify::*;
//!
//! let public_key = std::fs::read_to_string("public.pem").unwrap();
//!
//! let mut resolver = SimpleKeyResolver::default();
//! resolver.add(
//!     "https://example.com/users/test#main-key",
//!     "https://example.com/users/test",
//!     Arc::new(RsaSha256Verify::from_pem(&public_key).unwrap()),
//! );
//! let config = VerifyingConfig::new(resolver);
//!
//! let request = VerificationContext::from_reader(&mut std::io::stdin().lock()).unwrap();
//!
//! match request.verify(&config) {
//!     VerificationOutcome::Verified { identity } => println!("Signed by {}", identity),
//!     VerificationOutcome::Failed(failure) => {
//!         println!("{} {}", failure.status_code(), failure)
//!     }
//! }
//! ```

use http::header::HeaderName;

const DATE_FORMAT: &str = "%a, %d %b %Y %T GMT";

/// Name of the `Signature` request header.
pub static SIGNATURE: HeaderName = HeaderName::from_static("signature");

#[macro_use]
mod macros;

mod algorithm;
pub use algorithm::*;

mod header;
pub use header::*;

mod params;
pub use params::*;

mod context;
pub use context::*;

mod canonicalize;
pub use canonicalize::*;

mod time_window;
pub use time_window::*;

mod digest;
pub use digest::*;

mod resolver;
pub use resolver::*;

mod verifying;
pub use verifying::*;

#[cfg(feature = "rouille")]
mod rouille_impls;
#[cfg(feature = "rouille")]
pub use rouille_impls::*;
