use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use url::Url;

use crate::algorithm::HttpSignatureVerify;

/// Why a key ID could not be resolved to a public key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// No key is known for this key ID.
    #[error("Public key not found")]
    NotFound,
    /// The key belongs to a domain we refuse to interact with.
    #[error("Requests from {domain} are not allowed")]
    Disallowed {
        /// The domain of the key ID.
        domain: String,
    },
    /// The lookup failed in a way which may succeed later (network error,
    /// timeout, cancellation, host validation failure, open circuit).
    #[error("{0}")]
    Transient(String),
}

/// A public key together with the identity (actor or account) that owns it.
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    identity: String,
    key: Arc<dyn HttpSignatureVerify>,
}

impl ResolvedKey {
    /// Pair a verification key with the identity it authenticates.
    pub fn new(identity: impl Into<String>, key: Arc<dyn HttpSignatureVerify>) -> Self {
        Self {
            identity: identity.into(),
            key,
        }
    }
    /// The identity which owns the key.
    pub fn identity(&self) -> &str {
        &self.identity
    }
    /// The verification key.
    pub fn key(&self) -> &dyn HttpSignatureVerify {
        &*self.key
    }
}

/// The verification process will use this trait to find the public key
/// identified by the `keyId` of a signature.
///
/// Implementations which perform I/O are responsible for bounding it: a
/// timeout or cancellation must be reported as [`ResolveError::Transient`].
/// The verifier never retries.
pub trait KeyResolver: Debug + Send + Sync + 'static {
    /// Look up the key for `key_id`.
    fn resolve(&self, key_id: &str) -> Result<ResolvedKey, ResolveError>;
}

impl<R: KeyResolver + ?Sized> KeyResolver for Arc<R> {
    fn resolve(&self, key_id: &str) -> Result<ResolvedKey, ResolveError> {
        (**self).resolve(key_id)
    }
}

/// The domain a key ID belongs to: the part after the last `@` for
/// `acct:` URIs, the host for URLs, or the key ID itself otherwise.
pub fn key_id_domain(key_id: &str) -> String {
    if let Some(acct) = key_id.strip_prefix("acct:") {
        return acct
            .rsplit('@')
            .next()
            .unwrap_or(acct)
            .to_ascii_lowercase();
    }
    match Url::parse(key_id) {
        Ok(url) => url
            .host_str()
            .map_or_else(|| key_id.to_owned(), str::to_ascii_lowercase),
        Err(_) => key_id.to_owned(),
    }
}

/// Implementation of a simple in-memory key store with a domain block list.
#[derive(Debug, Default, Clone)]
pub struct SimpleKeyResolver {
    keys: HashMap<String, ResolvedKey>,
    blocked_domains: HashSet<String>,
}

impl SimpleKeyResolver {
    /// Initializes the key store from a list of key IDs and resolved keys.
    pub fn new<I, S>(key_iter: I) -> Self
    where
        I: IntoIterator<Item = (S, ResolvedKey)>,
        S: Into<String>,
    {
        Self {
            keys: key_iter
                .into_iter()
                .map(|(key_id, key)| (key_id.into(), key))
                .collect(),
            blocked_domains: HashSet::new(),
        }
    }

    /// Adds a key to the key store, replacing any previous key with the same ID.
    pub fn add(
        &mut self,
        key_id: &str,
        identity: &str,
        key: Arc<dyn HttpSignatureVerify>,
    ) -> &mut Self {
        self.keys
            .insert(key_id.into(), ResolvedKey::new(identity, key));
        self
    }
    /// Removes the key with the specified ID from the key store
    pub fn remove(&mut self, key_id: &str) -> &mut Self {
        self.keys.remove(key_id);
        self
    }
    /// Clears all keys from the key store
    pub fn clear(&mut self) -> &mut Self {
        self.keys.clear();
        self
    }
    /// Refuse keys from `domain` (case-insensitive).
    pub fn block_domain(&mut self, domain: &str) -> &mut Self {
        self.blocked_domains.insert(domain.to_ascii_lowercase());
        self
    }
    /// Accept keys from `domain` again.
    pub fn unblock_domain(&mut self, domain: &str) -> &mut Self {
        self.blocked_domains.remove(&domain.to_ascii_lowercase());
        self
    }
}

impl KeyResolver for SimpleKeyResolver {
    fn resolve(&self, key_id: &str) -> Result<ResolvedKey, ResolveError> {
        let domain = key_id_domain(key_id);
        if self.blocked_domains.contains(&domain) {
            return Err(ResolveError::Disallowed { domain });
        }
        self.keys.get(key_id).cloned().ok_or(ResolveError::NotFound)
    }
}

#[derive(Debug, Default)]
struct DomainState {
    failures: u32,
    opened_at: Option<Instant>,
    // A trial lookup is in flight after the cool-off
    half_open: bool,
}

impl DomainState {
    fn rejects(&self, cool_off: Duration) -> bool {
        self.opened_at
            .map_or(false, |opened_at| self.half_open || opened_at.elapsed() < cool_off)
    }
}

/// Wraps another resolver and stops consulting it for a domain after
/// repeated transient failures, until a cool-off period has passed.
///
/// The circuit for a domain opens after `threshold` consecutive transient
/// errors. While open, lookups fail immediately with a transient error. After
/// the cool-off a single lookup is let through; success closes the circuit,
/// failure opens it again.
#[derive(Debug)]
pub struct CircuitBreaker<R> {
    inner: R,
    threshold: u32,
    cool_off: Duration,
    domains: Mutex<HashMap<String, DomainState>>,
}

impl<R: KeyResolver> CircuitBreaker<R> {
    /// Wrap `inner` with a threshold of one failure and a five minute cool-off.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            threshold: 1,
            cool_off: Duration::from_secs(5 * 60),
            domains: Mutex::new(HashMap::new()),
        }
    }
    /// Sets the number of consecutive failures which opens the circuit.
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold.max(1);
        self
    }
    /// Sets how long an open circuit rejects lookups.
    pub fn with_cool_off(mut self, cool_off: Duration) -> Self {
        self.cool_off = cool_off;
        self
    }
    /// Returns the wrapped resolver.
    pub fn inner(&self) -> &R {
        &self.inner
    }
    /// Whether lookups for `domain` are currently being rejected.
    pub fn is_open(&self, domain: &str) -> bool {
        let domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
        domains
            .get(domain)
            .map_or(false, |state| state.rejects(self.cool_off))
    }

    /// Decide under the lock whether a lookup for `domain` may reach the inner
    /// resolver. Once the cool-off has passed, only the first caller is let
    /// through until its result is recorded.
    fn admit(&self, domain: &str) -> bool {
        let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
        match domains.get_mut(domain) {
            Some(state) if state.rejects(self.cool_off) => false,
            Some(state) => {
                if state.opened_at.is_some() {
                    state.half_open = true;
                }
                true
            }
            None => true,
        }
    }

    fn record(&self, domain: String, result: &Result<ResolvedKey, ResolveError>) {
        let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Err(ResolveError::Transient(_)) => {
                let state = domains.entry(domain).or_default();
                state.failures += 1;
                state.half_open = false;
                if state.failures >= self.threshold {
                    log::warn!("Opening circuit after {} failed key lookups", state.failures);
                    state.opened_at = Some(Instant::now());
                }
            }
            _ => {
                domains.remove(&domain);
            }
        }
    }
}

impl<R: KeyResolver> KeyResolver for CircuitBreaker<R> {
    fn resolve(&self, key_id: &str) -> Result<ResolvedKey, ResolveError> {
        let domain = key_id_domain(key_id);
        if !self.admit(&domain) {
            return Err(ResolveError::Transient(format!(
                "Too many failed requests to {}, not retrying yet",
                domain
            )));
        }

        let result = self.inner.resolve(key_id);
        self.record(domain, &result);
        result
    }
}
