use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{CachedToken, ServicePrincipalCredential};

/// TokenCache holds one token per service principal credential.
///
/// Cloning the cache shares the underlying map, build a new one with
/// [`TokenCache::new`] to get an independent scope. Entries are only ever
/// replaced, never evicted.
///
/// The lock guards single map operations only and is never held while a token
/// is being fetched, so a slow refresh for one credential doesn't block
/// lookups for another.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    tokens: Arc<Mutex<HashMap<ServicePrincipalCredential, CachedToken>>>,
}

impl TokenCache {
    /// Create a new, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the token cached for this credential, expired or not.
    pub fn get(&self, cred: &ServicePrincipalCredential) -> Option<CachedToken> {
        self.tokens.lock().expect("lock poisoned").get(cred).cloned()
    }

    /// Store a token for this credential, replacing the previous one.
    pub fn insert(&self, cred: ServicePrincipalCredential, token: CachedToken) {
        self.tokens
            .lock()
            .expect("lock poisoned")
            .insert(cred, token);
    }

    /// Number of credentials that have a token cached.
    pub fn len(&self) -> usize {
        self.tokens.lock().expect("lock poisoned").len()
    }

    /// Returns true if no token has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
