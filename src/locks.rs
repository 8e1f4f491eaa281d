use dashmap::DashSet;

/// In-process exclusion keyed by `(domain, subdomain)`.
///
/// A second attempt on a held key fails immediately instead of waiting.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    held: DashSet<(String, String)>,
}

impl KeyedLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `(domain, subdomain)`, or `None` if someone holds it.
    #[must_use]
    pub fn try_acquire(&self, domain: &str, subdomain: &str) -> Option<KeyGuard<'_>> {
        let key = (domain.to_string(), subdomain.to_string());
        self.held.insert(key.clone()).then(|| KeyGuard { locks: self, key })
    }

    #[must_use]
    pub fn is_held(&self, domain: &str, subdomain: &str) -> bool {
        self.held
            .contains(&(domain.to_string(), subdomain.to_string()))
    }
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a KeyedLocks,
    key: (String, String),
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.locks.held.remove(&self.key);
    }
}
