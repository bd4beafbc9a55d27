//! Secure memory cache: time-boxed, activity-extended holder for the
//! unlocked private key.
//!
//! The secret lives behind a mutex, wrapped in `Zeroizing` so every removal
//! path (explicit clear, expiry, replacement, drop) wipes the buffer.
//! Expiry is sliding: real user activity pushes the deadline out; a
//! background/visibility signal collapses it to a short floor. Registered
//! expiry callbacks let dependent state react (e.g. force re-auth) — the
//! cache itself performs no UI actions.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use zeroize::Zeroizing;

type ExpiryCallback = Arc<dyn Fn() + Send + Sync>;

struct CachedSecret {
    value: Zeroizing<Vec<u8>>,
    deadline: Instant,
    timeout: Duration,
}

pub struct SecretCache {
    inner: Mutex<Option<CachedSecret>>,
    callbacks: Mutex<Vec<ExpiryCallback>>,
    /// Remaining lifetime when the application is backgrounded.
    background_floor: Duration,
}

impl Default for SecretCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretCache {
    pub fn new() -> Self {
        Self::with_background_floor(Duration::from_secs(30))
    }

    pub fn with_background_floor(floor: Duration) -> Self {
        Self {
            inner: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
            background_floor: floor,
        }
    }

    /// Cache a secret, replacing (and wiping) any previous one. Starts the
    /// expiry clock at `timeout` from now.
    pub fn store(&self, secret: Zeroizing<Vec<u8>>, timeout: Duration) {
        let mut inner = self.inner.lock().unwrap();
        *inner = Some(CachedSecret {
            value: secret,
            deadline: Instant::now() + timeout,
            timeout,
        });
        tracing::debug!(timeout_secs = timeout.as_secs(), "secret cached");
    }

    /// Copy the secret out, extending the deadline unless `extend` is false.
    /// Returns `None` if nothing is cached or the deadline has passed (in
    /// which case the secret is wiped and expiry callbacks fire).
    pub fn retrieve(&self, extend: bool) -> Option<Zeroizing<Vec<u8>>> {
        let expired = {
            let mut inner = self.inner.lock().unwrap();
            match inner.as_mut() {
                None => return None,
                Some(cached) if cached.deadline <= Instant::now() => {
                    *inner = None; // Zeroizing drop wipes
                    true
                }
                Some(cached) => {
                    if extend {
                        cached.deadline = Instant::now() + cached.timeout;
                    }
                    return Some(cached.value.clone());
                }
            }
        };
        if expired {
            self.fire_expiry_callbacks();
        }
        None
    }

    /// Observed user activity: slide the deadline without reading.
    pub fn record_activity(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cached) = inner.as_mut() {
            cached.deadline = Instant::now() + cached.timeout;
        }
    }

    pub fn is_cached(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        matches!(&*inner, Some(c) if c.deadline > Instant::now())
    }

    /// Explicit lock/logout: wipe immediately and notify.
    pub fn clear(&self) {
        let had_secret = {
            let mut inner = self.inner.lock().unwrap();
            inner.take().is_some()
        };
        if had_secret {
            tracing::debug!("secret cache cleared");
            self.fire_expiry_callbacks();
        }
    }

    /// Application moved to the background: collapse the remaining lifetime
    /// to the configured floor (never extends it).
    pub fn on_visibility_hidden(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cached) = inner.as_mut() {
            let floor_deadline = Instant::now() + self.background_floor;
            if floor_deadline < cached.deadline {
                cached.deadline = floor_deadline;
            }
        }
    }

    /// Register a callback fired whenever the secret is wiped (expiry or
    /// explicit clear).
    pub fn on_expiry(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.callbacks.lock().unwrap().push(Arc::new(callback));
    }

    /// Wipe if the deadline has passed. Returns whether an expiry happened.
    pub fn expire_if_due(&self) -> bool {
        let expired = {
            let mut inner = self.inner.lock().unwrap();
            match &*inner {
                Some(cached) if cached.deadline <= Instant::now() => {
                    *inner = None;
                    true
                }
                _ => false,
            }
        };
        if expired {
            tracing::debug!("cached secret expired");
            self.fire_expiry_callbacks();
        }
        expired
    }

    /// Background watcher loop. Runs until the task is aborted; the poll
    /// interval only bounds how late an expiry can fire, not correctness —
    /// `retrieve` checks the deadline itself.
    pub fn spawn_expiry_watcher(
        self: &Arc<Self>,
        poll: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll);
            loop {
                interval.tick().await;
                cache.expire_if_due();
            }
        })
    }

    fn fire_expiry_callbacks(&self) {
        // snapshot under the lock, invoke outside it: a callback may call
        // back into the cache (e.g. to re-register itself)
        let callbacks: Vec<ExpiryCallback> = self.callbacks.lock().unwrap().clone();
        for cb in &callbacks {
            cb();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn secret(bytes: &[u8]) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(bytes.to_vec())
    }

    #[test]
    fn store_and_retrieve() {
        let cache = SecretCache::new();
        cache.store(secret(b"private-key"), Duration::from_secs(60));
        assert!(cache.is_cached());
        assert_eq!(cache.retrieve(true).unwrap().as_slice(), b"private-key");
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let cache = SecretCache::new();
        cache.store(secret(b"k"), Duration::ZERO);
        assert!(!cache.is_cached());
        assert!(cache.retrieve(true).is_none());
    }

    #[test]
    fn clear_wipes_and_notifies() {
        let cache = SecretCache::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&fired);
        cache.on_expiry(move || {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        cache.store(secret(b"k"), Duration::from_secs(60));
        cache.clear();
        assert!(!cache.is_cached());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // clearing an empty cache does not re-fire
        cache.clear();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn replacement_overwrites_previous_secret() {
        let cache = SecretCache::new();
        cache.store(secret(b"old"), Duration::from_secs(60));
        cache.store(secret(b"new"), Duration::from_secs(60));
        assert_eq!(cache.retrieve(false).unwrap().as_slice(), b"new");
    }

    #[test]
    fn visibility_hidden_collapses_deadline() {
        let cache = SecretCache::with_background_floor(Duration::ZERO);
        cache.store(secret(b"k"), Duration::from_secs(3600));
        cache.on_visibility_hidden();
        assert!(!cache.is_cached());
        assert!(cache.expire_if_due());
    }

    #[test]
    fn visibility_hidden_never_extends() {
        let cache = SecretCache::with_background_floor(Duration::from_secs(3600));
        cache.store(secret(b"k"), Duration::ZERO);
        cache.on_visibility_hidden();
        assert!(!cache.is_cached());
    }

    #[test]
    fn expiry_fires_callbacks_once() {
        let cache = SecretCache::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&fired);
        cache.on_expiry(move || {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        cache.store(secret(b"k"), Duration::ZERO);
        assert!(cache.expire_if_due());
        assert!(!cache.expire_if_due());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_register_another_callback() {
        let cache = Arc::new(SecretCache::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let registrar = Arc::clone(&cache);
        cache.on_expiry(move || {
            let observed = Arc::clone(&counter);
            registrar.on_expiry(move || {
                observed.fetch_add(1, Ordering::SeqCst);
            });
        });

        cache.store(secret(b"k"), Duration::from_secs(60));
        cache.clear(); // must not deadlock while registering

        cache.store(secret(b"k"), Duration::from_secs(60));
        cache.clear();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn watcher_expires_in_background() {
        let cache = Arc::new(SecretCache::new());
        cache.store(secret(b"k"), Duration::from_millis(5));
        let handle = cache.spawn_expiry_watcher(Duration::from_millis(2));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!cache.is_cached());
        handle.abort();
    }
}
