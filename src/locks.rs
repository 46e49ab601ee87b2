use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Process-local expiring lock map. Acquisition is non-blocking: a caller
/// that fails to acquire simply backs off. Correctness never depends on
/// these locks; the store is the durable coordination point.
#[derive(Clone, Default)]
pub struct Locks {
    inner: Arc<Mutex<HashMap<String, Instant>>>,
}

pub const TOPIC_CREATE_TTL: Duration = Duration::from_secs(5);
pub const INBOX_TTL: Duration = Duration::from_secs(3);

impl Locks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take `key` for `ttl`. Returns false if another holder's lease
    /// has not yet expired. Expired entries count as free.
    pub fn try_acquire(&self, key: &str, ttl: Duration) -> bool {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        map.retain(|_, deadline| *deadline > now);
        if map.contains_key(key) {
            return false;
        }
        map.insert(key.to_string(), now + ttl);
        true
    }

    pub fn release(&self, key: &str) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(key);
    }
}

pub fn topic_create_key(user_id: i64) -> String {
    format!("topic_create:{user_id}")
}

pub fn inbox_key(user_id: i64) -> String {
    format!("inbox:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let locks = Locks::new();
        assert!(locks.try_acquire("topic_create:1", TOPIC_CREATE_TTL));
        assert!(!locks.try_acquire("topic_create:1", TOPIC_CREATE_TTL));
        locks.release("topic_create:1");
        assert!(locks.try_acquire("topic_create:1", TOPIC_CREATE_TTL));
    }

    #[test]
    fn expired_lease_counts_as_free() {
        let locks = Locks::new();
        assert!(locks.try_acquire("inbox:7", Duration::from_millis(0)));
        assert!(locks.try_acquire("inbox:7", INBOX_TTL));
    }

    #[test]
    fn keys_are_independent() {
        let locks = Locks::new();
        assert!(locks.try_acquire(&topic_create_key(1), TOPIC_CREATE_TTL));
        assert!(locks.try_acquire(&topic_create_key(2), TOPIC_CREATE_TTL));
        assert!(locks.try_acquire(&inbox_key(1), INBOX_TTL));
    }
}
