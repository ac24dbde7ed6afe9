use std::time::{Duration, Instant};

use dashmap::DashMap;

/// In-process key/value store with per-entry expiry. Holds OTP codes and
/// active session tokens.
#[derive(Debug, Default)]
pub struct ExpiringCache {
    entries: DashMap<String, (String, Instant)>,
}

impl ExpiringCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ex(&self, key: impl Into<String>, ttl: Duration, value: impl Into<String>) {
        self.entries
            .insert(key.into(), (value.into(), Instant::now() + ttl));
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.1 > Instant::now() => return Some(entry.0.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn del(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn otp_key(email: &str) -> String {
    format!("otp_{email}")
}

pub fn session_key(user_id: uuid::Uuid) -> String {
    format!("auth_{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_value_until_expiry() {
        let cache = ExpiringCache::new();
        cache.set_ex("otp_a@example.com", Duration::from_secs(60), "123456");
        assert_eq!(cache.get("otp_a@example.com").as_deref(), Some("123456"));
        assert!(cache.del("otp_a@example.com"));
        assert!(cache.get("otp_a@example.com").is_none());
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = ExpiringCache::new();
        cache.set_ex("gone", Duration::ZERO, "x");
        cache.set_ex("kept", Duration::from_secs(60), "y");
        assert!(cache.get("gone").is_none());
        assert_eq!(cache.len(), 1);

        cache.set_ex("gone", Duration::ZERO, "x");
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.get("kept").as_deref(), Some("y"));
    }

    #[test]
    fn set_overwrites_previous_value() {
        let cache = ExpiringCache::new();
        cache.set_ex("auth_1", Duration::from_secs(60), "old");
        cache.set_ex("auth_1", Duration::from_secs(60), "new");
        assert_eq!(cache.get("auth_1").as_deref(), Some("new"));
    }
}
