use super::SuggestionSet;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const MAX_TTL_SECS: u64 = (i64::MAX / 1000) as u64;

/// Cached suggestion set
#[derive(Debug, Clone)]
struct CachedSuggestions {
    user_id: Uuid,
    set: Arc<SuggestionSet>,
    cached_at: DateTime<Utc>,
    ttl: Duration,
}

impl CachedSuggestions {
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.cached_at) >= self.ttl
    }
}

/// Suggestion sets keyed by (user, context), expired lazily on read
#[derive(Debug)]
pub struct SuggestionCache {
    entries: DashMap<String, CachedSuggestions>,
    ttl: Duration,
}

impl SuggestionCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            // chrono caps durations at i64::MAX milliseconds
            ttl: Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
        }
    }

    pub fn key(user_id: Uuid, context_key: &str) -> String {
        format!("{}:{}", user_id, context_key)
    }

    /// Live entry for `key` at `now`; an expired entry is dropped
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<Arc<SuggestionSet>> {
        let hit = self.entries.get(key).map(|entry| {
            if entry.is_expired_at(now) {
                None
            } else {
                Some(Arc::clone(&entry.set))
            }
        })?;

        if hit.is_none() {
            self.entries
                .remove_if(key, |_, entry| entry.is_expired_at(now));
            debug!(key = %key, "Suggestion cache entry expired");
        }
        hit
    }

    pub fn insert(&self, key: String, user_id: Uuid, set: Arc<SuggestionSet>, now: DateTime<Utc>) {
        self.entries.insert(
            key,
            CachedSuggestions {
                user_id,
                set,
                cached_at: now,
                ttl: self.ttl,
            },
        );
    }

    /// Drop every cached set for `user_id`, returns how many were removed
    pub fn invalidate_user(&self, user_id: Uuid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.user_id != user_id);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(user_id = %user_id, removed = removed, "Suggestion cache invalidated");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(user_id: Uuid, now: DateTime<Utc>) -> Arc<SuggestionSet> {
        Arc::new(SuggestionSet {
            user_id,
            suggestions: Vec::new(),
            fallback: false,
            generated_at: now,
        })
    }

    #[test]
    fn test_entry_expires_at_ttl() {
        let cache = SuggestionCache::new(300);
        let user = Uuid::new_v4();
        let now = Utc::now();
        let key = SuggestionCache::key(user, "ctx");
        let cached = set(user, now);
        cache.insert(key.clone(), user, Arc::clone(&cached), now);

        let hit = cache.get(&key, now + Duration::seconds(299)).unwrap();
        assert!(Arc::ptr_eq(&hit, &cached));
        assert!(cache.get(&key, now + Duration::seconds(300)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_only_touches_one_user() {
        let cache = SuggestionCache::new(300);
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        cache.insert(SuggestionCache::key(alice, "a"), alice, set(alice, now), now);
        cache.insert(SuggestionCache::key(alice, "b"), alice, set(alice, now), now);
        cache.insert(SuggestionCache::key(bob, "a"), bob, set(bob, now), now);

        assert_eq!(cache.invalidate_user(alice), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&SuggestionCache::key(bob, "a"), now).is_some());
    }
}
