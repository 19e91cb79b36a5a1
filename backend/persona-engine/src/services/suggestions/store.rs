use super::behavior_builder::BehaviorPattern;
use super::Result;
use dashmap::DashMap;
use uuid::Uuid;

/// Per-user behavior pattern storage.
///
/// The engine treats a failing store like an absent pattern, so
/// implementations backed by external systems may return errors freely.
#[cfg_attr(test, mockall::automock)]
pub trait BehaviorStore: Send + Sync {
    /// Fetch the stored pattern for a user
    fn load(&self, user_id: Uuid) -> Result<Option<BehaviorPattern>>;

    /// Replace the stored pattern for `pattern.user_id`
    fn save(&self, pattern: BehaviorPattern) -> Result<()>;

    /// Remove a user's pattern; removing an absent pattern is not an error
    fn remove(&self, user_id: Uuid) -> Result<()>;
}

/// In-process store, one entry per user
#[derive(Debug, Default)]
pub struct InMemoryBehaviorStore {
    patterns: DashMap<Uuid, BehaviorPattern>,
}

impl InMemoryBehaviorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl BehaviorStore for InMemoryBehaviorStore {
    fn load(&self, user_id: Uuid) -> Result<Option<BehaviorPattern>> {
        Ok(self.patterns.get(&user_id).map(|p| p.value().clone()))
    }

    fn save(&self, pattern: BehaviorPattern) -> Result<()> {
        self.patterns.insert(pattern.user_id, pattern);
        Ok(())
    }

    fn remove(&self, user_id: Uuid) -> Result<()> {
        self.patterns.remove(&user_id);
        Ok(())
    }
}
