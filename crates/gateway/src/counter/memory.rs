//! # プロセス内 Counter Store
//!
//! 開発・単一インスタンス用。インスタンス間でカウンタは共有されない。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use super::CounterStore;
use crate::storage::StorageError;

struct Entry {
    count: u64,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// TTLを遅延評価するプロセス内カウンタ。
#[derive(Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StorageError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.count))
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StorageError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        // 期限切れの項目を掃除してから加算する
        entries.retain(|_, entry| entry.is_live(now));

        let entry = entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            expires_at: now + ttl,
        });
        entry.count += 1;
        entry.expires_at = now + ttl;
        Ok(entry.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_increment_from_empty() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.increment("k", TTL).await.unwrap(), 1);
        assert_eq!(store.increment("k", TTL).await.unwrap(), 2);
        assert_eq!(store.get("k").await.unwrap(), Some(2));
        assert_eq!(store.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_resets() {
        let store = MemoryCounterStore::new();
        store.increment("k", Duration::ZERO).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.increment("k", TTL).await.unwrap(), 1);
    }
}
