//! In-process atomic store
//!
//! A mutex-guarded map with the same contract as the Redis backend. One
//! coarse lock makes every operation, and every pipeline, atomic with
//! respect to concurrent callers. Intended for tests and single-process
//! setups; expired entries are purged lazily on access.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::Result;
use crate::store::{AtomicStore, StoreOp, StoreValue};

#[derive(Clone, Debug)]
enum EntryValue {
    Text(String),
    SortedSet(HashMap<String, f64>),
}

#[derive(Clone, Debug)]
struct Entry {
    value: EntryValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn text(value: &str) -> Self {
        Entry {
            value: EntryValue::Text(value.to_string()),
            expires_at: None,
        }
    }

    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

type Entries = HashMap<String, Entry>;

/// In-memory implementation of [`AtomicStore`]
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn purge(entries: &mut Entries, key: &str) {
    if entries.get(key).is_some_and(Entry::expired) {
        entries.remove(key);
    }
}

fn get_text(entries: &mut Entries, key: &str) -> Option<String> {
    purge(entries, key);
    match entries.get(key) {
        Some(Entry {
            value: EntryValue::Text(text),
            ..
        }) => Some(text.clone()),
        _ => None,
    }
}

fn set_text(entries: &mut Entries, key: &str, value: &str) {
    entries.insert(key.to_string(), Entry::text(value));
}

fn delete(entries: &mut Entries, key: &str) -> bool {
    purge(entries, key);
    entries.remove(key).is_some()
}

/// Missing or non-numeric values count as 0
fn incr_by(entries: &mut Entries, key: &str, delta: f64) -> f64 {
    purge(entries, key);
    let current = match entries.get(key) {
        Some(Entry {
            value: EntryValue::Text(text),
            ..
        }) => text.parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    let updated = current + delta;
    let ttl = entries.get(key).and_then(|e| e.expires_at);
    entries.insert(
        key.to_string(),
        Entry {
            value: EntryValue::Text(updated.to_string()),
            expires_at: ttl,
        },
    );
    updated
}

fn expire(entries: &mut Entries, key: &str, ttl: Duration) -> bool {
    purge(entries, key);
    match entries.get_mut(key) {
        Some(entry) => {
            entry.expires_at = Some(Instant::now() + ttl);
            true
        }
        None => false,
    }
}

fn sorted_set<'a>(entries: &'a mut Entries, key: &str) -> Option<&'a mut HashMap<String, f64>> {
    purge(entries, key);
    match entries.get_mut(key) {
        Some(Entry {
            value: EntryValue::SortedSet(members),
            ..
        }) => Some(members),
        _ => None,
    }
}

fn zrem_range_by_score(entries: &mut Entries, key: &str, min: f64, max: f64) -> u64 {
    match sorted_set(entries, key) {
        Some(members) => {
            let before = members.len();
            members.retain(|_, score| *score < min || *score > max);
            (before - members.len()) as u64
        }
        None => 0,
    }
}

fn zadd(entries: &mut Entries, key: &str, score: f64, member: &str) {
    purge(entries, key);
    let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
        value: EntryValue::SortedSet(HashMap::new()),
        expires_at: None,
    });
    if let EntryValue::SortedSet(members) = &mut entry.value {
        members.insert(member.to_string(), score);
    }
}

fn zcard(entries: &mut Entries, key: &str) -> u64 {
    match sorted_set(entries, key) {
        Some(members) => members.len() as u64,
        None => 0,
    }
}

fn exec(entries: &mut Entries, op: &StoreOp) -> StoreValue {
    match op {
        StoreOp::Get(key) => match get_text(entries, key) {
            Some(text) => StoreValue::Text(text),
            None => StoreValue::Nil,
        },
        StoreOp::Set(key, value) => {
            set_text(entries, key, value);
            StoreValue::Nil
        }
        StoreOp::Delete(key) => StoreValue::Int(delete(entries, key) as i64),
        StoreOp::IncrBy(key, delta) => StoreValue::Float(incr_by(entries, key, *delta)),
        StoreOp::ZRemRangeByScore { key, min, max } => {
            StoreValue::Int(zrem_range_by_score(entries, key, *min, *max) as i64)
        }
        StoreOp::ZAdd { key, score, member } => {
            zadd(entries, key, *score, member);
            StoreValue::Int(1)
        }
        StoreOp::ZCard(key) => StoreValue::Int(zcard(entries, key) as i64),
        StoreOp::Expire { key, ttl } => StoreValue::Int(expire(entries, key, *ttl) as i64),
    }
}

#[async_trait::async_trait]
impl AtomicStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock();
        purge(&mut entries, key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: EntryValue::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(get_text(&mut self.entries.lock(), key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        set_text(&mut self.entries.lock(), key, value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(delete(&mut self.entries.lock(), key))
    }

    async fn incr_by(&self, key: &str, delta: f64) -> Result<f64> {
        Ok(incr_by(&mut self.entries.lock(), key, delta))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool> {
        let mut entries = self.entries.lock();
        let current = get_text(&mut entries, key);
        if current.as_deref() == expected {
            set_text(&mut entries, key, new);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut entries = self.entries.lock();
        if get_text(&mut entries, key).as_deref() == Some(expected) {
            entries.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        Ok(expire(&mut self.entries.lock(), key, ttl))
    }

    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        Ok(zrem_range_by_score(&mut self.entries.lock(), key, min, max))
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        zadd(&mut self.entries.lock(), key, score, member);
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        Ok(zcard(&mut self.entries.lock(), key))
    }

    async fn pipeline(&self, ops: &[StoreOp]) -> Result<Vec<StoreValue>> {
        // One lock acquisition for the whole batch keeps it atomic to
        // other callers, mirroring MULTI/EXEC.
        let mut entries = self.entries.lock();
        Ok(ops.iter().map(|op| exec(&mut entries, op)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent() {
        let store = MemoryStore::new();
        assert!(
            store
                .set_if_absent("k", "v1", Duration::from_secs(10))
                .await
                .unwrap()
        );
        assert!(
            !store
                .set_if_absent("k", "v2", Duration::from_secs(10))
                .await
                .unwrap()
        );
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_set_if_absent_expires() {
        let store = MemoryStore::new();
        assert!(
            store
                .set_if_absent("k", "v", Duration::from_millis(20))
                .await
                .unwrap()
        );
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(
            store
                .set_if_absent("k", "v2", Duration::from_secs(10))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_incr_decr() {
        let store = MemoryStore::new();
        assert_eq!(store.incr_by("n", 3.0).await.unwrap(), 3.0);
        assert_eq!(store.incr_by("n", 1.5).await.unwrap(), 4.5);
        assert_eq!(store.decr_by("n", 2.0).await.unwrap(), 2.5);
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = MemoryStore::new();

        // expected-absent swap
        assert!(store.compare_and_swap("k", None, "a").await.unwrap());
        // stale expectation loses
        assert!(!store.compare_and_swap("k", None, "b").await.unwrap());
        assert!(!store.compare_and_swap("k", Some("z"), "b").await.unwrap());
        // matching expectation wins
        assert!(store.compare_and_swap("k", Some("a"), "b").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_delete_if_equals() {
        let store = MemoryStore::new();
        store.set("k", "token-1").await.unwrap();
        assert!(!store.delete_if_equals("k", "token-2").await.unwrap());
        assert!(store.delete_if_equals("k", "token-1").await.unwrap());
        assert!(!store.delete_if_equals("k", "token-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_sorted_set_ops() {
        let store = MemoryStore::new();
        store.zadd("log", 100.0, "a").await.unwrap();
        store.zadd("log", 101.0, "b").await.unwrap();
        store.zadd("log", 105.0, "c").await.unwrap();
        assert_eq!(store.zcard("log").await.unwrap(), 3);

        let removed = store
            .zrem_range_by_score("log", f64::NEG_INFINITY, 101.0)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.zcard("log").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pipeline_order_and_results() {
        let store = MemoryStore::new();
        let results = store
            .pipeline(&[
                StoreOp::ZAdd {
                    key: "log".into(),
                    score: 10.0,
                    member: "m1".into(),
                },
                StoreOp::ZAdd {
                    key: "log".into(),
                    score: 20.0,
                    member: "m2".into(),
                },
                StoreOp::ZRemRangeByScore {
                    key: "log".into(),
                    min: f64::NEG_INFINITY,
                    max: 10.0,
                },
                StoreOp::ZCard("log".into()),
                StoreOp::Expire {
                    key: "log".into(),
                    ttl: Duration::from_secs(10),
                },
            ])
            .await
            .unwrap();

        assert_eq!(results[2], StoreValue::Int(1));
        assert_eq!(results[3], StoreValue::Int(1));
        assert_eq!(results[4], StoreValue::Int(1));
    }

    #[tokio::test]
    async fn test_pipeline_text_ops() {
        let store = MemoryStore::new();
        let results = store
            .pipeline(&[
                StoreOp::Set("k".into(), "1".into()),
                StoreOp::IncrBy("k".into(), 2.5),
                StoreOp::Get("k".into()),
                StoreOp::Delete("k".into()),
                StoreOp::Get("k".into()),
            ])
            .await
            .unwrap();

        assert_eq!(results[1], StoreValue::Float(3.5));
        assert_eq!(results[2], StoreValue::Text("3.5".to_string()));
        assert_eq!(results[3], StoreValue::Int(1));
        assert_eq!(results[4], StoreValue::Nil);
    }

    #[tokio::test]
    async fn test_expire_missing_key() {
        let store = MemoryStore::new();
        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
    }
}
