use super::{ClaimOutcome, GuardedClaim, KeyValueStore, KvError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    String(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

/// Process-local [`KeyValueStore`].
///
/// Used when no Redis URL is configured: thread and message handles then
/// survive only as long as the process. Every operation runs under one lock,
/// which gives the same atomicity as the Redis implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Drop `key` if it has expired and return the live entry, if any.
fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries
        .get(key)
        .and_then(|e| e.expires_at)
        .is_some_and(|at| at <= now)
    {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn wrong_type(key: &str) -> KvError {
    KvError::Corrupt {
        key: key.to_owned(),
        reason: "operation against a key holding the wrong kind of value".to_owned(),
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::String(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_owned(),
            Entry {
                value: Value::String(value.to_owned()),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, key).is_some())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, KvError> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(h),
                ..
            }) => Ok(h.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hash_set(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<(), KvError> {
        let mut entries = self.entries.lock().await;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        match live(&mut entries, key) {
            Some(entry) => {
                let Value::Hash(hash) = &mut entry.value else {
                    return Err(wrong_type(key));
                };
                for (field, value) in fields {
                    hash.insert((*field).to_owned(), value.clone());
                }
                if expires_at.is_some() {
                    entry.expires_at = expires_at;
                }
            }
            None => {
                let hash = fields
                    .iter()
                    .map(|(f, v)| ((*f).to_owned(), v.clone()))
                    .collect();
                entries.insert(
                    key.to_owned(),
                    Entry {
                        value: Value::Hash(hash),
                        expires_at,
                    },
                );
            }
        }
        Ok(())
    }

    async fn hash_update(&self, key: &str, fields: &[(&str, String)]) -> Result<bool, KvError> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            None => Ok(false),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => {
                for (field, value) in fields {
                    hash.insert((*field).to_owned(), value.clone());
                }
                Ok(true)
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(s),
                ..
            }) => {
                let mut members: Vec<String> = s.iter().cloned().collect();
                members.sort();
                Ok(members)
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            None => Ok(false),
            Some(Entry {
                value: Value::Set(s),
                ..
            }) => Ok(s.contains(member)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, KvError> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::List(l),
                ..
            }) => Ok(l.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn guarded_claim(&self, claim: &GuardedClaim<'_>) -> Result<ClaimOutcome, KvError> {
        let mut entries = self.entries.lock().await;

        let (count, ttl_deadline) = match live(&mut entries, claim.counter_key) {
            None => return Ok(ClaimOutcome::Missing),
            Some(Entry {
                value: Value::Hash(h),
                expires_at,
            }) => {
                if h.get(claim.active_field).map(String::as_str) != Some("1") {
                    return Ok(ClaimOutcome::Inactive);
                }
                let count = match h.get(claim.counter_field) {
                    None => 0,
                    Some(raw) => raw.parse::<u32>().map_err(|e| KvError::Corrupt {
                        key: claim.counter_key.to_owned(),
                        reason: e.to_string(),
                    })?,
                };
                (count, *expires_at)
            }
            Some(_) => return Err(wrong_type(claim.counter_key)),
        };

        let already = match live(&mut entries, claim.set_key) {
            None => false,
            Some(Entry {
                value: Value::Set(s),
                ..
            }) => s.contains(claim.member),
            Some(_) => return Err(wrong_type(claim.set_key)),
        };
        if already {
            return Ok(ClaimOutcome::AlreadyMember);
        }
        if count >= claim.limit {
            return Ok(ClaimOutcome::LimitReached);
        }

        let next = count + 1;
        if let Some(Entry {
            value: Value::Hash(h),
            ..
        }) = entries.get_mut(claim.counter_key)
        {
            h.insert(claim.counter_field.to_owned(), next.to_string());
        }

        let set = entries
            .entry(claim.set_key.to_owned())
            .or_insert_with(|| Entry {
                value: Value::Set(HashSet::new()),
                expires_at: None,
            });
        if let Value::Set(s) = &mut set.value {
            s.insert(claim.member.to_owned());
        }
        if ttl_deadline.is_some() {
            set.expires_at = ttl_deadline;
        }

        let log = entries
            .entry(claim.log_key.to_owned())
            .or_insert_with(|| Entry {
                value: Value::List(Vec::new()),
                expires_at: None,
            });
        match &mut log.value {
            Value::List(l) => l.push(claim.log_entry.to_owned()),
            _ => return Err(wrong_type(claim.log_key)),
        }
        if ttl_deadline.is_some() {
            log.expires_at = ttl_deadline;
        }

        Ok(ClaimOutcome::Claimed(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim<'a>(member: &'a str, limit: u32) -> GuardedClaim<'a> {
        GuardedClaim {
            counter_key: "c",
            counter_field: "n",
            active_field: "on",
            limit,
            set_key: "s",
            member,
            log_key: "l",
            log_entry: member,
        }
    }

    async fn active_counter(store: &MemoryStore, ttl: Option<Duration>) {
        store.hash_set("c", &[("on", "1".into())], ttl).await.unwrap();
    }

    #[tokio::test]
    async fn test_guarded_claim_respects_membership_and_limit() {
        let store = MemoryStore::new();
        active_counter(&store, None).await;
        assert_eq!(
            store.guarded_claim(&claim("a", 2)).await.unwrap(),
            ClaimOutcome::Claimed(1)
        );
        assert_eq!(
            store.guarded_claim(&claim("a", 2)).await.unwrap(),
            ClaimOutcome::AlreadyMember
        );
        assert_eq!(
            store.guarded_claim(&claim("b", 2)).await.unwrap(),
            ClaimOutcome::Claimed(2)
        );
        assert_eq!(
            store.guarded_claim(&claim("c", 2)).await.unwrap(),
            ClaimOutcome::LimitReached
        );
        assert_eq!(store.set_members("s").await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.list_range("l").await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_guarded_claim_on_inactive_hash_changes_nothing() {
        let store = MemoryStore::new();
        store.hash_set("c", &[("on", "0".into())], None).await.unwrap();

        assert_eq!(
            store.guarded_claim(&claim("a", 5)).await.unwrap(),
            ClaimOutcome::Inactive
        );
        assert!(store.set_members("s").await.unwrap().is_empty());
        assert!(store.list_range("l").await.unwrap().is_empty());
        assert!(!store.hash_get_all("c").await.unwrap().contains_key("n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_claim_never_recreates_expired_hash() {
        let store = MemoryStore::new();
        active_counter(&store, Some(Duration::from_secs(10))).await;
        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(
            store.guarded_claim(&claim("a", 5)).await.unwrap(),
            ClaimOutcome::Missing
        );
        assert!(!store.exists("c").await.unwrap());
        assert!(!store.exists("s").await.unwrap());
        assert!(!store.exists("l").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_claimed_members_share_the_counter_ttl() {
        let store = MemoryStore::new();
        active_counter(&store, Some(Duration::from_secs(10))).await;
        store.guarded_claim(&claim("a", 5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!store.exists("s").await.unwrap());
        assert!(!store.exists("l").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hash_update_only_touches_live_hashes() {
        let store = MemoryStore::new();
        assert!(!store.hash_update("h", &[("a", "1".into())]).await.unwrap());
        assert!(!store.exists("h").await.unwrap());

        store
            .hash_set("h", &[("a", "1".into())], Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(store.hash_update("h", &[("a", "2".into())]).await.unwrap());
        assert_eq!(
            store.hash_get_all("h").await.unwrap().get("a").map(String::as_str),
            Some("2")
        );

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!store.hash_update("h", &[("a", "3".into())]).await.unwrap());
        assert!(!store.exists("h").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        store.set("forever", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.exists("forever").await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_set_merges_fields() {
        let store = MemoryStore::new();
        store
            .hash_set("h", &[("a", "1".into()), ("b", "2".into())], None)
            .await
            .unwrap();
        store.hash_set("h", &[("b", "3".into())], None).await.unwrap();
        let h = store.hash_get_all("h").await.unwrap();
        assert_eq!(h.get("a").map(String::as_str), Some("1"));
        assert_eq!(h.get("b").map(String::as_str), Some("3"));
    }
}
