//! Key-value store for small durable state.
//!
//! Holds conversation-thread handles, delivered-message handles and redeem
//! code bookkeeping. Every mutation is a single atomic primitive; the only
//! compound operation is [`KeyValueStore::guarded_claim`], which is executed
//! server-side in one step.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors from the key-value store.
#[derive(Debug, Error)]
pub enum KvError {
    /// Redis error
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored value could not be interpreted
    #[error("corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// A conditional, all-or-nothing claim against a capped counter.
///
/// Applied atomically: if the hash `counter_key` exists, its `active_field`
/// is `"1"`, `member` is not yet in `set_key` and the counter `counter_field`
/// is below `limit`, the member is added, the counter incremented and
/// `log_entry` appended to `log_key`. The set and log inherit the remaining
/// TTL of the counter hash. A missing hash is never recreated.
#[derive(Debug, Clone)]
pub struct GuardedClaim<'a> {
    pub counter_key: &'a str,
    pub counter_field: &'a str,
    pub active_field: &'a str,
    pub limit: u32,
    pub set_key: &'a str,
    pub member: &'a str,
    pub log_key: &'a str,
    pub log_entry: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The claim was applied; carries the counter value after increment.
    Claimed(u32),
    /// The counter hash does not exist (never created or expired).
    Missing,
    /// The hash exists but its active flag is not set.
    Inactive,
    /// The member was already present; nothing changed.
    AlreadyMember,
    /// The counter had reached the limit; nothing changed.
    LimitReached,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Set a string value, replacing any previous one. `None` means no TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;

    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Read every field of a hash. Missing keys yield an empty map.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, KvError>;

    /// Write several hash fields at once, optionally (re)setting the TTL.
    async fn hash_set(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<(), KvError>;

    /// Write hash fields only if the hash already exists, keeping its TTL.
    /// Returns whether the hash existed.
    async fn hash_update(&self, key: &str, fields: &[(&str, String)]) -> Result<bool, KvError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError>;

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, KvError>;

    async fn list_range(&self, key: &str) -> Result<Vec<String>, KvError>;

    /// Apply a [`GuardedClaim`] atomically.
    async fn guarded_claim(&self, claim: &GuardedClaim<'_>) -> Result<ClaimOutcome, KvError>;
}
