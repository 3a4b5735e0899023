use super::{ClaimOutcome, GuardedClaim, KeyValueStore, KvError};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Server-side guarded claim. Returns the new counter value, `-1` when the
/// member is already present, `-2` when the counter is at its limit, `-3`
/// when the counter hash is gone and `-4` when its active flag is cleared.
const GUARDED_CLAIM_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -3
end
if redis.call('HGET', KEYS[1], ARGV[5]) ~= '1' then
    return -4
end
if redis.call('SISMEMBER', KEYS[2], ARGV[3]) == 1 then
    return -1
end
local count = tonumber(redis.call('HGET', KEYS[1], ARGV[1]) or '0')
if count >= tonumber(ARGV[2]) then
    return -2
end
redis.call('SADD', KEYS[2], ARGV[3])
local next = redis.call('HINCRBY', KEYS[1], ARGV[1], 1)
redis.call('RPUSH', KEYS[3], ARGV[4])
local ttl = redis.call('PTTL', KEYS[1])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[2], ttl)
    redis.call('PEXPIRE', KEYS[3], ttl)
end
return next
"#;

/// HSET that refuses to create the hash. Returns 1 if it existed.
const HASH_UPDATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
"#;

/// [`KeyValueStore`] backed by Redis over a multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    claim_script: redis::Script,
    update_script: redis::Script,
}

impl RedisStore {
    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!("Connected to Redis");
        Ok(Self {
            conn,
            claim_script: redis::Script::new(GUARDED_CLAIM_SCRIPT),
            update_script: redis::Script::new(HASH_UPDATE_SCRIPT),
        })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, KvError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(fields)
    }

    async fn hash_set(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().hset_multiple(key, fields).ignore();
        if let Some(ttl) = ttl {
            let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1);
            pipe.expire(key, secs).ignore();
        }
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn hash_update(&self, key: &str, fields: &[(&str, String)]) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.update_script.key(key);
        for (field, value) in fields {
            invocation.arg(*field).arg(value);
        }
        let existed: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(existed == 1)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let present: bool = conn.sismember(key, member).await?;
        Ok(present)
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        let items: Vec<String> = conn.lrange(key, 0, -1).await?;
        Ok(items)
    }

    async fn guarded_claim(&self, claim: &GuardedClaim<'_>) -> Result<ClaimOutcome, KvError> {
        let mut conn = self.conn.clone();
        let result: i64 = self
            .claim_script
            .key(claim.counter_key)
            .key(claim.set_key)
            .key(claim.log_key)
            .arg(claim.counter_field)
            .arg(claim.limit)
            .arg(claim.member)
            .arg(claim.log_entry)
            .arg(claim.active_field)
            .invoke_async(&mut conn)
            .await?;

        match result {
            -1 => Ok(ClaimOutcome::AlreadyMember),
            -2 => Ok(ClaimOutcome::LimitReached),
            -3 => Ok(ClaimOutcome::Missing),
            -4 => Ok(ClaimOutcome::Inactive),
            n => u32::try_from(n)
                .map(ClaimOutcome::Claimed)
                .map_err(|e| KvError::Corrupt {
                    key: claim.counter_key.to_owned(),
                    reason: e.to_string(),
                }),
        }
    }
}
