//! Key-value store abstraction backing games and message queues.
//!
//! Every game lives in one hash-like record with independently updatable
//! fields and a refreshable idle TTL; the request and response queues are
//! lists with blocking pops. [`Store`] captures exactly that contract so
//! that backends are interchangeable:
//!
//! - [`MemoryStore`] — in-process backend used by every test and by
//!   single-process deployments. TTLs are enforced lazily against
//!   [`now_ms`]; blocking pops wait on a [`Notify`].
//! - [`RedisStore`] — networked backend mapping each operation onto the
//!   Redis command of the same name.
//!
//! The store is the only shared resource in the system: manager workers and
//! the fan-out communicate exclusively through it.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::Notify;

/// Returns the current wall-clock time in milliseconds since the Unix
/// epoch. This is the single time source of the whole crate; all persisted
/// timestamps are relative to a game's `start_time`.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Faults raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An operation was applied to a key holding a different value type
    /// (e.g. a list push onto a hash).
    #[error("value at key {key:?} has the wrong type")]
    WrongType { key: String },

    /// Could not reach the backing service.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// Error reported by the Redis backend.
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// The narrow key-value contract the game core needs: hash records with
/// per-field access, counters, sets for the side indices, lists with
/// blocking pops for the queues, and per-key millisecond TTLs.
///
/// Every method may suspend; workers treat each call as a cancellation-safe
/// wait point.
#[async_trait]
pub trait Store: Send + Sync {
    /// Reads one field of a hash record.
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Writes one field of a hash record, creating the record if needed.
    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    /// Deletes one field of a hash record.
    async fn hdel(&self, key: &str, field: &str) -> StoreResult<()>;

    /// Reads a whole hash record. Missing keys read as empty.
    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// True iff the key exists (and has not idled out).
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Deletes a key outright.
    async fn del(&self, key: &str) -> StoreResult<()>;

    /// Resets the key's idle TTL to `ttl_ms` from now.
    async fn pexpire(&self, key: &str, ttl_ms: u64) -> StoreResult<()>;

    /// Increments an integer counter key, returning the new value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Appends a value to the tail of a list.
    async fn rpush(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Prepends a value to the head of a list (used to preempt the request
    /// queue with `exit-req`).
    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Pops the head of a list, blocking until a value is available.
    async fn blpop(&self, key: &str) -> StoreResult<String>;

    /// Adds a member to a set.
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<()>;

    /// Removes a member from a set.
    async fn srem(&self, key: &str, member: &str) -> StoreResult<()>;

    /// Reads all members of a set.
    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// One typed value slot plus its expiry deadline.
struct Entry {
    value: Value,
    expires_at: Option<u64>,
}

enum Value {
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Set(HashSet<String>),
    Counter(i64),
}

/// In-process [`Store`] backend.
///
/// Semantics mirror the networked backend: keys idle out once their TTL
/// passes (checked lazily on access), empty lists vanish, and pushes wake
/// blocked poppers.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    pushed: Notify,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the entry at `key` if its TTL has passed. Must be called with
    /// the lock held before reading an entry.
    fn purge(entries: &mut HashMap<String, Entry>, key: &str) {
        if let Some(entry) = entries.get(key)
            && let Some(deadline) = entry.expires_at
            && now_ms() >= deadline
        {
            entries.remove(key);
        }
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::WrongType { key: key.to_string() }
    }

    /// Pops the list head without blocking. Removes the key once the list
    /// drains, matching list semantics of the networked backend.
    fn try_pop(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge(&mut entries, key);
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        let Value::List(list) = &mut entry.value else {
            return Err(Self::wrong_type(key));
        };
        let value = list.pop_front();
        if list.is_empty() {
            entries.remove(key);
        }
        Ok(value)
    }

    fn push(&self, key: &str, value: &str, front: bool) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge(&mut entries, key);
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry { value: Value::List(VecDeque::new()), expires_at: None });
        let Value::List(list) = &mut entry.value else {
            return Err(Self::wrong_type(key));
        };
        if front {
            list.push_front(value.to_string());
        } else {
            list.push_back(value.to_string());
        }
        drop(entries);
        self.pushed.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge(&mut entries, key);
        match entries.get(key) {
            None => Ok(None),
            Some(Entry { value: Value::Hash(hash), .. }) => Ok(hash.get(field).cloned()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge(&mut entries, key);
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry { value: Value::Hash(HashMap::new()), expires_at: None });
        let Value::Hash(hash) = &mut entry.value else {
            return Err(Self::wrong_type(key));
        };
        hash.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge(&mut entries, key);
        match entries.get_mut(key) {
            None => Ok(()),
            Some(Entry { value: Value::Hash(hash), .. }) => {
                hash.remove(field);
                Ok(())
            }
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge(&mut entries, key);
        match entries.get(key) {
            None => Ok(HashMap::new()),
            Some(Entry { value: Value::Hash(hash), .. }) => Ok(hash.clone()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge(&mut entries, key);
        Ok(entries.contains_key(key))
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn pexpire(&self, key: &str, ttl_ms: u64) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge(&mut entries, key);
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(now_ms() + ttl_ms);
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge(&mut entries, key);
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry { value: Value::Counter(0), expires_at: None });
        let Value::Counter(n) = &mut entry.value else {
            return Err(Self::wrong_type(key));
        };
        *n += 1;
        Ok(*n)
    }

    async fn rpush(&self, key: &str, value: &str) -> StoreResult<()> {
        self.push(key, value, false)
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
        self.push(key, value, true)
    }

    async fn blpop(&self, key: &str) -> StoreResult<String> {
        loop {
            // Register for the push signal before checking the list, so a
            // push between the check and the await cannot be missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(value) = self.try_pop(key)? {
                return Ok(value);
            }
            notified.await;
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge(&mut entries, key);
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry { value: Value::Set(HashSet::new()), expires_at: None });
        let Value::Set(set) = &mut entry.value else {
            return Err(Self::wrong_type(key));
        };
        set.insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge(&mut entries, key);
        match entries.get_mut(key) {
            None => Ok(()),
            Some(Entry { value: Value::Set(set), .. }) => {
                set.remove(member);
                Ok(())
            }
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.lock().unwrap();
        Self::purge(&mut entries, key);
        match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry { value: Value::Set(set), .. }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }
}

// ---------------------------------------------------------------------------
// Redis backend
// ---------------------------------------------------------------------------

/// Networked [`Store`] backend over Redis.
///
/// Regular operations share a multiplexed connection manager. Blocking pops
/// get a dedicated connection per call: a `BLPOP` parked on the shared
/// pipeline would stall every other command behind it.
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to the Redis service at `host:port`.
    pub async fn connect(host: &str, port: u16) -> StoreResult<Self> {
        let client = redis::Client::open((host, port))
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(key, field).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.hdel(key, field).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(key).await?)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn pexpire(&self, key: &str, ttl_ms: u64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: bool = conn.pexpire(key, ttl_ms as i64).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.incr(key, 1).await?)
    }

    async fn rpush(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(key, value).await?;
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(key, value).await?;
        Ok(())
    }

    async fn blpop(&self, key: &str) -> StoreResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (_key, value): (String, String) = conn.blpop(key, 0.0).await?;
        Ok(value)
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.srem(key, member).await?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(key).await?)
    }
}
