//! Key-value cache port and its Redis implementation.
//!
//! The cache is **best-effort**: every failure degrades to a warn plus a
//! cache miss, and callers fall back to the read store. Values are
//! JSON-serialized snapshots with short TTLs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value as JsonValue;
use tracing::warn;

use faregate_core::{BookingId, ScheduleId, UserId};

/// TTL for `ticket:{bookingId}` entries.
pub const TICKET_DETAIL_TTL: Duration = Duration::from_secs(300);
/// TTL for `user:{userId}:tickets:page:{p}:limit:{l}` entries.
pub const USER_TICKETS_TTL: Duration = Duration::from_secs(60);

/// Deadline on every cache round trip; a slow cache degrades to a miss
/// instead of stalling the request.
const CACHE_OP_DEADLINE: Duration = Duration::from_secs(5);

pub fn ticket_key(booking_id: BookingId) -> String {
    format!("ticket:{booking_id}")
}

pub fn user_tickets_key(user_id: &UserId, page: u32, limit: u32) -> String {
    format!("user:{user_id}:tickets:page:{page}:limit:{limit}")
}

/// Prefix covering every cached page of one user's tickets.
pub fn user_tickets_prefix(user_id: &UserId) -> String {
    format!("user:{user_id}:tickets:")
}

pub fn schedule_availability_key(schedule_id: &ScheduleId) -> String {
    format!("schedule:{schedule_id}:availability")
}

#[async_trait]
pub trait TicketCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<JsonValue>;
    async fn set(&self, key: &str, value: JsonValue, ttl: Duration);
    async fn delete(&self, key: &str);
    async fn delete_prefix(&self, prefix: &str);
}

/// Redis-backed cache over a pooled [`ConnectionManager`].
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis. Fails only at startup; runtime errors degrade to
    /// misses.
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl TicketCache for RedisCache {
    async fn get(&self, key: &str) -> Option<JsonValue> {
        let mut conn = self.conn.clone();
        let raw: Option<String> =
            match tokio::time::timeout(CACHE_OP_DEADLINE, conn.get(key)).await {
                Ok(Ok(raw)) => raw,
                Ok(Err(error)) => {
                    warn!(key, %error, "cache get failed; treating as miss");
                    return None;
                }
                Err(_) => {
                    warn!(key, "cache get timed out; treating as miss");
                    return None;
                }
            };
        raw.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(key, %error, "cache entry is not valid JSON; treating as miss");
                None
            }
        })
    }

    async fn set(&self, key: &str, value: JsonValue, ttl: Duration) {
        let mut conn = self.conn.clone();
        let raw = value.to_string();
        let ttl_secs = ttl.as_secs().max(1);
        match tokio::time::timeout(
            CACHE_OP_DEADLINE,
            conn.set_ex::<_, _, ()>(key, raw, ttl_secs),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(key, %error, "cache set failed; continuing without cache"),
            Err(_) => warn!(key, "cache set timed out; continuing without cache"),
        }
    }

    async fn delete(&self, key: &str) {
        let mut conn = self.conn.clone();
        match tokio::time::timeout(CACHE_OP_DEADLINE, conn.del::<_, ()>(key)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(key, %error, "cache delete failed"),
            Err(_) => warn!(key, "cache delete timed out"),
        }
    }

    async fn delete_prefix(&self, prefix: &str) {
        let keys = match tokio::time::timeout(CACHE_OP_DEADLINE, self.keys_matching(prefix)).await
        {
            Ok(Some(keys)) => keys,
            Ok(None) => return,
            Err(_) => {
                warn!(prefix, "cache scan timed out");
                return;
            }
        };

        if keys.is_empty() {
            return;
        }

        let mut conn = self.conn.clone();
        match tokio::time::timeout(CACHE_OP_DEADLINE, conn.del::<_, ()>(keys)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(prefix, %error, "cache prefix delete failed"),
            Err(_) => warn!(prefix, "cache prefix delete timed out"),
        }
    }
}

impl RedisCache {
    async fn keys_matching(&self, prefix: &str) -> Option<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut iter = match conn.scan_match::<_, String>(&pattern).await {
            Ok(iter) => iter,
            Err(error) => {
                warn!(prefix, %error, "cache scan failed");
                return None;
            }
        };
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Some(keys)
    }
}

/// In-memory cache with real TTL semantics. Used by tests.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (JsonValue, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live (non-expired) entry exists. Test inspection helper.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .is_some_and(|(_, deadline)| *deadline > Instant::now())
    }
}

#[async_trait]
impl TicketCache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<JsonValue> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: JsonValue, ttl: Duration) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    async fn delete(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    async fn delete_prefix(&self, prefix: &str) {
        self.entries
            .lock()
            .unwrap()
            .retain(|key, _| !key.starts_with(prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_cache_round_trips() {
        let cache = InMemoryCache::new();
        cache
            .set("ticket:1", json!({"status": "PENDING"}), Duration::from_secs(60))
            .await;
        assert_eq!(
            cache.get("ticket:1").await,
            Some(json!({"status": "PENDING"}))
        );

        cache.delete("ticket:1").await;
        assert_eq!(cache.get("ticket:1").await, None);
    }

    #[tokio::test]
    async fn delete_prefix_removes_matching_keys_only() {
        let cache = InMemoryCache::new();
        let u1 = UserId::from("U1");
        let u2 = UserId::from("U2");
        cache
            .set(&user_tickets_key(&u1, 1, 10), json!([]), Duration::from_secs(60))
            .await;
        cache
            .set(&user_tickets_key(&u1, 2, 10), json!([]), Duration::from_secs(60))
            .await;
        cache
            .set(&user_tickets_key(&u2, 1, 10), json!([]), Duration::from_secs(60))
            .await;

        cache.delete_prefix(&user_tickets_prefix(&u1)).await;

        assert!(!cache.contains(&user_tickets_key(&u1, 1, 10)));
        assert!(!cache.contains(&user_tickets_key(&u1, 2, 10)));
        assert!(cache.contains(&user_tickets_key(&u2, 1, 10)));
    }

    #[tokio::test]
    async fn expired_entries_read_as_misses() {
        let cache = InMemoryCache::new();
        cache
            .set("ticket:1", json!({}), Duration::from_millis(0))
            .await;
        assert_eq!(cache.get("ticket:1").await, None);
    }
}
