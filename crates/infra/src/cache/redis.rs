//! Redis-backed cache (optional, `redis` feature).
//!
//! Atomic capabilities map onto server-side primitives: `incr` is a Lua
//! EXISTS+INCRBY (so a missing key stays missing), `add` is `SET NX`,
//! `compare_and_swap` is a Lua GET+SET, `delete_pattern` is `SCAN MATCH` +
//! `DEL` (best effort: keys written during the scan may survive).
//!
//! The client is synchronous and runs on the calling task's worker thread.
//! Connections are reused from a small idle list and every connect, read and
//! write is bounded by [`IO_TIMEOUT`], so an unreachable server costs a
//! request at most that long instead of stalling the worker.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use redis::Commands;

use super::{CacheBackend, CacheError};

/// Upper bound for connecting to and talking with the server.
pub const IO_TIMEOUT: Duration = Duration::from_millis(500);

/// Idle connections kept for reuse; extras are closed on return.
const MAX_IDLE: usize = 8;

const INCR_EXISTING: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('INCRBY', KEYS[1], ARGV[1])
end
return false
"#;

const COMPARE_AND_SWAP: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '0' then
    if current then return 0 end
elseif current ~= ARGV[2] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[3])
return 1
"#;

#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
    idle: Arc<Mutex<Vec<redis::Connection>>>,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("client", &self.client)
            .field("idle", &self.idle.lock().map(|idle| idle.len()).ok())
            .finish()
    }
}

impl RedisCache {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(backend)?;
        Ok(Self {
            client,
            idle: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn checkout(&self) -> Result<redis::Connection, CacheError> {
        let reused = self
            .idle
            .lock()
            .map_err(|_| CacheError::Backend("connection list poisoned".to_string()))?
            .pop();
        if let Some(conn) = reused {
            return Ok(conn);
        }

        let conn = self.client.get_connection_with_timeout(IO_TIMEOUT).map_err(backend)?;
        conn.set_read_timeout(Some(IO_TIMEOUT)).map_err(backend)?;
        conn.set_write_timeout(Some(IO_TIMEOUT)).map_err(backend)?;
        Ok(conn)
    }

    fn checkin(&self, conn: redis::Connection) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < MAX_IDLE {
                idle.push(conn);
            }
        }
    }

    /// Run `op` on a pooled connection. The outer error is a failure to get a
    /// connection; the inner one is whatever `op` returned.
    ///
    /// A connection goes back to the idle list unless `op` failed below the
    /// protocol level (I/O, timeout, dropped connection).
    fn with_conn<T>(
        &self,
        op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<redis::RedisResult<T>, CacheError> {
        let mut conn = self.checkout()?;
        let result = op(&mut conn);
        match &result {
            Ok(_) => self.checkin(conn),
            Err(e) if e.kind() == redis::ErrorKind::ResponseError => self.checkin(conn),
            Err(e) => tracing::debug!(error = %e, "dropping redis connection"),
        }
        Ok(result)
    }
}

fn backend(e: redis::RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

/// Whole seconds, at least 1 (Redis rejects `EX 0`).
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl CacheBackend for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.with_conn(|conn| conn.get(key))?.map_err(backend)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.with_conn(|conn| match ttl {
            Some(ttl) => conn.set_ex(key, value, ttl_secs(ttl)),
            None => conn.set(key, value),
        })?
        .map_err(backend)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let _: i64 = self.with_conn(|conn| conn.del(key))?.map_err(backend)?;
        Ok(())
    }

    fn incr(&self, key: &str, delta: i64) -> Result<Option<i64>, CacheError> {
        self.with_conn(|conn| redis::Script::new(INCR_EXISTING).key(key).arg(delta).invoke(conn))?
            .map_err(|e| match e.kind() {
                redis::ErrorKind::ResponseError => CacheError::NotAnInteger(key.to_string()),
                _ => backend(e),
            })
    }

    fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, CacheError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl_secs(ttl));
        }
        let reply: Option<String> = self.with_conn(|conn| cmd.query(conn))?.map_err(backend)?;
        Ok(reply.is_some())
    }

    fn compare_and_swap(&self, key: &str, expected: Option<&str>, new: &str) -> Result<bool, CacheError> {
        let swapped: i64 = self
            .with_conn(|conn| {
                redis::Script::new(COMPARE_AND_SWAP)
                    .key(key)
                    .arg(if expected.is_some() { "1" } else { "0" })
                    .arg(expected.unwrap_or_default())
                    .arg(new)
                    .invoke(conn)
            })?
            .map_err(backend)?;
        Ok(swapped == 1)
    }

    fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        self.with_conn(|conn| {
            let keys: Vec<String> = conn.scan_match(pattern)?.collect();
            if keys.is_empty() {
                return Ok(0);
            }
            conn.del(keys)
        })?
        .map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_at_least_one_second() {
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(300)), 300);
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(RedisCache::new("not a url").is_err());
    }

    #[test]
    fn unreachable_server_fails_within_the_timeout() {
        let cache = RedisCache::new("redis://127.0.0.1:1/").unwrap();

        let started = std::time::Instant::now();
        assert!(matches!(cache.get("product:x"), Err(CacheError::Backend(_))));
        assert!(matches!(cache.set("product:x", "{}", None), Err(CacheError::Backend(_))));
        assert!(started.elapsed() < IO_TIMEOUT * 4);
        assert!(cache.idle.lock().unwrap().is_empty());
    }
}
