//! Redis-backed store shared by every gateway instance.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};

use crate::store::{KeyValueStore, StoreError};

/// INCR and arm the TTL on first increment, atomically and in one round trip.
const INCREMENT_WINDOW_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if redis.call('TTL', KEYS[1]) < 0 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// HSET only when the hash is still live, so an expired key is never recreated
/// without a TTL. ARGV holds field/value pairs.
const HASH_SET_IF_EXISTS_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
";

/// A store backed by a self-reconnecting Redis connection.
///
/// The connection manager re-dials after the socket drops, so a Redis restart
/// degrades the gateway only until the next successful reconnect.
pub struct RedisStore {
    conn: ConnectionManager,
    op_timeout: Duration,
    increment_window: redis::Script,
    hash_set_if_exists: redis::Script,
}

impl RedisStore {
    /// Open a connection. The connect itself is bounded by `op_timeout`.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let conn = match tokio::time::timeout(op_timeout, ConnectionManager::new(client))
            .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(StoreError::Unavailable(e.to_string())),
            Err(_) => return Err(StoreError::Timeout(op_timeout)),
        };

        Ok(Self {
            conn,
            op_timeout,
            increment_window: redis::Script::new(INCREMENT_WINDOW_SCRIPT),
            hash_set_if_exists: redis::Script::new(HASH_SET_IF_EXISTS_SCRIPT),
        })
    }

    async fn run<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>> + Send,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Unavailable(format!("{}: {}", op, e))),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn increment_window(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let script = &self.increment_window;
        let secs = ttl_secs(window);
        self.run("increment_window", async move {
            script.key(key).arg(secs).invoke_async(&mut conn).await
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let secs = ttl_secs(ttl);
        self.run("expire", async move { conn.expire(key, secs).await })
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        self.run("exists", async move { conn.exists(key).await }).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self.run("delete", async move { conn.del(key).await }).await?;
        Ok(removed > 0)
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        self.run("hash_set", async move { conn.hset_multiple(key, fields).await })
            .await
    }

    async fn hash_set_if_exists(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<bool, StoreError> {
        if fields.is_empty() {
            return self.exists(key).await;
        }
        let mut conn = self.conn.clone();
        let mut invocation = self.hash_set_if_exists.key(key);
        for (field, value) in fields {
            invocation.arg(field).arg(value);
        }
        let written: i64 = self
            .run("hash_set_if_exists", async move {
                invocation.invoke_async(&mut conn).await
            })
            .await?;
        Ok(written == 1)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn.clone();
        self.run("hash_get_all", async move { conn.hgetall(key).await })
            .await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.run("set_add", async move { conn.sadd(key, member).await })
            .await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.run("set_remove", async move { conn.srem(key, member).await })
            .await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.run("set_members", async move { conn.smembers(key).await })
            .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _pong: String = self
            .run("ping", async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Answers PING with PONG and every other command with OK. The first
    /// connection is closed right after its first PONG.
    async fn serve_resp(listener: TcpListener, connections: Arc<AtomicUsize>) {
        while let Ok((socket, _)) = listener.accept().await {
            let seq = connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let (read, mut write) = socket.into_split();
                let mut lines = BufReader::new(read).lines();
                while let Ok(Some(header)) = lines.next_line().await {
                    let Some(count) = header.strip_prefix('*').and_then(|c| c.parse::<usize>().ok()) else {
                        continue;
                    };
                    let mut args = Vec::with_capacity(count);
                    for _ in 0..count {
                        // Skip the `$len` line, keep the argument.
                        let _ = lines.next_line().await;
                        match lines.next_line().await {
                            Ok(Some(arg)) => args.push(arg),
                            _ => return,
                        }
                    }
                    let is_ping = args.first().is_some_and(|a| a.eq_ignore_ascii_case("PING"));
                    let reply: &[u8] = if is_ping { b"+PONG\r\n" } else { b"+OK\r\n" };
                    if write.write_all(reply).await.is_err() {
                        return;
                    }
                    if seq == 0 && is_ping {
                        return;
                    }
                }
            });
        }
    }

    #[tokio::test]
    async fn test_recovers_after_connection_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        tokio::spawn(serve_resp(listener, connections.clone()));

        let store = RedisStore::connect(&format!("redis://{}", addr), Duration::from_secs(2))
            .await
            .unwrap();
        store.ping().await.unwrap();

        // The server hung up; calls may fail until the manager has re-dialed.
        let mut recovered = false;
        for _ in 0..50 {
            if store.ping().await.is_ok() {
                recovered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(recovered, "store never reconnected");
        assert!(connections.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let result = RedisStore::connect(&format!("redis://{}", addr), Duration::from_secs(2)).await;
        assert!(matches!(
            result,
            Err(StoreError::Unavailable(_)) | Err(StoreError::Timeout(_))
        ));
    }
}
