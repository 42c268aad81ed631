//! Redis-backed window store.
//!
//! Each window key is a sorted set whose scores are admission timestamps.
//! `ConnectionManager` multiplexes a single connection across tasks and
//! reconnects on its own after the server goes away, so a later outage shows
//! up as per-call errors rather than a dead handle.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{
    AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError, Script,
};
use tokio::time::timeout;
use tracing::{debug, info};

use super::{expiry_secs, StoreError, StoreResult, WindowStore};
use crate::config::StoreConfig;
use crate::ratelimit::Decision;

/// Prune, count and conditionally insert in one server-side step.
///
/// KEYS[1] window key
/// ARGV[1] cutoff score, ARGV[2] limit, ARGV[3] now, ARGV[4] member,
/// ARGV[5] expiry seconds
/// Returns {admitted (0|1), live count after the call}.
const ADMIT_SCRIPT: &str = r#"
local key = KEYS[1]
redis.call('ZREMRANGEBYSCORE', key, '-inf', ARGV[1])
local count = redis.call('ZCARD', key)
if count >= tonumber(ARGV[2]) then
  return {0, count}
end
redis.call('ZADD', key, ARGV[3], ARGV[4])
redis.call('EXPIRE', key, ARGV[5])
return {1, count + 1}
"#;

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_io_error()
            || err.is_timeout()
        {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

/// Score argument as Redis expects it, including the open bounds.
fn score_arg(score: f64) -> String {
    if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if score == f64::INFINITY {
        "+inf".to_string()
    } else {
        score.to_string()
    }
}

/// Client settings for `config`.
///
/// Built field by field rather than as a `redis://` URL so that passwords
/// containing `/`, `#` or `@` reach the server unchanged.
fn connection_info(config: &StoreConfig) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: RedisConnectionInfo {
            db: config.db,
            password: config.password.clone(),
            ..RedisConnectionInfo::default()
        },
    }
}

/// Window store backed by Redis sorted sets.
#[derive(Clone)]
pub struct RedisWindowStore {
    connection: ConnectionManager,
    script: Script,
}

impl fmt::Debug for RedisWindowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisWindowStore").finish_non_exhaustive()
    }
}

impl RedisWindowStore {
    /// Connect and health-check within `config.connect_timeout_ms`.
    ///
    /// # Errors
    /// Returns [`StoreError::Timeout`] if the server does not answer in time,
    /// otherwise the mapped client error.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let budget = config.connect_timeout();
        debug!(host = %config.host, port = config.port, db = config.db, "Connecting to store");

        let client = Client::open(connection_info(config))?;
        let connection = timeout(budget, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(budget))??;

        let store = Self {
            connection,
            script: Script::new(ADMIT_SCRIPT),
        };

        timeout(budget, store.ping())
            .await
            .map_err(|_| StoreError::Timeout(budget))??;

        info!(host = %config.host, port = config.port, "Connected to store");
        Ok(store)
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn remove_range_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<u64> {
        let mut conn = self.connection.clone();
        let removed: u64 = conn
            .zrembyscore(key, score_arg(min), score_arg(max))
            .await?;
        Ok(removed)
    }

    async fn cardinality(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.connection.clone();
        let count: u64 = conn.zcard(key).await?;
        Ok(count)
    }

    async fn add_scored(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let _: bool = conn.expire(key, expiry_secs(ttl) as i64).await?;
        Ok(())
    }

    async fn admit_atomic(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        now: f64,
        member: &str,
    ) -> StoreResult<Decision> {
        let cutoff = now - window.as_secs_f64();
        let mut conn = self.connection.clone();

        let (admitted, count): (i64, u64) = self
            .script
            .key(key)
            .arg(score_arg(cutoff))
            .arg(limit)
            .arg(score_arg(now))
            .arg(member)
            .arg(expiry_secs(window))
            .invoke_async(&mut conn)
            .await?;

        Ok(if admitted == 1 {
            Decision::Allowed { count }
        } else {
            Decision::Denied { count }
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_arg_bounds() {
        assert_eq!(score_arg(f64::NEG_INFINITY), "-inf");
        assert_eq!(score_arg(f64::INFINITY), "+inf");
        assert_eq!(score_arg(1700000000.25), "1700000000.25");
    }

    #[test]
    fn test_connection_errors_map_to_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: StoreError = RedisError::from(io).into();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_response_errors_map_to_command() {
        let err: StoreError =
            RedisError::from((redis::ErrorKind::TypeError, "WRONGTYPE")).into();
        assert!(matches!(err, StoreError::Command(_)));
    }

    #[test]
    fn test_connection_info_carries_settings() {
        let config = StoreConfig {
            host: "cache.internal".to_string(),
            port: 6380,
            db: 2,
            ..StoreConfig::default()
        };
        let info = connection_info(&config);
        assert!(matches!(
            &info.addr,
            ConnectionAddr::Tcp(host, 6380) if host == "cache.internal"
        ));
        assert_eq!(info.redis.db, 2);
        assert_eq!(info.redis.password, None);
    }

    #[test]
    fn test_reserved_characters_in_password() {
        let config = StoreConfig {
            password: Some("p/ss#w@rd".to_string()),
            ..StoreConfig::default()
        };

        let client = Client::open(connection_info(&config)).unwrap();
        assert_eq!(
            client.get_connection_info().redis.password.as_deref(),
            Some("p/ss#w@rd")
        );
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let config = StoreConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout_ms: 300,
            ..StoreConfig::default()
        };
        assert!(RedisWindowStore::connect(&config).await.is_err());
    }
}
