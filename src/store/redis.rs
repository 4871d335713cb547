//! Redis-backed atomic store
//!
//! Maps the `AtomicStore` contract onto Redis primitives: `SET NX PX` for the
//! conditional set, `INCRBYFLOAT` for counters, `MULTI`/`EXEC` for pipelines,
//! and small server-side scripts for compare-and-swap and
//! compare-and-delete, which Redis has no single command for.

use std::sync::LazyLock;
use std::time::Duration;

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Script};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::store::{AtomicStore, StoreOp, StoreValue};

/// Check-then-set as one server-side unit. ARGV[1] is '1' when a current
/// value is expected (ARGV[2]), '0' when the key must be absent.
static CAS_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local cur = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
    if cur == ARGV[2] then
        redis.call('SET', KEYS[1], ARGV[3])
        return 1
    end
elseif cur == false then
    redis.call('SET', KEYS[1], ARGV[3])
    return 1
end
return 0
"#,
    )
});

/// Delete only if the stored value matches, so a holder can never remove a
/// key it no longer owns.
static DELETE_IF_EQUALS_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#,
    )
});

/// Redis implementation of [`AtomicStore`]
///
/// Cheap to clone; all clones share one multiplexed connection that
/// reconnects automatically.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to the store described by `config`
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.url())?;
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_millis(config.connect_timeout_ms))
            .set_response_timeout(Duration::from_millis(config.response_timeout_ms));
        let conn = client
            .get_connection_manager_with_config(manager_config)
            .await?;

        debug!(host = %config.host, port = config.port, db = config.database, "connected to store");

        Ok(Self { conn })
    }

    fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

/// Redis rejects `PX 0`; clamp to the smallest expressible TTL
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// Format a score bound for range commands; Redis spells infinities out
fn score_arg(score: f64) -> String {
    if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if score == f64::INFINITY {
        "+inf".to_string()
    } else {
        score.to_string()
    }
}

#[async_trait::async_trait]
impl AtomicStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn incr_by(&self, key: &str, delta: f64) -> Result<f64> {
        let mut conn = self.connection();
        let value: f64 = conn.incr(key, delta).await?;
        Ok(value)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool> {
        let mut conn = self.connection();
        let swapped: i64 = CAS_SCRIPT
            .key(key)
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or(""))
            .arg(new)
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.connection();
        let removed: i64 = DELETE_IF_EQUALS_SCRIPT
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection();
        let applied: bool = conn.expire(key, ttl.as_secs().max(1) as i64).await?;
        Ok(applied)
    }

    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        let mut conn = self.connection();
        let removed: u64 = conn.zrembyscore(key, score_arg(min), score_arg(max)).await?;
        Ok(removed)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let mut conn = self.connection();
        let _: i64 = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection();
        let count: u64 = conn.zcard(key).await?;
        Ok(count)
    }

    async fn pipeline(&self, ops: &[StoreOp]) -> Result<Vec<StoreValue>> {
        let mut pipe = redis::pipe();
        pipe.atomic();

        for op in ops {
            match op {
                StoreOp::Get(key) => {
                    pipe.cmd("GET").arg(key);
                }
                StoreOp::Set(key, value) => {
                    pipe.cmd("SET").arg(key).arg(value);
                }
                StoreOp::Delete(key) => {
                    pipe.cmd("DEL").arg(key);
                }
                StoreOp::IncrBy(key, delta) => {
                    pipe.cmd("INCRBYFLOAT").arg(key).arg(*delta);
                }
                StoreOp::ZRemRangeByScore { key, min, max } => {
                    pipe.cmd("ZREMRANGEBYSCORE")
                        .arg(key)
                        .arg(score_arg(*min))
                        .arg(score_arg(*max));
                }
                StoreOp::ZAdd { key, score, member } => {
                    pipe.cmd("ZADD").arg(key).arg(*score).arg(member);
                }
                StoreOp::ZCard(key) => {
                    pipe.cmd("ZCARD").arg(key);
                }
                StoreOp::Expire { key, ttl } => {
                    pipe.cmd("EXPIRE").arg(key).arg(ttl.as_secs().max(1) as i64);
                }
            }
        }

        let mut conn = self.connection();
        let raw: Vec<redis::Value> = pipe.query_async(&mut conn).await?;

        ops.iter()
            .zip(raw.iter())
            .map(|(op, value)| decode_result(op, value))
            .collect()
    }
}

/// Decode one pipeline reply according to the operation that produced it
fn decode_result(op: &StoreOp, value: &redis::Value) -> Result<StoreValue> {
    match op {
        StoreOp::Get(_) => {
            let text: Option<String> = redis::from_redis_value(value)?;
            Ok(text.map_or(StoreValue::Nil, StoreValue::Text))
        }
        StoreOp::Set(..) => Ok(StoreValue::Nil),
        StoreOp::IncrBy(..) => {
            let number: f64 = redis::from_redis_value(value)?;
            Ok(StoreValue::Float(number))
        }
        StoreOp::Delete(_)
        | StoreOp::ZRemRangeByScore { .. }
        | StoreOp::ZAdd { .. }
        | StoreOp::ZCard(_)
        | StoreOp::Expire { .. } => {
            let number: i64 = redis::from_redis_value(value)?;
            Ok(StoreValue::Int(number))
        }
    }
}
