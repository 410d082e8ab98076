//! A typed KV store adapter over Redis-semantic commands, per spec.md §4.1
//!
//! Every command the core actually uses is exposed with explicit
//! parameters; pipelined multi-writes are atomic on the server, and
//! `optimistic` exposes a WATCH/MULTI/EXEC retry loop. No hidden retries
//! happen here — callers choose their own policy (the gradient worker backs
//! off, the request store retries CAS aborts up to 5 times, per spec.md §7).

use bb8_redis::bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;

use crate::conf::Redis as RedisConf;
use crate::utils::ApiError;

pub mod keys;

/// A connection pool-backed handle to the KV store
#[derive(Clone)]
pub struct Kv {
    pool: Pool<RedisConnectionManager>,
    /// The namespace prefix every key this adapter builds is written under
    pub namespace: String,
}

/// The outcome of an optimistic WATCH/MULTI/EXEC transaction attempt
pub enum CasOutcome<T> {
    /// The transaction committed
    Committed(T),
    /// A watched key changed before `EXEC`; the caller should retry
    Aborted,
}

impl Kv {
    /// Connect a pool to redis using the supplied config
    ///
    /// # Panics
    ///
    /// Panics if the redis URL cannot be parsed or the pool cannot be built;
    /// this mirrors the teacher's `setup::redis`, which treats a redis outage
    /// at startup as fatal rather than something the KV adapter itself should
    /// paper over.
    #[tracing::instrument(name = "Kv::new", skip(conf))]
    pub async fn new(conf: &RedisConf) -> Self {
        let url = match (&conf.username, &conf.password) {
            (Some(user), Some(password)) => {
                format!("redis://{user}:{password}@{}:{}/", conf.host, conf.port)
            }
            (None, Some(password)) => {
                format!("redis://default:{password}@{}:{}/", conf.host, conf.port)
            }
            (None, None) => format!("redis://{}:{}/", conf.host, conf.port),
            (Some(_), None) => panic!("Redis setup error: password must be set if username is set"),
        };
        let manager = RedisConnectionManager::new(url).expect("failed to build redis manager");
        let pool = Pool::builder()
            .max_size(conf.pool_size)
            .build(manager)
            .await
            .expect("failed to build redis connection pool");
        Kv {
            pool,
            namespace: conf.namespace.clone(),
        }
    }

    /// Build a test adapter directly from an already-built pool, used by
    /// integration tests that spin up a local redis instance.
    #[must_use]
    pub fn from_pool(pool: Pool<RedisConnectionManager>, namespace: impl Into<String>) -> Self {
        Kv {
            pool,
            namespace: namespace.into(),
        }
    }

    async fn conn(
        &self,
    ) -> Result<bb8_redis::bb8::PooledConnection<'_, RedisConnectionManager>, ApiError> {
        self.pool.get().await.map_err(|err| {
            ApiError::new(
                crate::utils::ErrorKind::Transient,
                Some(format!("Failed to get a redis connection: {err:#?}")),
            )
        })
    }

    /// `GET key`
    pub async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        Ok(self.conn().await?.get(key).await?)
    }

    /// `MGET key...`
    pub async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, ApiError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.conn().await?.mget(keys).await?)
    }

    /// `SET key value`
    pub async fn set(&self, key: &str, value: &str) -> Result<(), ApiError> {
        Ok(self.conn().await?.set(key, value).await?)
    }

    /// `SETEX key ttl_secs value`
    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError> {
        Ok(self.conn().await?.set_ex(key, value, ttl_secs).await?)
    }

    /// `EXPIRE key ttl_secs`
    pub async fn expire(&self, key: &str, ttl_secs: i64) -> Result<(), ApiError> {
        let _: i64 = self.conn().await?.expire(key, ttl_secs).await?;
        Ok(())
    }

    /// `DEL key`
    pub async fn del(&self, key: &str) -> Result<(), ApiError> {
        let _: i64 = self.conn().await?.del(key).await?;
        Ok(())
    }

    /// `SADD key member`
    pub async fn sadd(&self, key: &str, member: &str) -> Result<(), ApiError> {
        let _: i64 = self.conn().await?.sadd(key, member).await?;
        Ok(())
    }

    /// `SREM key member`
    pub async fn srem(&self, key: &str, member: &str) -> Result<(), ApiError> {
        let _: i64 = self.conn().await?.srem(key, member).await?;
        Ok(())
    }

    /// `SMEMBERS key`
    pub async fn smembers(&self, key: &str) -> Result<Vec<String>, ApiError> {
        Ok(self.conn().await?.smembers(key).await?)
    }

    /// `SISMEMBER key member`
    pub async fn sismember(&self, key: &str, member: &str) -> Result<bool, ApiError> {
        Ok(self.conn().await?.sismember(key, member).await?)
    }

    /// `SINTER key...`
    pub async fn sinter(&self, keys: &[String]) -> Result<Vec<String>, ApiError> {
        Ok(self.conn().await?.sinter(keys).await?)
    }

    /// `SUNION key...`
    pub async fn sunion(&self, keys: &[String]) -> Result<Vec<String>, ApiError> {
        Ok(self.conn().await?.sunion(keys).await?)
    }

    /// `SUNIONSTORE dest key...` — used to materialize a transient scratch
    /// key for a multi-guild `SINTER` query (spec.md §4.7), since `SINTER`
    /// only accepts real keys, not an in-memory member list.
    pub async fn sunion_store(&self, dest: &str, keys: &[String]) -> Result<(), ApiError> {
        let _: i64 = self.conn().await?.sunionstore(dest, keys).await?;
        Ok(())
    }

    /// `ZADD key score member`
    pub async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), ApiError> {
        let _: i64 = self.conn().await?.zadd(key, member, score).await?;
        Ok(())
    }

    /// `ZREM key member`
    pub async fn zrem(&self, key: &str, member: &str) -> Result<i64, ApiError> {
        Ok(self.conn().await?.zrem(key, member).await?)
    }

    /// `ZRANGE key start stop`
    pub async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, ApiError> {
        Ok(self.conn().await?.zrange(key, start, stop).await?)
    }

    /// `ZRANGEBYSCORE key min max`
    pub async fn zrangebyscore(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>, ApiError> {
        Ok(self.conn().await?.zrangebyscore(key, min, max).await?)
    }

    /// `ZMSCORE key member...`
    pub async fn zmscore(&self, key: &str, members: &[String]) -> Result<Vec<Option<i64>>, ApiError> {
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("ZMSCORE");
        cmd.arg(key).arg(members);
        Ok(cmd.query_async(&mut *self.conn().await?).await?)
    }

    /// `ZSCORE key member`
    pub async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, ApiError> {
        Ok(self.conn().await?.zscore(key, member).await?)
    }

    /// `ZCARD key`
    pub async fn zcard(&self, key: &str) -> Result<i64, ApiError> {
        Ok(self.conn().await?.zcard(key).await?)
    }

    /// `RPUSH key value`
    pub async fn rpush(&self, key: &str, value: &str) -> Result<(), ApiError> {
        let _: i64 = self.conn().await?.rpush(key, value).await?;
        Ok(())
    }

    /// `LPUSH key value`
    pub async fn lpush(&self, key: &str, value: &str) -> Result<(), ApiError> {
        let _: i64 = self.conn().await?.lpush(key, value).await?;
        Ok(())
    }

    /// `LRANGE key start stop`
    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, ApiError> {
        Ok(self.conn().await?.lrange(key, start, stop).await?)
    }

    /// `LLEN key`
    pub async fn llen(&self, key: &str) -> Result<i64, ApiError> {
        Ok(self.conn().await?.llen(key).await?)
    }

    /// `LREM key count value`
    pub async fn lrem(&self, key: &str, count: isize, value: &str) -> Result<i64, ApiError> {
        Ok(self.conn().await?.lrem(key, count, value).await?)
    }

    /// `LMOVE src dst LEFT|RIGHT LEFT|RIGHT`, returning the moved element if one existed
    pub async fn lmove(
        &self,
        src: &str,
        dst: &str,
        src_dir: Direction,
        dst_dir: Direction,
    ) -> Result<Option<String>, ApiError> {
        let mut cmd = redis::cmd("LMOVE");
        cmd.arg(src).arg(dst).arg(src_dir.as_str()).arg(dst_dir.as_str());
        Ok(cmd.query_async(&mut *self.conn().await?).await?)
    }

    /// Run a caller-built pipeline atomically (`MULTI`/`EXEC` under the hood)
    pub async fn pipeline<T>(&self, pipe: &redis::Pipeline) -> Result<T, ApiError>
    where
        T: redis::FromRedisValue,
    {
        Ok(pipe.query_async(&mut *self.conn().await?).await?)
    }

    /// Start an empty atomic pipeline for the caller to fill in
    #[must_use]
    pub fn new_pipeline() -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe
    }

    /// Run `f` under an optimistic WATCH/MULTI/EXEC transaction, retrying up
    /// to `max_attempts` times if a watched key changes before `EXEC`.
    ///
    /// `f` receives the current value of `key` (or `None` if absent) and
    /// must return the pipeline of commands to execute plus a value to hand
    /// back to the caller on success. Returns `ErrorKind::Conflict` if every
    /// attempt aborts.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to watch
    /// * `max_attempts` - How many times to retry on abort (spec.md §4.7: 5)
    /// * `f` - Builds the transaction body from the watched key's current value
    pub async fn optimistic<T, F>(
        &self,
        key: &str,
        max_attempts: u32,
        mut f: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut(Option<String>) -> Result<(redis::Pipeline, T), ApiError>,
        T: Clone,
    {
        let mut attempt = 0;
        loop {
            let mut conn = self.conn().await?;
            // watch the key so the server aborts our transaction if it changes
            redis::cmd("WATCH").arg(key).query_async::<()>(&mut *conn).await?;
            let current: Option<String> = conn.get(key).await?;
            let (mut pipe, value) = match f(current) {
                Ok(built) => built,
                Err(err) => {
                    redis::cmd("UNWATCH").query_async::<()>(&mut *conn).await?;
                    return Err(err);
                }
            };
            pipe.atomic();
            // a `None` result means EXEC returned nil: a watched key changed, abort
            let result: Option<Vec<redis::Value>> = pipe.query_async(&mut *conn).await?;
            match result {
                Some(_) => return Ok(value),
                None => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(ApiError::new(
                            crate::utils::ErrorKind::Conflict,
                            Some(format!(
                                "optimistic transaction on {key} aborted {attempt} times"
                            )),
                        ));
                    }
                }
            }
        }
    }
}

/// The direction argument to `LMOVE`/`LPOP`/`RPOP`-shaped commands
#[derive(Debug, Clone, Copy)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}
