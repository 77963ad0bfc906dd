//! PostgreSQL 会话池实现
//!
//! 使用会话级咨询锁：
//!
//! | 模式 | 加锁 | 解锁 |
//! |------|------|------|
//! | 排他 | `pg_try_advisory_lock($1)` | `pg_advisory_unlock($1)` |
//! | 共享 | `pg_try_advisory_lock_shared($1)` | `pg_advisory_unlock_shared($1)` |
//!
//! 会话级锁不随事务结束而释放，归还到池中的连接仍然持有锁，
//! 因此锁引擎在持有期间独占连接，释放后才归还。

use std::time::Instant;

use async_trait::async_trait;
use pals_shared::config::DatabaseConfig;
use pals_shared::database::Database;
use pals_shared::error::{PalsError, Result};
use pals_shared::observability::metrics::record_session_wait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::{debug, instrument, warn};

use crate::identifier::LockKey;
use crate::session::{AdvisorySession, LockMode, SessionPool};

/// 基于 sqlx `PgPool` 的会话池
#[derive(Clone)]
pub struct PgSessionPool {
    pool: PgPool,
}

impl PgSessionPool {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 按配置建立连接池
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let db = Database::connect(config).await?;
        Ok(Self::new(db.into()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionPool for PgSessionPool {
    type Session = PgSession;

    /// 池耗尽不是错误：池已满时 sqlx 的 `acquire_timeout` 到期后继续等待。
    /// 池未满仍超时则是无法建立连接，作为错误返回。
    #[instrument(skip(self), level = "trace")]
    async fn acquire_session(&self) -> Result<PgSession> {
        let started = Instant::now();
        loop {
            match self.pool.acquire().await {
                Ok(conn) => {
                    record_session_wait(started.elapsed().as_secs_f64());
                    return Ok(PgSession::new(conn));
                }
                // 池未满时超时说明是建连失败，数据库不可用必须交给调用方
                Err(e @ sqlx::Error::PoolTimedOut) if self.pool.size() < self.capacity() => {
                    warn!(
                        waited_ms = started.elapsed().as_millis() as u64,
                        size = self.pool.size(),
                        "Failed to open a database session"
                    );
                    return Err(e.into());
                }
                Err(sqlx::Error::PoolTimedOut) => {
                    debug!(
                        waited_ms = started.elapsed().as_millis() as u64,
                        size = self.pool.size(),
                        "Session pool exhausted, still waiting"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn capacity(&self) -> u32 {
        self.pool.options().get_max_connections()
    }
}

/// 借出的 PostgreSQL 连接
///
/// 在 tokio 运行时内 drop 时由 sqlx 归还或关闭连接；运行时之外 drop 时
/// 连接从池中分离后直接断开，服务端随会话结束释放其上的咨询锁。
/// 后者要求 `min_connections` 为 0，否则 sqlx 仍会派生补充连接的任务。
pub struct PgSession {
    /// 只在 drop 中被取走
    conn: Option<PoolConnection<Postgres>>,
    close_on_drop: bool,
}

impl PgSession {
    fn new(conn: PoolConnection<Postgres>) -> Self {
        Self {
            conn: Some(conn),
            close_on_drop: false,
        }
    }

    async fn call(&mut self, sql: &'static str, key: LockKey) -> Result<bool> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| PalsError::Internal("session connection already detached".to_string()))?;
        let acquired = sqlx::query_scalar::<_, bool>(sql)
            .bind(key.get())
            .fetch_one(&mut **conn)
            .await?;
        Ok(acquired)
    }
}

#[async_trait]
impl AdvisorySession for PgSession {
    async fn try_lock(&mut self, key: LockKey, mode: LockMode) -> Result<bool> {
        let sql = match mode {
            LockMode::Exclusive => "SELECT pg_try_advisory_lock($1)",
            LockMode::Shared => "SELECT pg_try_advisory_lock_shared($1)",
        };
        self.call(sql, key).await
    }

    async fn unlock(&mut self, key: LockKey, mode: LockMode) -> Result<bool> {
        let sql = match mode {
            LockMode::Exclusive => "SELECT pg_advisory_unlock($1)",
            LockMode::Shared => "SELECT pg_advisory_unlock_shared($1)",
        };
        let released = self.call(sql, key).await?;
        if !released {
            // PostgreSQL 同时会产生一条 WARNING，这里只补充上下文
            warn!(key = %key, mode = %mode, "Advisory lock was not held by this session");
        }
        Ok(released)
    }

    fn set_close_on_drop(&mut self, close: bool) {
        self.close_on_drop = close;
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };

        if tokio::runtime::Handle::try_current().is_err() {
            // sqlx 归还/关闭连接都要派生任务，没有运行时会 panic；
            // 分离后直接断开，池的名额随之释放
            debug!("No runtime available, detaching session connection");
            drop(conn.detach());
            return;
        }

        if self.close_on_drop {
            // 关闭连接即结束会话，服务端随之释放该会话的全部咨询锁
            conn.close_on_drop();
        }
    }
}
