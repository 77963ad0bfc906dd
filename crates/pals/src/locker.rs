//! 锁工厂
//!
//! `Locker` 绑定命名空间与会话池，持有命名空间级别的默认策略。
//! 创建锁不触碰池或数据库，所有 I/O 都发生在 `Lock::acquire` 中。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pals_shared::config::{DatabaseConfig, LockerConfig};
use pals_shared::error::Result;
use tracing::info;

use crate::lock::Lock;
use crate::options::{AcquirePolicy, LockOptions};
use crate::postgres::PgSessionPool;
use crate::session::SessionPool;

/// 最小重试间隔，避免配置为 0 时空转
const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// 锁工厂
///
/// 克隆开销很小，克隆之间共享同一个会话池。
pub struct Locker<P: SessionPool> {
    namespace: Arc<str>,
    pool: Arc<P>,
    defaults: AcquirePolicy,
    retry_interval: Duration,
}

impl<P: SessionPool> Clone for Locker<P> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            pool: self.pool.clone(),
            defaults: self.defaults,
            retry_interval: self.retry_interval,
        }
    }
}

impl<P: SessionPool> Locker<P> {
    /// 创建 Locker
    ///
    /// # Arguments
    /// - `namespace`: 应用或子系统名，作为所有锁名的前缀
    /// - `pool`: 会话池
    /// - `config`: 默认策略
    pub fn new(namespace: impl Into<String>, pool: P, config: LockerConfig) -> Self {
        Self::with_shared_pool(namespace, Arc::new(pool), config)
    }

    /// 多个 Locker 共享同一个池
    pub fn with_shared_pool(
        namespace: impl Into<String>,
        pool: Arc<P>,
        config: LockerConfig,
    ) -> Self {
        Self {
            namespace: Arc::from(namespace.into()),
            pool,
            defaults: AcquirePolicy {
                blocking: config.blocking_default,
                timeout: config.acquire_timeout(),
            },
            retry_interval: config.retry_interval().max(MIN_RETRY_INTERVAL),
        }
    }

    /// 使用默认配置创建 Locker（阻塞，超时 30 秒）
    pub fn with_defaults(namespace: impl Into<String>, pool: P) -> Self {
        Self::new(namespace, pool, LockerConfig::default())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn shared_pool(&self) -> Arc<P> {
        self.pool.clone()
    }

    pub fn blocking_default(&self) -> bool {
        self.defaults.blocking
    }

    pub fn acquire_timeout_default(&self) -> Duration {
        self.defaults.timeout
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub(crate) fn defaults(&self) -> AcquirePolicy {
        self.defaults
    }

    /// 创建排他锁，沿用 Locker 默认策略
    pub fn lock(&self, name: impl Into<String>) -> Lock<P> {
        self.lock_with(name, LockOptions::default())
    }

    /// 按选项创建锁
    pub fn lock_with(&self, name: impl Into<String>, options: LockOptions) -> Lock<P> {
        Lock::new(self.clone(), name.into(), options)
    }

    /// 在锁保护下执行 `f`，返回前一定释放
    ///
    /// 获取失败时返回 `PalsError::AcquireFailure`。
    pub async fn with_lock<F, Fut, T>(&self, name: impl Into<String>, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut lock = self.lock(name);
        lock.with_lock(f).await
    }
}

impl Locker<PgSessionPool> {
    /// 连接 PostgreSQL 并创建 Locker
    pub async fn connect(
        namespace: impl Into<String>,
        database: &DatabaseConfig,
        config: LockerConfig,
    ) -> Result<Self> {
        let namespace = namespace.into();
        let pool = PgSessionPool::connect(database).await?;
        info!(
            namespace = %namespace,
            capacity = pool.capacity(),
            "Locker connected"
        );
        Ok(Self::new(namespace, pool, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySessionPool;

    #[test]
    fn test_locker_defaults() {
        let locker = Locker::with_defaults("foo", MemorySessionPool::default());
        assert_eq!(locker.namespace(), "foo");
        assert!(locker.blocking_default());
        assert_eq!(locker.acquire_timeout_default(), Duration::from_millis(30_000));

        let lock = locker.lock("a");
        assert!(lock.blocking());
        assert_eq!(lock.acquire_timeout(), Duration::from_millis(30_000));
    }

    #[test]
    fn test_locker_custom_defaults_propagate() {
        let config = LockerConfig {
            blocking_default: false,
            acquire_timeout_ms: 1000,
            ..Default::default()
        };
        let locker = Locker::new("bar", MemorySessionPool::default(), config);

        let lock = locker.lock("a");
        assert!(!lock.blocking());
        assert_eq!(lock.acquire_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn test_zero_retry_interval_is_clamped() {
        let config = LockerConfig {
            retry_interval_ms: 0,
            ..Default::default()
        };
        let locker = Locker::new("ns", MemorySessionPool::default(), config);
        assert_eq!(locker.retry_interval(), MIN_RETRY_INTERVAL);
    }

    #[test]
    fn test_clones_share_pool() {
        let locker = Locker::with_defaults("ns", MemorySessionPool::new(3));
        let cloned = locker.clone();
        assert!(Arc::ptr_eq(&locker.shared_pool(), &cloned.shared_pool()));
        assert_eq!(cloned.pool().capacity(), 3);
    }

    #[test]
    fn test_lock_construction_touches_nothing() {
        let pool = MemorySessionPool::new(1);
        let locker = Locker::with_defaults("ns", pool.clone());
        let _a = locker.lock("a");
        let _b = locker.lock("a");
        assert_eq!(pool.available(), 1);
    }
}
