//! 进程内会话池实现（用于测试和单进程场景）
//!
//! 按 PostgreSQL 咨询锁的语义模拟：
//! - 锁归属于会话，同一会话可重入，计数归零才真正释放
//! - 会话归还池后锁仍然存在，会话关闭时其全部锁被释放
//! - 排他锁与其他会话的任何持有冲突，共享锁只与其他会话的排他持有冲突
//!
//! ## 限制
//! - 不跨进程
//! - 不持久化

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use pals_shared::error::{PalsError, Result};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use crate::identifier::LockKey;
use crate::session::{AdvisorySession, LockMode, SessionPool};

/// 默认池容量，与 sqlx 的默认 `max_connections` 一致
pub const DEFAULT_CAPACITY: u32 = 10;

type SessionId = u64;

/// 单个键上的持有情况：会话 -> 重入计数
#[derive(Debug, Default)]
struct Holders {
    exclusive: HashMap<SessionId, u32>,
    shared: HashMap<SessionId, u32>,
}

impl Holders {
    fn conflicts(&self, session: SessionId, mode: LockMode) -> bool {
        let other_exclusive = self.exclusive.keys().any(|s| *s != session);
        match mode {
            LockMode::Shared => other_exclusive,
            LockMode::Exclusive => other_exclusive || self.shared.keys().any(|s| *s != session),
        }
    }

    fn table_mut(&mut self, mode: LockMode) -> &mut HashMap<SessionId, u32> {
        match mode {
            LockMode::Exclusive => &mut self.exclusive,
            LockMode::Shared => &mut self.shared,
        }
    }

    fn is_empty(&self) -> bool {
        self.exclusive.is_empty() && self.shared.is_empty()
    }
}

#[derive(Debug, Default)]
struct LockTable {
    keys: HashMap<LockKey, Holders>,
}

impl LockTable {
    fn try_lock(&mut self, session: SessionId, key: LockKey, mode: LockMode) -> bool {
        let holders = self.keys.entry(key).or_default();
        if holders.conflicts(session, mode) {
            return false;
        }
        *holders.table_mut(mode).entry(session).or_insert(0) += 1;
        true
    }

    fn unlock(&mut self, session: SessionId, key: LockKey, mode: LockMode) -> bool {
        let Some(holders) = self.keys.get_mut(&key) else {
            return false;
        };
        let table = holders.table_mut(mode);
        let released = match table.get_mut(&session) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                table.remove(&session);
                true
            }
            None => false,
        };
        if holders.is_empty() {
            self.keys.remove(&key);
        }
        released
    }

    fn release_all(&mut self, session: SessionId) {
        self.keys.retain(|_, holders| {
            holders.exclusive.remove(&session);
            holders.shared.remove(&session);
            !holders.is_empty()
        });
    }
}

struct PoolInner {
    capacity: u32,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<SessionId>>,
    next_id: AtomicU64,
    locks: Mutex<LockTable>,
}

/// 进程内会话池
///
/// 克隆共享同一个池与锁表；不同的 `MemorySessionPool::new` 之间互不可见，
/// 等价于两个独立的数据库。
#[derive(Clone)]
pub struct MemorySessionPool {
    inner: Arc<PoolInner>,
}

impl MemorySessionPool {
    pub fn new(capacity: u32) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                permits: Arc::new(Semaphore::new(capacity as usize)),
                idle: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                locks: Mutex::new(LockTable::default()),
            }),
        }
    }

    /// 当前可立即借出的会话数
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// 当前被任意会话持有的锁键数量
    pub fn held_keys(&self) -> usize {
        self.inner.locks.lock().keys.len()
    }

    /// 关闭池，之后的借出请求返回 `PoolClosed`
    pub fn close(&self) {
        self.inner.permits.close();
    }
}

impl Default for MemorySessionPool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl SessionPool for MemorySessionPool {
    type Session = MemorySession;

    async fn acquire_session(&self) -> Result<MemorySession> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PalsError::PoolClosed)?;

        let id = self
            .inner
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        trace!(session = id, "Memory session checked out");

        Ok(MemorySession {
            id,
            pool: self.inner.clone(),
            close_on_drop: false,
            _permit: permit,
        })
    }

    fn capacity(&self) -> u32 {
        self.inner.capacity
    }
}

/// 进程内会话
pub struct MemorySession {
    id: SessionId,
    pool: Arc<PoolInner>,
    close_on_drop: bool,
    _permit: OwnedSemaphorePermit,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[async_trait]
impl AdvisorySession for MemorySession {
    async fn try_lock(&mut self, key: LockKey, mode: LockMode) -> Result<bool> {
        Ok(self.pool.locks.lock().try_lock(self.id, key, mode))
    }

    async fn unlock(&mut self, key: LockKey, mode: LockMode) -> Result<bool> {
        Ok(self.pool.locks.lock().unlock(self.id, key, mode))
    }

    fn set_close_on_drop(&mut self, close: bool) {
        self.close_on_drop = close;
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if self.close_on_drop {
            self.pool.locks.lock().release_all(self.id);
            trace!(session = self.id, "Memory session closed");
        } else {
            self.pool.idle.lock().push(self.id);
            trace!(session = self.id, "Memory session returned to pool");
        }
        // permit 随字段一起 drop，唤醒等待中的借出者
    }
}
