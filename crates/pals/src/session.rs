//! 会话与会话池抽象
//!
//! 锁引擎只消费两件事：从池中借出一个会话，以及在会话上执行
//! 非阻塞的加锁/解锁原语。会话 drop 即归还给池（RAII），
//! 因此不存在单独的 `release_session` 调用。

use std::fmt;

use async_trait::async_trait;
use pals_shared::error::Result;

use crate::identifier::LockKey;

/// 锁模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockMode {
    /// 排他锁：与任何其他持有者冲突
    #[default]
    Exclusive,
    /// 共享锁：只与排他持有者冲突
    Shared,
}

impl LockMode {
    pub fn is_shared(self) -> bool {
        matches!(self, Self::Shared)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exclusive => "exclusive",
            Self::Shared => "shared",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 后端会话上的咨询锁原语
///
/// 锁绑定在会话上：同一会话归还池后锁依然存在，
/// 只有显式解锁或会话关闭才会释放。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdvisorySession: Send + 'static {
    /// 非阻塞尝试加锁，被他人持有时返回 `Ok(false)`
    async fn try_lock(&mut self, key: LockKey, mode: LockMode) -> Result<bool>;

    /// 解锁，返回后端是否确实持有该锁
    async fn unlock(&mut self, key: LockKey, mode: LockMode) -> Result<bool>;

    /// 设置为 true 时，drop 会关闭会话而不是归还给池，
    /// 会话上残留的咨询锁随之由后端释放
    fn set_close_on_drop(&mut self, close: bool);
}

/// 会话池
#[async_trait]
pub trait SessionPool: Send + Sync + 'static {
    type Session: AdvisorySession;

    /// 借出一个会话，池耗尽时等待，直到有会话归还
    async fn acquire_session(&self) -> Result<Self::Session>;

    /// 池容量，即单进程内可同时持有的锁数量上限
    fn capacity(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_mode_default_is_exclusive() {
        assert_eq!(LockMode::default(), LockMode::Exclusive);
        assert!(!LockMode::Exclusive.is_shared());
        assert!(LockMode::Shared.is_shared());
        assert_eq!(LockMode::Shared.to_string(), "shared");
    }
}
