//! 统一错误处理模块
//!
//! 定义锁服务共享的错误类型，使用 thiserror 提供良好的错误信息。
//!
//! 锁竞争本身不是错误：`acquire()` 以 `Ok(false)` 表示未获取到锁。
//! 只有作用域守卫路径会把获取失败转换为 [`PalsError::AcquireFailure`]。

use std::fmt;

use thiserror::Error;

/// 获取失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquireFailureReason {
    /// 阻塞等待直到超时仍未获取到锁
    Timeout,
    /// 非阻塞模式下锁被他人持有，立即放弃
    Unavailable,
}

impl AcquireFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unavailable => "lock contention",
        }
    }
}

impl fmt::Display for AcquireFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 系统错误类型
#[derive(Debug, Error)]
pub enum PalsError {
    // ==================== 后端存储错误 ====================
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("session pool is closed")]
    PoolClosed,

    // ==================== 锁错误 ====================
    #[error("Lock acquire failed for \"{qualified_name}\". Failed due to {reason}.")]
    AcquireFailure {
        qualified_name: String,
        reason: AcquireFailureReason,
    },

    // ==================== 配置错误 ====================
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // ==================== 通用错误 ====================
    #[error("internal error: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, PalsError>;

impl PalsError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::PoolClosed => "POOL_CLOSED",
            Self::AcquireFailure { .. } => "ACQUIRE_FAILURE",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为瞬时的后端错误
    ///
    /// 只有连接层面的故障（建连超时、I/O、驱动工作线程崩溃）可能在重试后恢复。
    /// 锁竞争与已关闭的池都不属于此类。锁层本身从不重试，由调用方决定是否整体重做。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
            )
        )
    }

    /// 构造获取失败错误
    pub fn acquire_failure(qualified_name: impl Into<String>, reason: AcquireFailureReason) -> Self {
        Self::AcquireFailure {
            qualified_name: qualified_name.into(),
            reason,
        }
    }
}
