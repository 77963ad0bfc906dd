//! 基于 PostgreSQL 咨询锁的命名锁
//!
//! 多个进程/任务通过同一个数据库协调对共享资源的访问，无需单独部署锁服务。
//! 互斥本身完全由数据库保证，本 crate 只负责正确使用会话池：
//! 每把持有中的锁独占一个会话，释放后确定性地归还，等待时按固定间隔轮询。
//!
//! ## 设计理念
//!
//! - **命名空间隔离**: 锁键由 `namespace.name` 哈希得到，不同应用互不干扰
//! - **竞争不是错误**: `acquire()` 以 `Ok(false)` 表示未获取到锁
//! - **作用域释放**: `with_lock` 在任意退出路径上释放；drop 只是尽力而为的兜底
//!
//! ## 使用示例
//!
//! ```ignore
//! let locker = Locker::connect("billing", &config.database, config.locker).await?;
//!
//! // 手动获取与释放
//! let mut lock = locker.lock("nightly-invoice");
//! if lock.acquire().await? {
//!     run_invoices().await?;
//!     lock.release().await?;
//! }
//!
//! // 作用域内持有，获取失败返回 AcquireFailure
//! locker.with_lock("nightly-invoice", || run_invoices()).await??;
//! ```

pub mod guard;
pub mod identifier;
pub mod lock;
pub mod locker;
pub mod memory;
pub mod options;
pub mod postgres;
pub mod session;

pub use guard::LockGuard;
pub use identifier::{LockKey, lock_key, qualified_name};
pub use lock::Lock;
pub use locker::Locker;
pub use memory::{MemorySession, MemorySessionPool};
pub use options::{AcquireOptions, AcquirePolicy, LockOptions};
pub use pals_shared::config::LockerConfig;
pub use pals_shared::error::{AcquireFailureReason, PalsError, Result};
pub use postgres::{PgSession, PgSessionPool};
pub use session::{AdvisorySession, LockMode, SessionPool};
