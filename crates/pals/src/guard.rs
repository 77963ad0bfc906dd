//! 作用域守卫
//!
//! 两种用法：
//! - `Lock::guard()` 返回 [`LockGuard`]，推荐显式 `release().await`；
//!   未释放就 drop 时走后台释放，只能尽力而为
//! - `Lock::with_lock(f)` 在闭包结束（包括 panic）后一定释放，是唯一有完整保证的方式

use std::future::Future;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use pals_shared::error::Result;
use tracing::warn;

use crate::lock::{Acquisition, Lock};
use crate::options::AcquireOptions;
use crate::session::SessionPool;

/// 锁守卫
///
/// 持有期间借用锁句柄，drop 时若尚未释放则在后台释放。
pub struct LockGuard<'a, P: SessionPool> {
    lock: &'a mut Lock<P>,
    /// 标记锁是否已被释放，避免重复释放
    released: bool,
}

impl<'a, P: SessionPool> LockGuard<'a, P> {
    /// 显式释放锁
    pub async fn release(mut self) -> Result<bool> {
        self.released = true;
        self.lock.release().await
    }
}

impl<P: SessionPool> Deref for LockGuard<'_, P> {
    type Target = Lock<P>;

    fn deref(&self) -> &Self::Target {
        self.lock
    }
}

impl<P: SessionPool> Drop for LockGuard<'_, P> {
    fn drop(&mut self) {
        if !self.released {
            self.lock.abandon();
        }
    }
}

impl<P: SessionPool> Lock<P> {
    /// 按实例策略获取锁并返回守卫
    ///
    /// 获取失败返回 `PalsError::AcquireFailure`，调用方无法在没有锁的情况下继续。
    pub async fn guard(&mut self) -> Result<LockGuard<'_, P>> {
        match self.try_acquire(AcquireOptions::default()).await? {
            Acquisition::Acquired => Ok(LockGuard {
                lock: self,
                released: false,
            }),
            outcome => Err(self.acquire_failure(outcome)),
        }
    }

    /// 在锁保护下执行 `f`
    ///
    /// `f` 正常返回或 panic 都会先释放锁，panic 在释放后继续向上传播。
    pub async fn with_lock<F, Fut, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.guard().await?;
        let outcome = AssertUnwindSafe(async move { f().await })
            .catch_unwind()
            .await;
        let released = guard.release().await;

        match outcome {
            Ok(value) => {
                released?;
                Ok(value)
            }
            Err(panic) => {
                if let Err(e) = released {
                    warn!(error = %e, "Failed to release lock after panic");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}
