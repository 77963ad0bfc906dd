//! 命名锁
//!
//! ## 状态机
//!
//! ```text
//! Released --acquire 成功--> Held --release / drop--> Released
//! ```
//!
//! `Held` 期间独占一个会话：咨询锁绑定在会话上，会话归还给池
//! 之前必须先解锁，否则下一个借到该会话的调用方会“继承”这把锁。
//!
//! ## 超时
//!
//! 等待池中会话的时间不计入 `acquire_timeout`，计时从第一次
//! 尝试加锁前开始。两者是相互独立的预算。

use std::fmt;
use std::time::Duration;

use pals_shared::error::{AcquireFailureReason, PalsError, Result};
use pals_shared::observability::metrics::{
    record_lock_abandoned, record_lock_acquire, record_lock_release,
};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::identifier::{LockKey, lock_key, qualified_name};
use crate::locker::Locker;
use crate::options::{AcquireOptions, AcquirePolicy, LockOptions};
use crate::session::{AdvisorySession, LockMode, SessionPool};

/// 一次获取尝试的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquisition {
    Acquired,
    /// 非阻塞模式下立即被拒绝
    Rejected,
    /// 阻塞等待到超时
    TimedOut,
}

/// 命名锁句柄
///
/// 同一个句柄不支持并发使用；需要独立并发获取时为同一个名字创建多个句柄。
pub struct Lock<P: SessionPool> {
    locker: Locker<P>,
    name: String,
    qualified_name: String,
    key: LockKey,
    mode: LockMode,
    overrides: AcquireOptions,
    session: Option<P::Session>,
}

impl<P: SessionPool> Lock<P> {
    pub(crate) fn new(locker: Locker<P>, name: String, options: LockOptions) -> Self {
        let qualified_name = qualified_name(locker.namespace(), &name);
        let key = lock_key(&qualified_name);
        Self {
            locker,
            name,
            qualified_name,
            key,
            mode: options.mode,
            overrides: options.overrides,
            session: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `namespace.name`
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn key(&self) -> LockKey {
        self.key
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn locker(&self) -> &Locker<P> {
        &self.locker
    }

    pub fn is_held(&self) -> bool {
        self.session.is_some()
    }

    /// 实例级有效的阻塞设置（未显式设置时取 Locker 默认值）
    pub fn blocking(&self) -> bool {
        self.policy(AcquireOptions::default()).blocking
    }

    /// 实例级有效的超时设置
    pub fn acquire_timeout(&self) -> Duration {
        self.policy(AcquireOptions::default()).timeout
    }

    fn policy(&self, call: AcquireOptions) -> AcquirePolicy {
        AcquirePolicy::resolve(call, self.overrides, self.locker.defaults())
    }

    /// 按实例策略获取锁
    ///
    /// 锁被占用时返回 `Ok(false)`；只有后端通信失败才返回错误。
    pub async fn acquire(&mut self) -> Result<bool> {
        self.acquire_with(AcquireOptions::default()).await
    }

    /// 以单次调用的覆盖项获取锁，覆盖项不会写回实例
    pub async fn acquire_with(&mut self, options: AcquireOptions) -> Result<bool> {
        let outcome = self.try_acquire(options).await?;
        Ok(outcome == Acquisition::Acquired)
    }

    #[instrument(
        name = "lock.acquire",
        skip(self, options),
        fields(lock = %self.qualified_name, mode = %self.mode)
    )]
    pub(crate) async fn try_acquire(&mut self, options: AcquireOptions) -> Result<Acquisition> {
        if self.session.is_some() {
            debug!("Lock already held by this handle");
            return Ok(Acquisition::Acquired);
        }

        let policy = self.policy(options);
        let mut session = self.locker.pool().acquire_session().await?;

        let started = Instant::now();
        // 超时过大时视为无限等待
        let deadline = started.checked_add(policy.timeout);

        loop {
            // 请求在途时被取消，后端状态未知，只能关闭会话
            session.set_close_on_drop(true);
            match session.try_lock(self.key, self.mode).await {
                Ok(true) => {
                    session.set_close_on_drop(false);
                    self.session = Some(session);
                    self.record_acquire("acquired", started);
                    debug!(
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Lock acquired"
                    );
                    return Ok(Acquisition::Acquired);
                }
                Ok(false) => session.set_close_on_drop(false),
                Err(e) => {
                    // 连接可能已损坏，关闭而不是归还
                    self.record_acquire("error", started);
                    warn!(
                        error = %e,
                        retryable = e.is_retryable(),
                        "Backing store failed while acquiring lock"
                    );
                    return Err(e);
                }
            }

            if !policy.blocking {
                self.record_acquire("rejected", started);
                debug!("Lock is held elsewhere, not waiting");
                return Ok(Acquisition::Rejected);
            }

            let now = Instant::now();
            let pause = match deadline {
                Some(deadline) if now >= deadline => {
                    self.record_acquire("timeout", started);
                    debug!(
                        timeout_ms = policy.timeout.as_millis() as u64,
                        "Timed out waiting for lock"
                    );
                    return Ok(Acquisition::TimedOut);
                }
                Some(deadline) => self.locker.retry_interval().min(deadline - now),
                None => self.locker.retry_interval(),
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// 释放锁
    ///
    /// 持有时返回 `Ok(true)`，未持有时返回 `Ok(false)`，可重复调用。
    /// 后端报告锁并未持有时仍视为释放成功，会话照常归还。
    #[instrument(
        name = "lock.release",
        skip(self),
        fields(lock = %self.qualified_name, mode = %self.mode)
    )]
    pub async fn release(&mut self) -> Result<bool> {
        let Some(mut session) = self.session.take() else {
            return Ok(false);
        };

        session.set_close_on_drop(true);
        match session.unlock(self.key, self.mode).await {
            Ok(released) => {
                session.set_close_on_drop(false);
                let outcome = if released { "released" } else { "not_held" };
                record_lock_release(self.locker.namespace(), self.mode.as_str(), outcome);
                debug!(outcome, "Lock released");
                Ok(true)
            }
            Err(e) => {
                // 会话随 drop 关闭，后端会释放其上的全部咨询锁
                record_lock_release(self.locker.namespace(), self.mode.as_str(), "error");
                warn!(error = %e, "Backing store failed while releasing lock, closing session");
                Err(e)
            }
        }
    }

    /// 放弃持有：不等待结果的后台释放
    pub(crate) fn abandon(&mut self) {
        if let Some(session) = self.session.take() {
            warn!(
                lock = %self.qualified_name,
                "Lock dropped while held - releasing in background"
            );
            record_lock_abandoned(self.locker.namespace());
            release_in_background(session, self.key, self.mode, self.qualified_name.clone());
        }
    }

    fn record_acquire(&self, outcome: &str, started: Instant) {
        record_lock_acquire(
            self.locker.namespace(),
            self.mode.as_str(),
            outcome,
            started.elapsed().as_secs_f64(),
        );
    }

    /// 获取失败时的错误
    pub(crate) fn acquire_failure(&self, outcome: Acquisition) -> PalsError {
        let reason = match outcome {
            Acquisition::TimedOut => AcquireFailureReason::Timeout,
            _ => AcquireFailureReason::Unavailable,
        };
        PalsError::acquire_failure(self.qualified_name.as_str(), reason)
    }
}

/// 尽力而为的释放
///
/// 在当前 tokio 运行时上派生任务解锁后归还会话；没有运行时或解锁失败时
/// 关闭会话，由后端随会话结束释放锁。不会向调用方传播任何错误。
fn release_in_background<S: AdvisorySession>(
    mut session: S,
    key: LockKey,
    mode: LockMode,
    qualified_name: String,
) {
    // 任务来不及执行（例如运行时关闭）时会话同样被关闭
    session.set_close_on_drop(true);

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                match session.unlock(key, mode).await {
                    Ok(_) => {
                        session.set_close_on_drop(false);
                        debug!(lock = %qualified_name, "Abandoned lock released");
                    }
                    Err(e) => {
                        warn!(
                            lock = %qualified_name,
                            error = %e,
                            "Failed to release abandoned lock, closing session"
                        );
                    }
                }
            });
        }
        Err(_) => {
            debug!(lock = %qualified_name, "No runtime available, closing session of abandoned lock");
            drop(session);
        }
    }
}

impl<P: SessionPool> Drop for Lock<P> {
    fn drop(&mut self) {
        self.abandon();
    }
}

impl<P: SessionPool> fmt::Debug for Lock<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("qualified_name", &self.qualified_name)
            .field("key", &self.key)
            .field("mode", &self.mode)
            .field("overrides", &self.overrides)
            .field("held", &self.is_held())
            .finish()
    }
}
