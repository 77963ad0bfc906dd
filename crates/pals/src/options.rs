//! 获取策略与覆盖优先级
//!
//! 三层配置，优先级从高到低：单次调用 > 锁实例 > Locker 默认值。
//! 前两层用 `Option` 区分“未设置”和“显式设置”，在使用时才合并。

use std::time::Duration;

use crate::session::LockMode;

/// 可选覆盖项，单次调用和锁实例共用
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquireOptions {
    pub blocking: Option<bool>,
    pub acquire_timeout: Option<Duration>,
}

impl AcquireOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = Some(blocking);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// 以毫秒指定超时
    pub fn acquire_timeout_ms(self, millis: u64) -> Self {
        self.acquire_timeout(Duration::from_millis(millis))
    }

    /// 用 `self` 覆盖 `fallback` 中已设置的项
    pub fn or(self, fallback: AcquireOptions) -> AcquireOptions {
        AcquireOptions {
            blocking: self.blocking.or(fallback.blocking),
            acquire_timeout: self.acquire_timeout.or(fallback.acquire_timeout),
        }
    }
}

/// 创建锁时的选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockOptions {
    pub overrides: AcquireOptions,
    pub mode: LockMode,
}

impl LockOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.overrides = self.overrides.blocking(blocking);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.overrides = self.overrides.acquire_timeout(timeout);
        self
    }

    pub fn acquire_timeout_ms(self, millis: u64) -> Self {
        self.acquire_timeout(Duration::from_millis(millis))
    }

    pub fn shared(mut self, shared: bool) -> Self {
        self.mode = if shared {
            LockMode::Shared
        } else {
            LockMode::Exclusive
        };
        self
    }
}

/// 合并后的有效策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquirePolicy {
    pub blocking: bool,
    pub timeout: Duration,
}

impl AcquirePolicy {
    pub fn resolve(call: AcquireOptions, instance: AcquireOptions, defaults: AcquirePolicy) -> Self {
        let merged = call.or(instance);
        Self {
            blocking: merged.blocking.unwrap_or(defaults.blocking),
            timeout: merged.acquire_timeout.unwrap_or(defaults.timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: AcquirePolicy = AcquirePolicy {
        blocking: true,
        timeout: Duration::from_secs(30),
    };

    #[test]
    fn test_defaults_apply_when_nothing_set() {
        let policy = AcquirePolicy::resolve(AcquireOptions::new(), AcquireOptions::new(), DEFAULTS);
        assert_eq!(policy, DEFAULTS);
    }

    #[test]
    fn test_instance_overrides_defaults() {
        let instance = AcquireOptions::new().blocking(false);
        let policy = AcquirePolicy::resolve(AcquireOptions::new(), instance, DEFAULTS);
        assert!(!policy.blocking);
        assert_eq!(policy.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_call_overrides_instance() {
        let instance = AcquireOptions::new().blocking(false).acquire_timeout_ms(300);
        let call = AcquireOptions::new().blocking(true);
        let policy = AcquirePolicy::resolve(call, instance, DEFAULTS);
        assert!(policy.blocking);
        // 调用方未设置的项继续沿用实例值
        assert_eq!(policy.timeout, Duration::from_millis(300));
    }

    #[test]
    fn test_lock_options_builder() {
        let options = LockOptions::new().shared(true).acquire_timeout_ms(1000);
        assert_eq!(options.mode, LockMode::Shared);
        assert_eq!(options.overrides.acquire_timeout, Some(Duration::from_secs(1)));
        assert_eq!(options.overrides.blocking, None);
        assert_eq!(LockOptions::new().mode, LockMode::Exclusive);
    }
}
