//! 锁名到锁键的映射
//!
//! PostgreSQL 的咨询锁以 `bigint` 为键。这里把 `namespace.name` 哈希成
//! 一个确定的 `i64`，不做碰撞检测，唯一性完全依赖哈希质量。

use std::fmt;
use std::hash::Hasher;

use siphasher::sip::SipHasher13;

/// 咨询锁键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey(i64);

impl LockKey {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// 原始键值，直接绑定到 SQL 参数
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 拼接限定名：`namespace.name`
pub fn qualified_name(namespace: &str, name: &str) -> String {
    let mut qualified = String::with_capacity(namespace.len() + name.len() + 1);
    qualified.push_str(namespace);
    qualified.push('.');
    qualified.push_str(name);
    qualified
}

/// 计算限定名对应的锁键
///
/// SipHash-1-3 使用固定的零密钥，保证跨进程、跨重启结果一致。
pub fn lock_key(qualified_name: &str) -> LockKey {
    let mut hasher = SipHasher13::new();
    hasher.write(qualified_name.as_bytes());
    LockKey(hasher.finish() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::distr::Alphanumeric;
    use std::collections::HashSet;

    fn random_str(rng: &mut impl Rng, len: usize) -> String {
        rng.sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    #[test]
    fn test_lock_key_generation_is_collision_free() {
        let mut rng = rand::rng();
        let mut names = HashSet::new();
        while names.len() < 5000 {
            let len = rng.random_range(6..25);
            names.insert(qualified_name("TestLocker", &random_str(&mut rng, len)));
        }

        let keys: HashSet<LockKey> = names.iter().map(|n| lock_key(n)).collect();
        assert_eq!(keys.len(), 5000);
    }

    #[test]
    fn test_lock_key_is_deterministic() {
        let a = lock_key("TestLock.test_it");
        let b = lock_key(&qualified_name("TestLock", "test_it"));
        assert_eq!(a, b);
        assert_ne!(a, lock_key("TestLock.test_it2"));
    }

    #[test]
    fn test_namespace_scopes_key() {
        assert_ne!(
            lock_key(&qualified_name("app-a", "jobs")),
            lock_key(&qualified_name("app-b", "jobs"))
        );
    }

    #[test]
    fn test_any_input_is_valid() {
        let _ = lock_key("");
        let _ = lock_key("锁.名字\u{0}\u{7f}");
        assert_eq!(qualified_name("", ""), ".");
    }

    #[test]
    fn test_lock_key_display() {
        assert_eq!(LockKey::new(-42).to_string(), "-42");
        assert_eq!(LockKey::new(7).get(), 7);
    }
}
