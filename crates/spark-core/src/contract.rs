//! 调用契约原语。

use std::time::{Duration, Instant};

/// 截止原语，统一描述阻塞操作的最迟完成时间。
///
/// # 设计背景（Why）
/// - 所有发送/接收调用都携带截止时间，分层实现只负责原样透传，真正的等待与超时判定由终端传输完成；
/// - 以单调时钟 [`Instant`] 表达绝对时间点，避免壁钟回拨导致的误判。
///
/// # 契约说明（What）
/// - `Deadline` 可以为空（[`Deadline::none`]），代表调用方不施加超时限制，操作可无限期阻塞；
/// - 到期是唯一的中止手段，框架不提供独立的取消调用；
/// - 值语义：`Copy`，在层间传递时不会被改写。
///
/// # 风险提示（Trade-offs）
/// - `after` 在时间溢出时退化为“无截止”，极端超时值不会导致 panic。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Deadline {
    instant: Option<Instant>,
}

impl Deadline {
    /// 创建未设置截止时间的实例。
    pub const fn none() -> Self {
        Self { instant: None }
    }

    /// 根据绝对时间点构造截止时间。
    pub fn at(instant: Instant) -> Self {
        Self {
            instant: Some(instant),
        }
    }

    /// 基于当前时间点加持续时间生成截止时间。
    pub fn after(timeout: Duration) -> Self {
        Self::with_timeout(Instant::now(), timeout)
    }

    /// 基于给定时间点加持续时间生成截止时间。
    pub fn with_timeout(now: Instant, timeout: Duration) -> Self {
        Self {
            instant: now.checked_add(timeout),
        }
    }

    /// 返回内部时间点，便于终端传输与自定义调度器协作。
    pub fn instant(&self) -> Option<Instant> {
        self.instant
    }

    /// 判断是否已经超时。
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.instant {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// 距离截止时间的剩余时长；未设置截止时间时返回 `None`。
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.instant
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

impl From<Instant> for Deadline {
    fn from(instant: Instant) -> Self {
        Self::at(instant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_deadline_never_expires() {
        let deadline = Deadline::none();
        let later = Instant::now() + Duration::from_secs(3600);
        assert!(!deadline.is_expired(later));
        assert_eq!(deadline.remaining(later), None);
        assert_eq!(Deadline::default(), deadline);
    }

    #[test]
    fn expiry_is_inclusive_of_the_deadline_instant() {
        let now = Instant::now();
        let deadline = Deadline::with_timeout(now, Duration::from_millis(10));
        assert!(!deadline.is_expired(now));
        assert!(deadline.is_expired(now + Duration::from_millis(10)));
        assert_eq!(
            deadline.remaining(now + Duration::from_millis(4)),
            Some(Duration::from_millis(6))
        );
        assert_eq!(
            deadline.remaining(now + Duration::from_secs(1)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn overflowing_timeout_degrades_to_unbounded() {
        let deadline = Deadline::with_timeout(Instant::now(), Duration::MAX);
        assert_eq!(deadline.instant(), None);
    }
}
