//! 有界等待计时器
//!
//! 轮询循环每次迭代只等待一个短周期，保证退出请求在一个周期内被观察到，
//! 与阻塞调用内部实际耗时无关。

use std::time::{Duration, Instant};

/// 默认轮询周期
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(50);

/// 有界等待计时器
///
/// # 示例
///
/// ```rust
/// use kia_driver::wait_timer::BoundedWaitTimer;
/// use std::time::Duration;
///
/// let mut timer = BoundedWaitTimer::new(Duration::from_millis(50));
/// let timeout = timer.remaining_timeout();
/// assert!(timeout <= Duration::from_millis(50));
/// // ... 阻塞等待最多 timeout ...
/// timer.wait_finished();
/// ```
#[derive(Debug, Clone)]
pub struct BoundedWaitTimer {
    period: Duration,
    deadline: Instant,
}

impl BoundedWaitTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: Instant::now() + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 距离截止时间的剩余时长，已过期时返回零
    pub fn remaining_timeout(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// 重新布防：截止时间 = 现在 + 周期
    ///
    /// 不论上一次等待实际消耗了多少时间。
    pub fn wait_finished(&mut self) {
        self.deadline = Instant::now() + self.period;
    }
}

impl Default for BoundedWaitTimer {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_PERIOD)
    }
}
