//! 带时间戳的值历史（Timestamped History）
//!
//! 单写多读的追加式存储，按时间戳有序。
//!
//! # 并发语义
//!
//! - **单写者**: 每个历史只绑定一个生产者线程，`append` 时间戳必须单调不减
//! - **多读者**: 任意数量的消费者各自维护游标，互不干扰
//! - **广播唤醒**: 一次 `append` 唤醒所有阻塞在 `wait_get_next` 的线程
//! - **只读查询**: 读取不修改历史，只在查找和克隆期间持有锁
//!
//! # 示例
//!
//! ```rust
//! use kia_driver::history::TimestampedHistory;
//! use std::time::Duration;
//!
//! let history = TimestampedHistory::new();
//! history.append(10i16, 100);
//! history.append(20i16, 200);
//!
//! let next = history.wait_get_next(100, Duration::from_millis(10)).unwrap();
//! assert_eq!(*next.value(), 20);
//! assert!(history.wait_get_next(200, Duration::from_millis(1)).is_none());
//! ```

use crate::timestamped::Timestamped;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 带时间戳的值历史
pub struct TimestampedHistory<T> {
    entries: Mutex<VecDeque<Timestamped<T>>>,
    appended: Condvar,
    /// 保留条数上限（超出后淘汰最旧的条目），None 表示不限
    capacity_limit: Option<usize>,
}

impl<T: Clone> TimestampedHistory<T> {
    /// 创建不限长度的历史
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            appended: Condvar::new(),
            capacity_limit: None,
        }
    }

    /// 创建带保留上限的历史
    ///
    /// # Panics
    ///
    /// `limit` 为 0 时 panic。
    pub fn with_capacity_limit(limit: usize) -> Self {
        assert!(limit > 0, "history capacity limit must be positive");
        Self {
            entries: Mutex::new(VecDeque::with_capacity(limit.min(4096))),
            appended: Condvar::new(),
            capacity_limit: Some(limit),
        }
    }

    /// 追加一个值（仅限绑定的生产者调用）
    ///
    /// # Panics
    ///
    /// `timestamp_us` 小于上一次追加的时间戳时 panic（调用方违反前置条件）。
    pub fn append(&self, value: T, timestamp_us: u64) {
        {
            let mut entries = self.entries.lock();
            if let Some(last) = entries.back() {
                assert!(
                    timestamp_us >= last.timestamp_us(),
                    "non-monotonic append: {} < {}",
                    timestamp_us,
                    last.timestamp_us()
                );
            }
            if let Some(limit) = self.capacity_limit
                && entries.len() >= limit
            {
                entries.pop_front();
            }
            entries.push_back(Timestamped::new(value, timestamp_us));
        }
        self.appended.notify_all();
    }

    /// 等待时间戳严格大于 `after_timestamp_us` 的第一个条目
    ///
    /// - 已存在则立即返回其副本
    /// - 否则阻塞直到新条目到达或 `timeout` 耗尽；超时返回 `None`
    ///
    /// 超时是正常的"本周期无更新"，不是错误。
    pub fn wait_get_next(&self, after_timestamp_us: u64, timeout: Duration) -> Option<Timestamped<T>> {
        let deadline = Instant::now() + timeout;
        let mut entries = self.entries.lock();
        loop {
            if let Some(found) = Self::find_next(&entries, after_timestamp_us) {
                return Some(found.clone());
            }
            if self.appended.wait_until(&mut entries, deadline).timed_out() {
                return Self::find_next(&entries, after_timestamp_us).cloned();
            }
        }
    }

    /// 最新条目
    pub fn latest(&self) -> Option<Timestamped<T>> {
        self.entries.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity_limit(&self) -> Option<usize> {
        self.capacity_limit
    }

    fn find_next(entries: &VecDeque<Timestamped<T>>, after_timestamp_us: u64) -> Option<&Timestamped<T>> {
        // 时间戳有序，二分查找第一个 > after 的位置
        let idx = entries.partition_point(|e| e.timestamp_us() <= after_timestamp_us);
        entries.get(idx)
    }
}

impl<T: Clone> Default for TimestampedHistory<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_get_next_returns_first_entry_after_cursor() {
        let history = TimestampedHistory::new();
        history.append('a', 10);
        history.append('b', 20);
        history.append('c', 30);

        let next = history.wait_get_next(0, Duration::ZERO).unwrap();
        assert_eq!((next.timestamp_us(), *next.value()), (10, 'a'));

        let next = history.wait_get_next(10, Duration::ZERO).unwrap();
        assert_eq!(*next.value(), 'b');

        // 游标落在两个条目之间
        let next = history.wait_get_next(25, Duration::ZERO).unwrap();
        assert_eq!(*next.value(), 'c');
    }

    #[test]
    fn test_wait_get_next_times_out_without_new_entries() {
        let history: TimestampedHistory<u8> = TimestampedHistory::new();
        let start = Instant::now();
        assert!(history.wait_get_next(0, Duration::from_millis(30)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_equal_timestamps_are_accepted() {
        let history = TimestampedHistory::new();
        history.append(1, 100);
        history.append(2, 100);
        assert_eq!(history.len(), 2);
        // 严格大于：相同时间戳的第二个条目对游标 100 不可见
        assert!(history.wait_get_next(100, Duration::ZERO).is_none());
    }

    #[test]
    #[should_panic(expected = "non-monotonic append")]
    fn test_append_rejects_decreasing_timestamp() {
        let history = TimestampedHistory::new();
        history.append(1, 200);
        history.append(2, 100);
    }

    #[test]
    fn test_capacity_limit_evicts_oldest() {
        let history = TimestampedHistory::with_capacity_limit(3);
        for ts in 1..=5u64 {
            history.append(ts, ts * 10);
        }
        assert_eq!(history.len(), 3);
        // 游标早于保留窗口时返回最早保留的条目
        let next = history.wait_get_next(0, Duration::ZERO).unwrap();
        assert_eq!(next.timestamp_us(), 30);
        assert_eq!(history.latest().unwrap().timestamp_us(), 50);
    }

    #[test]
    fn test_append_wakes_blocked_waiter() {
        let history = Arc::new(TimestampedHistory::new());
        let reader = {
            let history = history.clone();
            thread::spawn(move || history.wait_get_next(0, Duration::from_secs(2)))
        };

        thread::sleep(Duration::from_millis(20));
        history.append(7u32, 5);

        let got = reader.join().unwrap().unwrap();
        assert_eq!(*got.value(), 7);
    }

    #[test]
    fn test_single_append_wakes_all_waiters() {
        let history = Arc::new(TimestampedHistory::new());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let history = history.clone();
                thread::spawn(move || {
                    let start = Instant::now();
                    let got = history.wait_get_next(0, Duration::from_secs(2));
                    (got, start.elapsed())
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(30));
        history.append("tick", 1);

        for reader in readers {
            let (got, waited) = reader.join().unwrap();
            assert_eq!(*got.unwrap().value(), "tick");
            assert!(waited < Duration::from_secs(1), "waiter was not woken: {:?}", waited);
        }
    }

    #[test]
    fn test_latest_and_is_empty() {
        let history = TimestampedHistory::new();
        assert!(history.is_empty());
        assert!(history.latest().is_none());
        history.append(3.5f64, 1);
        assert!(!history.is_empty());
        assert_eq!(*history.latest().unwrap().value(), 3.5);
        assert_eq!(history.capacity_limit(), None);
    }
}
