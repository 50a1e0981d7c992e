//! 通用轮询消费者（Poll Consumer）
//!
//! 独立线程循环地在 `TimestampedHistory` 上做有界等待，把取到的值交给
//! 注入的变换闭包。变换闭包是唯一的定制点，每种遥测只需提供一个闭包。
//!
//! # 状态机
//!
//! ```text
//! Running ──request_stop()──▶ StopRequested ──循环退出──▶ Stopped
//! ```
//!
//! - 退出标志在每次迭代开头检查，线程启动前就请求停止也会立即退出
//! - 每次等待最长一个轮询周期，退出延迟 ≤ 一个周期
//! - 变换闭包 panic 时状态同样进入 Stopped
//!
//! # 示例
//!
//! ```rust
//! use kia_driver::history::TimestampedHistory;
//! use kia_driver::poll_consumer::PollConsumer;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let history = Arc::new(TimestampedHistory::<i16>::new());
//! let (tx, rx) = crossbeam_channel::unbounded();
//!
//! let consumer = PollConsumer::builder("angle")
//!     .history(history.clone())
//!     .period(Duration::from_millis(10))
//!     .spawn(move |sample| {
//!         let _ = tx.send(*sample.value());
//!     })
//!     .unwrap();
//!
//! history.append(42i16, 1);
//! assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 42);
//!
//! consumer.shutdown(Duration::from_secs(1)).unwrap();
//! ```

use crate::error::DriverError;
use crate::history::TimestampedHistory;
use crate::join::JoinTimeout;
use crate::timestamped::Timestamped;
use crate::wait_timer::{BoundedWaitTimer, DEFAULT_POLL_PERIOD};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};

/// 消费者生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConsumerState {
    Running = 0,
    StopRequested = 1,
    Stopped = 2,
}

impl ConsumerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::StopRequested,
            _ => Self::Stopped,
        }
    }
}

/// 跨线程共享的状态（原子版本）
#[derive(Debug)]
struct AtomicConsumerState {
    inner: AtomicU8,
}

impl AtomicConsumerState {
    fn new() -> Self {
        Self {
            inner: AtomicU8::new(ConsumerState::Running as u8),
        }
    }

    fn get(&self) -> ConsumerState {
        ConsumerState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// Running → StopRequested；已在停止流程中则不变
    fn request_stop(&self) {
        let _ = self.inner.compare_exchange(
            ConsumerState::Running as u8,
            ConsumerState::StopRequested as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn mark_stopped(&self) {
        self.inner.store(ConsumerState::Stopped as u8, Ordering::Release);
    }
}

/// 线程退出时（包括 panic 展开）标记 Stopped
struct StoppedGuard(Arc<AtomicConsumerState>);

impl Drop for StoppedGuard {
    fn drop(&mut self) {
        self.0.mark_stopped();
    }
}

/// 通用轮询消费者
///
/// Drop 时请求停止并等待线程退出。需要有序关闭的调用方应先对所有消费者
/// 调用 [`request_stop`](Self::request_stop)，再逐个
/// [`wait_stopped`](Self::wait_stopped)，总延迟约为一个周期而不是 N 个。
pub struct PollConsumer {
    name: String,
    state: Arc<AtomicConsumerState>,
    handle: Option<JoinHandle<()>>,
    drains_on_stop: bool,
}

impl PollConsumer {
    pub fn builder<T>(name: impl Into<String>) -> PollConsumerBuilder<T> {
        PollConsumerBuilder {
            name: name.into(),
            history: None,
            period: DEFAULT_POLL_PERIOD,
            start_after_us: 0,
            drain_on_stop: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConsumerState {
        self.state.get()
    }

    /// 是否以 [`PollConsumerBuilder::drain_on_stop`] 构造
    ///
    /// 这类消费者停止时还要处理积压条目，等待退出时应给更长的超时。
    pub fn drains_on_stop(&self) -> bool {
        self.drains_on_stop
    }

    /// 请求停止（非阻塞），循环在下一次迭代开头观察到
    pub fn request_stop(&self) {
        self.state.request_stop();
    }

    /// 等待线程退出
    ///
    /// # 错误
    /// - `DriverError::Join`: 超时未退出，或线程 panic
    pub fn wait_stopped(&mut self, timeout: Duration) -> Result<(), DriverError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle
            .join_timeout(timeout)
            .map_err(|_| DriverError::Join(self.name.clone()))
    }

    /// `request_stop` + `wait_stopped`
    pub fn shutdown(mut self, timeout: Duration) -> Result<(), DriverError> {
        self.request_stop();
        self.wait_stopped(timeout)
    }
}

impl Drop for PollConsumer {
    fn drop(&mut self) {
        self.request_stop();
        let join_timeout = Duration::from_secs(2);
        if let Some(handle) = self.handle.take()
            && handle.join_timeout(join_timeout).is_err()
        {
            error!(
                "Poll consumer '{}' panicked or failed to shut down within {:?}",
                self.name, join_timeout
            );
        }
    }
}

/// 轮询消费者构造器
///
/// 历史绑定是必需的：未绑定时 `spawn` 返回 `DriverError::MissingBinding`，
/// 不会启动线程。
pub struct PollConsumerBuilder<T> {
    name: String,
    history: Option<Arc<TimestampedHistory<T>>>,
    period: Duration,
    start_after_us: u64,
    drain_on_stop: bool,
}

impl<T> PollConsumerBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// 绑定要读取的历史
    pub fn history(mut self, history: Arc<TimestampedHistory<T>>) -> Self {
        self.history = Some(history);
        self
    }

    /// 轮询周期（默认 50ms），也是退出延迟上限
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// 初始游标：只消费时间戳大于此值的条目（默认 0，即从最早保留的条目开始）
    pub fn start_after(mut self, timestamp_us: u64) -> Self {
        self.start_after_us = timestamp_us;
        self
    }

    /// 停止时先处理完停止时刻已存在的条目再退出
    ///
    /// 用于日志类消费者：关闭前最后追加的条目（如释放命令）不会丢失。
    /// 停止时刻之后追加的条目不处理，因此退出延迟仍然有界。
    pub fn drain_on_stop(mut self) -> Self {
        self.drain_on_stop = true;
        self
    }

    /// 启动消费线程
    ///
    /// `transform` 在消费线程上运行，不得阻塞：它的耗时直接推迟游标前进和退出响应。
    pub fn spawn<F>(self, transform: F) -> Result<PollConsumer, DriverError>
    where
        F: FnMut(&Timestamped<T>) + Send + 'static,
    {
        let history = self
            .history
            .ok_or(DriverError::MissingBinding("poll consumer requires a history"))?;
        if self.period.is_zero() {
            return Err(DriverError::InvalidConfig(format!(
                "poll consumer '{}' period must be > 0",
                self.name
            )));
        }

        let state = Arc::new(AtomicConsumerState::new());
        let thread_state = state.clone();
        let period = self.period;
        let cursor = self.start_after_us;
        let drain = self.drain_on_stop;

        let handle = std::thread::Builder::new()
            .name(format!("poll-{}", self.name))
            .spawn(move || {
                let _guard = StoppedGuard(thread_state.clone());
                poll_loop(&history, &thread_state, period, cursor, drain, transform);
            })
            .map_err(|source| DriverError::Spawn {
                name: self.name.clone(),
                source,
            })?;

        debug!("Poll consumer '{}' started (period {:?})", self.name, period);

        Ok(PollConsumer {
            name: self.name,
            state,
            handle: Some(handle),
            drains_on_stop: drain,
        })
    }
}

fn poll_loop<T, F>(
    history: &TimestampedHistory<T>,
    state: &AtomicConsumerState,
    period: Duration,
    mut cursor: u64,
    drain: bool,
    mut transform: F,
) where
    T: Clone,
    F: FnMut(&Timestamped<T>),
{
    let mut timer = BoundedWaitTimer::new(period);
    while state.get() == ConsumerState::Running {
        let remaining = timer.remaining_timeout();
        let next = history.wait_get_next(cursor, remaining);
        timer.wait_finished();
        if let Some(sample) = next {
            cursor = sample.timestamp_us();
            transform(&sample);
        }
    }

    if !drain {
        return;
    }
    let Some(end) = history.latest().map(|last| last.timestamp_us()) else {
        return;
    };
    while cursor < end {
        let Some(sample) = history.wait_get_next(cursor, Duration::ZERO) else {
            break;
        };
        cursor = sample.timestamp_us();
        transform(&sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Instant;

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[test]
    fn test_spawn_without_history_fails_fast() {
        let result = PollConsumer::builder::<i16>("unbound").spawn(|_| {});
        assert!(matches!(result, Err(DriverError::MissingBinding(_))));
    }

    #[test]
    fn test_spawn_with_zero_period_rejected() {
        let history = Arc::new(TimestampedHistory::<i16>::new());
        let result = PollConsumer::builder("zero")
            .history(history)
            .period(Duration::ZERO)
            .spawn(|_| {});
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));
    }

    #[test]
    fn test_transform_invoked_once_per_sample_in_order() {
        let history = Arc::new(TimestampedHistory::<i16>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let consumer = PollConsumer::builder("ordered")
            .history(history.clone())
            .period(Duration::from_millis(10))
            .spawn(move |sample| sink.lock().push((sample.timestamp_us(), *sample.value())))
            .unwrap();

        for i in 1..=20u64 {
            history.append(i as i16 * 10, i);
        }

        assert!(wait_until(Duration::from_secs(2), || seen.lock().len() == 20));
        consumer.shutdown(Duration::from_secs(1)).unwrap();

        let seen = seen.lock();
        let expected: Vec<_> = (1..=20u64).map(|i| (i, i as i16 * 10)).collect();
        assert_eq!(*seen, expected);
    }

    #[test]
    fn test_start_after_skips_older_samples() {
        let history = Arc::new(TimestampedHistory::<u8>::new());
        history.append(1u8, 10);
        history.append(2u8, 20);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let consumer = PollConsumer::builder("late")
            .history(history.clone())
            .period(Duration::from_millis(10))
            .start_after(10)
            .spawn(move |sample| sink.lock().push(*sample.value()))
            .unwrap();

        assert!(wait_until(Duration::from_secs(1), || seen.lock().len() == 1));
        consumer.shutdown(Duration::from_secs(1)).unwrap();
        assert_eq!(*seen.lock(), vec![2]);
    }

    #[test]
    fn test_stop_without_data_within_one_period() {
        let history = Arc::new(TimestampedHistory::<u32>::new());
        let period = Duration::from_millis(50);
        let mut consumer = PollConsumer::builder("idle")
            .history(history)
            .period(period)
            .spawn(|_| {})
            .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(consumer.state(), ConsumerState::Running);

        let start = Instant::now();
        consumer.request_stop();
        assert_eq!(consumer.state(), ConsumerState::StopRequested);
        consumer.wait_stopped(Duration::from_secs(1)).unwrap();
        let elapsed = start.elapsed();

        assert_eq!(consumer.state(), ConsumerState::Stopped);
        assert!(elapsed < period + Duration::from_millis(40), "{:?}", elapsed);
    }

    #[test]
    fn test_stop_requested_before_first_iteration() {
        let history = Arc::new(TimestampedHistory::<u8>::new());
        history.append(5u8, 1);
        let calls = Arc::new(Mutex::new(0usize));
        let sink = calls.clone();

        let consumer = PollConsumer::builder("early-stop")
            .history(history)
            .period(Duration::from_millis(50))
            .spawn(move |_| *sink.lock() += 1)
            .unwrap();
        // 线程可能尚未运行到循环开头
        consumer.request_stop();

        let start = Instant::now();
        consumer.shutdown(Duration::from_secs(1)).unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(*calls.lock() <= 1);
    }

    #[test]
    fn test_drain_on_stop_processes_pending_samples() {
        let history = Arc::new(TimestampedHistory::<u8>::new());
        for i in 1..=3u8 {
            history.append(i, u64::from(i));
        }
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let consumer = PollConsumer::builder("drain")
            .history(history)
            .period(Duration::from_millis(50))
            .drain_on_stop()
            .spawn(move |sample| sink.lock().push(*sample.value()))
            .unwrap();
        assert!(consumer.drains_on_stop());
        consumer.request_stop();
        consumer.shutdown(Duration::from_secs(1)).unwrap();

        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_panicking_transform_reaches_stopped() {
        let history = Arc::new(TimestampedHistory::<u8>::new());
        let mut consumer = PollConsumer::builder("panicky")
            .history(history.clone())
            .period(Duration::from_millis(10))
            .spawn(|_: &Timestamped<u8>| panic!("transform failure"))
            .unwrap();

        history.append(1u8, 1);
        assert!(wait_until(Duration::from_secs(1), || {
            consumer.state() == ConsumerState::Stopped
        }));
        assert!(consumer.wait_stopped(Duration::from_secs(1)).is_err());
    }
}
