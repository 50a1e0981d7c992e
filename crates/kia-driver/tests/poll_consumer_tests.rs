//! 轮询消费者生命周期测试
//!
//! 1. request_stop 之后在一个轮询周期（加调度开销）内退出，无论有无数据
//! 2. 追加 n 个样本，变换闭包恰好执行 n 次且值一致

use kia_driver::history::TimestampedHistory;
use kia_driver::poll_consumer::{ConsumerState, PollConsumer};
use kia_driver::timestamped::monotonic_micros;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const PERIOD: Duration = Duration::from_millis(50);
const SLACK: Duration = Duration::from_millis(50);

#[test]
fn test_stop_latency_idle() {
    let history = Arc::new(TimestampedHistory::<i16>::new());
    let mut consumer = PollConsumer::builder("idle")
        .history(history)
        .period(PERIOD)
        .spawn(|_| {})
        .unwrap();
    thread::sleep(Duration::from_millis(75));

    let start = Instant::now();
    consumer.request_stop();
    consumer.wait_stopped(Duration::from_secs(1)).unwrap();
    assert!(start.elapsed() <= PERIOD + SLACK, "took {:?}", start.elapsed());
    assert_eq!(consumer.state(), ConsumerState::Stopped);
}

#[test]
fn test_stop_latency_under_continuous_data() {
    let history = Arc::new(TimestampedHistory::<i16>::new());
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = processed.clone();
    let mut consumer = PollConsumer::builder("busy")
        .history(history.clone())
        .period(PERIOD)
        .spawn(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

    let producing = Arc::new(AtomicBool::new(true));
    let producer = {
        let history = history.clone();
        let producing = producing.clone();
        thread::spawn(move || {
            let mut i = 0i16;
            while producing.load(Ordering::Relaxed) {
                history.append(i, monotonic_micros());
                i = i.wrapping_add(1);
                thread::sleep(Duration::from_micros(500));
            }
        })
    };

    thread::sleep(Duration::from_millis(100));
    let start = Instant::now();
    consumer.request_stop();
    consumer.wait_stopped(Duration::from_secs(1)).unwrap();
    let elapsed = start.elapsed();

    producing.store(false, Ordering::Relaxed);
    producer.join().unwrap();

    assert!(processed.load(Ordering::Relaxed) > 0);
    assert!(elapsed <= PERIOD + SLACK, "took {:?}", elapsed);
}

#[test]
fn test_transform_runs_exactly_n_times() {
    let history = Arc::new(TimestampedHistory::<i16>::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let consumer = PollConsumer::builder("count")
        .history(history.clone())
        .period(Duration::from_millis(10))
        .spawn(move |sample| sink.lock().push(*sample.value()))
        .unwrap();

    let n = 500;
    let values: Vec<i16> = (0..n).map(|i| (i * 7 - 1_000) as i16).collect();
    for value in &values {
        history.append(*value, monotonic_micros());
    }

    let deadline = Instant::now() + Duration::from_secs(3);
    while seen.lock().len() < n as usize && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    // 额外等待一个周期，确认没有重复调用
    thread::sleep(Duration::from_millis(30));
    consumer.shutdown(Duration::from_secs(1)).unwrap();

    assert_eq!(*seen.lock(), values);
}

#[test]
fn test_request_stop_is_idempotent() {
    let history = Arc::new(TimestampedHistory::<u8>::new());
    let mut consumer = PollConsumer::builder("twice")
        .history(history)
        .period(Duration::from_millis(10))
        .spawn(|_| {})
        .unwrap();

    consumer.request_stop();
    consumer.request_stop();
    consumer.wait_stopped(Duration::from_secs(1)).unwrap();
    consumer.request_stop();
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    // 已 join 过，再次等待立即返回
    consumer.wait_stopped(Duration::from_millis(1)).unwrap();
}
