//! 车身运动数据与 CAN 接收线程
//!
//! `CarMotionData` 持有三条历史：
//! - `steering_angle`: 由 CAN 接收线程写入（0x2B0）
//! - `velocity`: 由 CAN 接收线程写入（0x386）
//! - `commands`: 由执行器发送路径写入（见 [`SharedActuator::send_recorded`]）
//!
//! 每条历史只有一个写入路径，时间戳取自同一个单调时钟，保证追加有序。
//!
//! [`SharedActuator::send_recorded`]: crate::actuator::SharedActuator::send_recorded

use crate::error::DriverError;
use crate::history::TimestampedHistory;
use crate::join::JoinTimeout;
use crate::priority::raise_current_thread_priority;
use crate::timestamped::monotonic_micros;
use kia_can::{CanAdapter, CanError};
use kia_protocol::{KiaControlCommand, KiaFrame, KiaFrameId, SteeringAngle, Velocity};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 接收线程单次阻塞上限，也是退出响应延迟上限
const RX_POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// 车身运动数据历史集合
pub struct CarMotionData {
    pub steering_angle: Arc<TimestampedHistory<SteeringAngle>>,
    pub velocity: Arc<TimestampedHistory<Velocity>>,
    pub commands: Arc<TimestampedHistory<KiaControlCommand>>,
}

impl CarMotionData {
    /// 创建历史集合，`capacity_limit` 为每条历史的保留上限（None 表示不限）
    pub fn new(capacity_limit: Option<usize>) -> Self {
        fn history<T: Clone>(limit: Option<usize>) -> Arc<TimestampedHistory<T>> {
            Arc::new(match limit {
                Some(limit) => TimestampedHistory::with_capacity_limit(limit),
                None => TimestampedHistory::new(),
            })
        }

        Self {
            steering_angle: history(capacity_limit),
            velocity: history(capacity_limit),
            commands: history(capacity_limit),
        }
    }
}

impl Default for CarMotionData {
    fn default() -> Self {
        Self::new(None)
    }
}

/// 接收线程计数器
///
/// 所有计数器都是原子的，任何线程都可以无锁读取。
#[derive(Debug, Default)]
pub struct UpdaterMetrics {
    /// 收到的总帧数
    pub rx_frames_total: AtomicU64,
    /// 成功解析的转向角帧
    pub steering_angle_updates: AtomicU64,
    /// 成功解析的轮速帧
    pub velocity_updates: AtomicU64,
    /// 与本系统无关的帧
    pub ignored_frames: AtomicU64,
    /// 解析失败（长度不足等）
    pub decode_errors: AtomicU64,
    /// 读超时（无数据时的正常现象）
    pub rx_timeouts: AtomicU64,
    /// 设备错误
    pub device_errors: AtomicU64,
}

impl UpdaterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> UpdaterMetricsSnapshot {
        UpdaterMetricsSnapshot {
            rx_frames_total: self.rx_frames_total.load(Ordering::Relaxed),
            steering_angle_updates: self.steering_angle_updates.load(Ordering::Relaxed),
            velocity_updates: self.velocity_updates.load(Ordering::Relaxed),
            ignored_frames: self.ignored_frames.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            rx_timeouts: self.rx_timeouts.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
        }
    }
}

/// 计数器快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdaterMetricsSnapshot {
    pub rx_frames_total: u64,
    pub steering_angle_updates: u64,
    pub velocity_updates: u64,
    pub ignored_frames: u64,
    pub decode_errors: u64,
    pub rx_timeouts: u64,
    pub device_errors: u64,
}

/// CAN 接收线程（转向角与轮速历史的唯一写者）
///
/// Drop 时停止线程并等待退出。
pub struct CarMotionDataUpdater {
    is_running: Arc<AtomicBool>,
    metrics: Arc<UpdaterMetrics>,
    handle: Option<JoinHandle<()>>,
}

impl CarMotionDataUpdater {
    /// 启动接收线程
    ///
    /// 适配器的读超时被设置为 10ms，线程至少每 10ms 检查一次退出标志。
    pub fn start<A>(mut can: A, data: &CarMotionData) -> Result<Self, DriverError>
    where
        A: CanAdapter + Send + 'static,
    {
        can.set_receive_timeout(RX_POLL_TIMEOUT);

        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(UpdaterMetrics::new());
        let sinks = FrameSinks {
            steering_angle: data.steering_angle.clone(),
            velocity: data.velocity.clone(),
        };

        let thread_running = is_running.clone();
        let thread_metrics = metrics.clone();
        let handle = std::thread::Builder::new()
            .name("kia-can-rx".into())
            .spawn(move || {
                raise_current_thread_priority("CAN RX");
                rx_loop(can, sinks, thread_running, thread_metrics);
            })
            .map_err(|source| DriverError::Spawn {
                name: "kia-can-rx".into(),
                source,
            })?;

        info!("CAN producer thread started");
        Ok(Self {
            is_running,
            metrics,
            handle: Some(handle),
        })
    }

    /// 接收线程是否仍在运行（致命错误后变为 false）
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> UpdaterMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 停止接收线程并等待退出
    pub fn stop(&mut self, timeout: Duration) -> Result<(), DriverError> {
        self.is_running.store(false, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle
            .join_timeout(timeout)
            .map_err(|_| DriverError::Join("kia-can-rx".into()))?;
        debug!("CAN producer thread stopped");
        Ok(())
    }
}

impl Drop for CarMotionDataUpdater {
    fn drop(&mut self) {
        if let Err(e) = self.stop(Duration::from_secs(2)) {
            error!("{}", e);
        }
    }
}

struct FrameSinks {
    steering_angle: Arc<TimestampedHistory<SteeringAngle>>,
    velocity: Arc<TimestampedHistory<Velocity>>,
}

impl FrameSinks {
    fn dispatch(&self, frame: &KiaFrame, metrics: &UpdaterMetrics) {
        let Some(kind) = frame.kind() else {
            metrics.ignored_frames.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let result = match kind {
            KiaFrameId::SteeringAngle => SteeringAngle::try_from(frame).map(|angle| {
                trace!("SAS11: {} deg", angle.degrees());
                self.steering_angle.append(angle, monotonic_micros());
                metrics.steering_angle_updates.fetch_add(1, Ordering::Relaxed);
            }),
            KiaFrameId::WheelSpeed => Velocity::try_from(frame).map(|velocity| {
                trace!("WHL_SPD11: {:.2} km/h", velocity.average_kmph());
                self.velocity.append(velocity, monotonic_micros());
                metrics.velocity_updates.fetch_add(1, Ordering::Relaxed);
            }),
        };

        if let Err(e) = result {
            metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to decode frame 0x{:03X}: {}", frame.id, e);
        }
    }
}

fn rx_loop(
    mut can: impl CanAdapter,
    sinks: FrameSinks,
    is_running: Arc<AtomicBool>,
    metrics: Arc<UpdaterMetrics>,
) {
    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("CAN RX thread: is_running flag is false, exiting");
            break;
        }

        let frame = match can.receive() {
            Ok(frame) => frame,
            Err(CanError::Timeout) => {
                metrics.rx_timeouts.fetch_add(1, Ordering::Relaxed);
                continue;
            },
            Err(e) => {
                metrics.device_errors.fetch_add(1, Ordering::Relaxed);
                if e.is_fatal() {
                    error!("CAN RX thread: fatal error {}, stopping producer", e);
                    is_running.store(false, Ordering::Release);
                    break;
                }
                warn!("CAN RX thread: receive error {}", e);
                continue;
            },
        };

        metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
        sinks.dispatch(&frame, &metrics);
    }
}
