//! 转向角保持控制器（Steering Angle Holder）
//!
//! 以固定频率读取最新转向角，PID 闭环跟踪目标角，把力矩偏置命令发给执行器。
//!
//! # 目标角
//!
//! 目标角存放在 [`TargetAngleState`]（互斥保护），由操作员设置，控制线程只读。
//! 每次修改都会递增代数（generation），控制线程据此重置 PID 状态：
//!
//! - 新目标：清空积分与微分历史
//! - 清除目标：发送一次零力矩命令后停止输出
//!
//! # 时间处理
//!
//! - 实际 dt 超过 `dt_clamp_multiplier` 倍标称周期时，只重置微分项并钳位 dt
//! - 最新转向角早于 `stale_angle_timeout_ms` 时视为失效，释放执行器直到数据恢复
//!
//! # 示例
//!
//! ```rust,no_run
//! use kia_driver::{
//!     CarMotionData, LineActuatorChannel, SharedActuator, SteeringAngleHolderController,
//!     SteeringAngleHolderSettings, TargetAngleState,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let settings = SteeringAngleHolderSettings::default();
//! let data = CarMotionData::default();
//! let target = Arc::new(TargetAngleState::from_settings(&settings));
//! let actuator = SharedActuator::new(LineActuatorChannel::new(std::io::sink()));
//!
//! let mut controller =
//!     SteeringAngleHolderController::start(settings, &data, target.clone(), actuator)?;
//! target.set(30.0);
//! // ...
//! controller.stop(Duration::from_secs(1))?;
//! # Ok::<(), kia_driver::DriverError>(())
//! ```

use crate::actuator::SharedActuator;
use crate::car_motion::CarMotionData;
use crate::error::DriverError;
use crate::history::TimestampedHistory;
use crate::join::JoinTimeout;
use crate::priority::raise_current_thread_priority;
use crate::timestamped::monotonic_micros;
use kia_protocol::{KiaControlCommand, SteeringAngle};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use spin_sleep::SpinSleeper;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 控制器参数
///
/// 增益单位：执行器力矩单位 / 度。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringAngleHolderSettings {
    /// 比例增益
    pub kp: f64,
    /// 积分增益
    pub ki: f64,
    /// 微分增益
    pub kd: f64,
    /// 积分项绝对值上限（度·秒）
    pub integral_limit: f64,
    /// 输出力矩偏置绝对值上限
    pub max_torque_offset: i16,
    /// 控制频率（Hz）
    pub frequency_hz: f64,
    /// dt 钳位倍数（相对标称周期）
    pub dt_clamp_multiplier: f64,
    /// 转向角数据失效阈值（毫秒）
    pub stale_angle_timeout_ms: u64,
    /// 目标角下限（度）
    pub min_target_deg: f64,
    /// 目标角上限（度）
    pub max_target_deg: f64,
}

impl Default for SteeringAngleHolderSettings {
    fn default() -> Self {
        Self {
            kp: 4.0,
            ki: 1.0,
            kd: 0.2,
            integral_limit: 50.0,
            max_torque_offset: 250,
            frequency_hz: 100.0,
            dt_clamp_multiplier: 2.0,
            stale_angle_timeout_ms: 200,
            min_target_deg: -540.0,
            max_target_deg: 540.0,
        }
    }
}

impl SteeringAngleHolderSettings {
    /// 参数校验
    pub fn validate(&self) -> Result<(), DriverError> {
        if !self.frequency_hz.is_finite() || self.frequency_hz <= 0.0 {
            return Err(DriverError::InvalidConfig(format!(
                "Invalid frequency_hz: {} (must be > 0)",
                self.frequency_hz
            )));
        }
        if self.frequency_hz > 1000.0 {
            warn!(
                "Very high control frequency: {} Hz. The actuator link may not keep up.",
                self.frequency_hz
            );
        }
        if self.dt_clamp_multiplier.is_nan() || self.dt_clamp_multiplier <= 0.0 {
            return Err(DriverError::InvalidConfig(format!(
                "Invalid dt_clamp_multiplier: {} (must be > 0)",
                self.dt_clamp_multiplier
            )));
        }
        if self.max_torque_offset <= 0 {
            return Err(DriverError::InvalidConfig(format!(
                "Invalid max_torque_offset: {} (must be > 0)",
                self.max_torque_offset
            )));
        }
        if self.integral_limit.is_nan() || self.integral_limit < 0.0 {
            return Err(DriverError::InvalidConfig(format!(
                "Invalid integral_limit: {} (must be >= 0)",
                self.integral_limit
            )));
        }
        if [self.kp, self.ki, self.kd].iter().any(|g| !g.is_finite()) {
            return Err(DriverError::InvalidConfig("PID gains must be finite".into()));
        }
        if !self.min_target_deg.is_finite()
            || !self.max_target_deg.is_finite()
            || self.min_target_deg >= self.max_target_deg
        {
            return Err(DriverError::InvalidConfig(format!(
                "Invalid target range: [{}, {}]",
                self.min_target_deg, self.max_target_deg
            )));
        }
        Ok(())
    }

    pub fn nominal_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency_hz)
    }
}

/// 目标角快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSnapshot {
    /// 目标角（度），None 表示未启用闭环
    pub target_deg: Option<f64>,
    /// 每次修改递增
    pub generation: u64,
}

/// 目标角状态（操作员写，控制线程读）
///
/// 所有写入都被钳位到 `[min_deg, max_deg]`。
#[derive(Debug)]
pub struct TargetAngleState {
    slot: Mutex<TargetSnapshot>,
    min_deg: f64,
    max_deg: f64,
}

impl TargetAngleState {
    /// # Panics
    ///
    /// `min_deg > max_deg` 或任一边界为 NaN 时，首次写入会 panic（`f64::clamp`）。
    pub fn new(min_deg: f64, max_deg: f64) -> Self {
        Self {
            slot: Mutex::new(TargetSnapshot {
                target_deg: None,
                generation: 0,
            }),
            min_deg,
            max_deg,
        }
    }

    pub fn from_settings(settings: &SteeringAngleHolderSettings) -> Self {
        Self::new(settings.min_target_deg, settings.max_target_deg)
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min_deg, self.max_deg)
    }

    /// 设置目标角，返回钳位后的实际值；非有限值被忽略并返回 `None`
    pub fn set(&self, target_deg: f64) -> Option<f64> {
        if !target_deg.is_finite() {
            return None;
        }
        let clamped = target_deg.clamp(self.min_deg, self.max_deg);
        let mut slot = self.slot.lock();
        slot.target_deg = Some(clamped);
        slot.generation += 1;
        Some(clamped)
    }

    /// 在当前目标上叠加偏移
    ///
    /// 未设置目标时以 `fallback_deg`（通常是实测角）为基准，再缺省时为 0。
    /// 读取与写入在同一把锁内完成。
    pub fn shift(&self, delta_deg: f64, fallback_deg: Option<f64>) -> Option<f64> {
        if !delta_deg.is_finite() {
            return None;
        }
        let mut slot = self.slot.lock();
        let base = slot.target_deg.or(fallback_deg).unwrap_or(0.0);
        let clamped = (base + delta_deg).clamp(self.min_deg, self.max_deg);
        slot.target_deg = Some(clamped);
        slot.generation += 1;
        Some(clamped)
    }

    /// 清除目标，返回之前的值
    pub fn clear(&self) -> Option<f64> {
        let mut slot = self.slot.lock();
        let previous = slot.target_deg.take();
        slot.generation += 1;
        previous
    }

    pub fn get(&self) -> Option<f64> {
        self.slot.lock().target_deg
    }

    pub fn snapshot(&self) -> TargetSnapshot {
        *self.slot.lock()
    }
}

/// 单轴 PID 状态
#[derive(Debug, Clone)]
struct Pid {
    kp: f64,
    ki: f64,
    kd: f64,
    integral: f64,
    integral_limit: f64,
    last_error: Option<f64>,
    output_limit: f64,
}

impl Pid {
    fn new(settings: &SteeringAngleHolderSettings) -> Self {
        Self {
            kp: settings.kp,
            ki: settings.ki,
            kd: settings.kd,
            integral: 0.0,
            integral_limit: settings.integral_limit,
            last_error: None,
            output_limit: f64::from(settings.max_torque_offset),
        }
    }

    fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
    }

    /// 时间跳变：只丢弃微分历史，保留积分
    fn on_time_jump(&mut self) {
        self.last_error = None;
    }

    fn tick(&mut self, error: f64, dt: Duration) -> f64 {
        let dt_sec = dt.as_secs_f64();
        if dt_sec <= 0.0 {
            return 0.0;
        }

        let p_term = self.kp * error;

        self.integral = (self.integral + error * dt_sec).clamp(-self.integral_limit, self.integral_limit);
        let i_term = self.ki * self.integral;

        let d_term = match self.last_error {
            Some(last) => self.kd * (error - last) / dt_sec,
            None => 0.0,
        };
        self.last_error = Some(error);

        (p_term + i_term + d_term).clamp(-self.output_limit, self.output_limit)
    }
}

#[derive(Debug, Default)]
struct ControllerStats {
    commands_sent: AtomicU64,
    failed_commands: AtomicU64,
}

/// 转向角保持控制器
///
/// Drop 时停止控制线程，线程退出前发送最后一条零力矩命令。
pub struct SteeringAngleHolderController {
    is_running: Arc<AtomicBool>,
    stats: Arc<ControllerStats>,
    handle: Option<JoinHandle<()>>,
}

impl SteeringAngleHolderController {
    /// 校验参数并启动控制线程
    pub fn start(
        settings: SteeringAngleHolderSettings,
        data: &CarMotionData,
        target: Arc<TargetAngleState>,
        actuator: SharedActuator,
    ) -> Result<Self, DriverError> {
        settings.validate()?;

        let is_running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(ControllerStats::default());
        let worker = ControlWorker {
            pid: Pid::new(&settings),
            settings,
            angles: data.steering_angle.clone(),
            commands: data.commands.clone(),
            target,
            actuator,
            stats: stats.clone(),
        };

        let thread_running = is_running.clone();
        let handle = std::thread::Builder::new()
            .name("kia-steer-ctl".into())
            .spawn(move || {
                raise_current_thread_priority("controller");
                worker.run(&thread_running);
            })
            .map_err(|source| DriverError::Spawn {
                name: "kia-steer-ctl".into(),
                source,
            })?;

        info!("Steering angle holder started");
        Ok(Self {
            is_running,
            stats,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 已发送（含失败）的命令数
    pub fn commands_sent(&self) -> u64 {
        self.stats.commands_sent.load(Ordering::Relaxed)
    }

    /// 执行器发送失败次数
    pub fn failed_commands(&self) -> u64 {
        self.stats.failed_commands.load(Ordering::Relaxed)
    }

    /// 停止控制线程并等待最后一条零力矩命令发出
    pub fn stop(&mut self, timeout: Duration) -> Result<(), DriverError> {
        self.is_running.store(false, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle
            .join_timeout(timeout)
            .map_err(|_| DriverError::Join("kia-steer-ctl".into()))?;
        info!("Steering angle holder stopped");
        Ok(())
    }
}

impl Drop for SteeringAngleHolderController {
    fn drop(&mut self) {
        if let Err(e) = self.stop(Duration::from_secs(2)) {
            error!("{}", e);
        }
    }
}

struct ControlWorker {
    settings: SteeringAngleHolderSettings,
    pid: Pid,
    angles: Arc<TimestampedHistory<SteeringAngle>>,
    commands: Arc<TimestampedHistory<KiaControlCommand>>,
    target: Arc<TargetAngleState>,
    actuator: SharedActuator,
    stats: Arc<ControllerStats>,
}

impl ControlWorker {
    fn run(mut self, is_running: &AtomicBool) {
        let sleeper = SpinSleeper::default();
        let period = self.settings.nominal_period();
        let max_dt = period.mul_f64(self.settings.dt_clamp_multiplier);
        let stale_after_us = self.settings.stale_angle_timeout_ms * 1_000;

        let mut last_generation = self.target.snapshot().generation;
        let mut engaged = false;
        let mut angle_stale = false;
        let mut last_time = Instant::now();
        let mut next_tick = last_time + period;

        while is_running.load(Ordering::Acquire) {
            let now = Instant::now();
            let real_dt = now - last_time;
            last_time = now;
            let mut dt = real_dt;
            if real_dt > max_dt {
                if engaged {
                    warn!("Controller time jump: {:?}, resetting derivative term", real_dt);
                }
                self.pid.on_time_jump();
                dt = max_dt;
            }

            let snapshot = self.target.snapshot();
            if snapshot.generation != last_generation {
                last_generation = snapshot.generation;
                self.pid.reset();
                debug!("Target angle changed: {:?}", snapshot.target_deg);
                if snapshot.target_deg.is_none() {
                    self.send(KiaControlCommand::release());
                    engaged = false;
                }
            }

            if let Some(target_deg) = snapshot.target_deg {
                match self.angles.latest() {
                    Some(angle)
                        if monotonic_micros().saturating_sub(angle.timestamp_us()) <= stale_after_us =>
                    {
                        if angle_stale {
                            info!("Steering angle feed recovered");
                            angle_stale = false;
                        }
                        let error = target_deg - angle.value().degrees();
                        let torque = self.pid.tick(error, dt).round() as i16;
                        let target_deci = (target_deg * 10.0).round() as i16;
                        self.send(KiaControlCommand::steer(torque, target_deci));
                        engaged = true;
                    },
                    _ => {
                        if !angle_stale {
                            warn!("Steering angle is stale or missing, releasing actuator");
                            angle_stale = true;
                            self.pid.reset();
                            if engaged {
                                self.send(KiaControlCommand::release());
                                engaged = false;
                            }
                        }
                    },
                }
            }

            let now = Instant::now();
            if next_tick > now {
                sleeper.sleep(next_tick - now);
                next_tick += period;
            } else {
                // 落后超过一个周期时不追赶
                next_tick = now + period;
            }
        }

        self.send(KiaControlCommand::release());
        debug!("Controller thread exiting after final release command");
    }

    fn send(&self, command: KiaControlCommand) {
        self.stats.commands_sent.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.actuator.send_recorded(command, &self.commands) {
            self.stats.failed_commands.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to send steering command: {}", e);
        }
    }
}
