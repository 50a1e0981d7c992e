//! 转向协调器
//!
//! 负责全部组件的构造与有序关闭，并提供操作员的手动操作入口。
//!
//! # 生命周期
//!
//! ```text
//! 启动：历史 → 结构化日志 → CAN 接收线程 → 控制线程 → 消费者线程
//! 关闭：控制线程（末条零力矩命令）→ 所有消费者 request_stop
//!       → 逐个等待 Stopped → CAN 接收线程 → 释放历史与日志
//! ```
//!
//! 关闭先停写者再停读者：控制线程停下时发出的零力矩命令仍会被日志消费者记录。
//! 消费者先统一请求停止再逐个等待，总延迟约一个轮询周期。

use crate::config::SteeringConfig;
use crate::consumers;
use crate::error::SteerError;
use crate::events::EventSink;
use kia_can::CanAdapter;
use kia_driver::{
    ActuatorChannel, CarMotionData, CarMotionDataUpdater, PollConsumer, SerialActuatorChannel,
    SharedActuator, SteeringAngleHolderController, TargetAngleState, TimestampedJsonLogger,
    UpdaterMetricsSnapshot,
};
use kia_protocol::KiaControlCommand;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// 控制线程与接收线程的 join 超时
const THREAD_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 结构化日志流根键
pub const STEERING_COMMANDS_ROOT: &str = "steering_commands";
pub const STEERING_ANGLES_ROOT: &str = "steering_angles";

/// 本次运行的日志文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    pub steering_commands: PathBuf,
    pub steering_angles: PathBuf,
}

/// 运行状态快照
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorStatus {
    pub target_deg: Option<f64>,
    pub steering_angle_deg: Option<f64>,
    pub velocity_kmph: Option<f64>,
    pub producer_running: bool,
    pub can: UpdaterMetricsSnapshot,
    pub commands_sent: u64,
    pub failed_commands: u64,
    pub log_failures: u64,
    pub dropped_events: u64,
}

/// 转向协调器
///
/// Drop 时按关闭顺序停止所有线程。
pub struct SteeringCoordinator {
    config: SteeringConfig,
    data: CarMotionData,
    target: Arc<TargetAngleState>,
    actuator: SharedActuator,
    updater: Option<CarMotionDataUpdater>,
    controller: Option<SteeringAngleHolderController>,
    consumers: Vec<PollConsumer>,
    events: EventSink,
    log_failures: Arc<AtomicU64>,
    log_paths: LogPaths,
}

impl SteeringCoordinator {
    /// 打开配置中的 CAN 接口与执行器串口并启动
    pub fn connect(config: SteeringConfig, events: EventSink) -> Result<Self, SteerError> {
        let can = kia_can::open_default(&config.can_interface)?;
        let actuator = SerialActuatorChannel::open(&config.actuator_tty, config.actuator_baud_rate)?;
        Self::start(config, can, actuator, events)
    }

    /// 使用给定的 CAN 适配器与执行器通道启动全部组件
    pub fn start<A>(
        config: SteeringConfig,
        can: A,
        actuator: impl ActuatorChannel + 'static,
        events: EventSink,
    ) -> Result<Self, SteerError>
    where
        A: CanAdapter + Send + 'static,
    {
        config.validate()?;
        let run_id = run_id();
        info!(
            "Starting steering coordinator (run {}, CAN {}, logs {})",
            run_id,
            config.can_interface,
            config.log_dir.display()
        );

        // 1. 历史
        let data = CarMotionData::new(config.history_capacity_limit());
        let target = Arc::new(TargetAngleState::from_settings(&config.controller));
        let actuator = SharedActuator::new(actuator);

        // 2. 结构化日志
        let commands_log = TimestampedJsonLogger::create(&config.log_dir, STEERING_COMMANDS_ROOT, &run_id)?;
        let angles_log = TimestampedJsonLogger::create(&config.log_dir, STEERING_ANGLES_ROOT, &run_id)?;
        let log_paths = LogPaths {
            steering_commands: commands_log.path().to_path_buf(),
            steering_angles: angles_log.path().to_path_buf(),
        };

        // 3. CAN 接收线程
        let updater = CarMotionDataUpdater::start(can, &data)?;

        // 4. 控制线程
        let controller =
            SteeringAngleHolderController::start(config.controller.clone(), &data, target.clone(), actuator.clone())?;

        let mut coordinator = Self {
            config,
            data,
            target,
            actuator,
            updater: Some(updater),
            controller: Some(controller),
            consumers: Vec::new(),
            events,
            log_failures: Arc::new(AtomicU64::new(0)),
            log_paths,
        };

        // 5. 消费者；失败时 coordinator 的 Drop 负责回收已启动的线程
        coordinator.spawn_consumers(commands_log, angles_log)?;
        info!("Steering coordinator started with {} consumers", coordinator.consumers.len());
        Ok(coordinator)
    }

    fn spawn_consumers(
        &mut self,
        commands_log: TimestampedJsonLogger<KiaControlCommand>,
        angles_log: TimestampedJsonLogger<kia_protocol::SteeringAngle>,
    ) -> Result<(), SteerError> {
        let period = self.config.poll_period();

        let consumer = PollConsumer::builder("steering-angle")
            .history(self.data.steering_angle.clone())
            .period(period)
            .spawn(consumers::steering_angle(self.events.clone()))?;
        self.consumers.push(consumer);

        let consumer = PollConsumer::builder("velocity")
            .history(self.data.velocity.clone())
            .period(period)
            .spawn(consumers::velocity(self.events.clone()))?;
        self.consumers.push(consumer);

        let consumer = PollConsumer::builder("steering-torque")
            .history(self.data.commands.clone())
            .period(period)
            .spawn(consumers::steering_torque(self.events.clone()))?;
        self.consumers.push(consumer);

        let consumer = PollConsumer::builder("log-steering-commands")
            .history(self.data.commands.clone())
            .period(period)
            .drain_on_stop()
            .spawn(consumers::structured_log(commands_log, self.log_failures.clone()))?;
        self.consumers.push(consumer);

        let consumer = PollConsumer::builder("log-steering-angles")
            .history(self.data.steering_angle.clone())
            .period(period)
            .drain_on_stop()
            .spawn(consumers::structured_log(angles_log, self.log_failures.clone()))?;
        self.consumers.push(consumer);

        Ok(())
    }

    pub fn config(&self) -> &SteeringConfig {
        &self.config
    }

    pub fn data(&self) -> &CarMotionData {
        &self.data
    }

    pub fn log_paths(&self) -> &LogPaths {
        &self.log_paths
    }

    pub fn target_deg(&self) -> Option<f64> {
        self.target.get()
    }

    /// 解析操作员输入（度）并设置目标角
    pub fn set_target_from_input(&self, input: &str) -> Result<f64, SteerError> {
        let trimmed = input.trim();
        let degrees: f64 = trimmed
            .parse()
            .map_err(|_| SteerError::InvalidTarget(trimmed.to_string()))?;
        self.set_target(degrees)
    }

    /// 设置目标角，返回钳位后的实际目标
    pub fn set_target(&self, degrees: f64) -> Result<f64, SteerError> {
        self.ensure_running()?;
        let applied = self
            .target
            .set(degrees)
            .ok_or_else(|| SteerError::InvalidTarget(degrees.to_string()))?;
        info!("Target steering angle set to {:.1} deg", applied);
        Ok(applied)
    }

    /// 在当前目标上叠加偏移；未设置目标时以最新实测角为基准
    pub fn shift_target(&self, delta_degrees: f64) -> Result<f64, SteerError> {
        self.ensure_running()?;
        let measured = self.data.steering_angle.latest().map(|s| s.value().degrees());
        let applied = self
            .target
            .shift(delta_degrees, measured)
            .ok_or_else(|| SteerError::InvalidTarget(delta_degrees.to_string()))?;
        info!("Target steering angle shifted by {:+.1} to {:.1} deg", delta_degrees, applied);
        Ok(applied)
    }

    /// 目标角左移一个步长（角度增大）
    pub fn turn_left(&self) -> Result<f64, SteerError> {
        self.shift_target(self.config.target_shift_step_deg)
    }

    /// 目标角右移一个步长（角度减小）
    pub fn turn_right(&self) -> Result<f64, SteerError> {
        self.shift_target(-self.config.target_shift_step_deg)
    }

    /// 清除目标，控制线程随后发送一次零力矩命令
    pub fn clear_target(&self) -> Option<f64> {
        let previous = self.target.clear();
        info!("Target steering angle cleared (was {:?})", previous);
        previous
    }

    /// 绕过控制线程发送一条手动力矩命令
    ///
    /// 命令同样进入命令历史并被记录到日志。
    pub fn send_single_command(&self, torque: i16) -> Result<(), SteerError> {
        self.ensure_running()?;
        let command = KiaControlCommand::manual(torque);
        self.actuator.send_recorded(command, &self.data.commands)?;
        debug!("Manual steering command sent: {}", torque);
        Ok(())
    }

    pub fn status(&self) -> CoordinatorStatus {
        let (producer_running, can) = match &self.updater {
            Some(updater) => (updater.is_running(), updater.metrics()),
            None => (false, UpdaterMetricsSnapshot::default()),
        };
        let (commands_sent, failed_commands) = self
            .controller
            .as_ref()
            .map_or((0, 0), |c| (c.commands_sent(), c.failed_commands()));

        CoordinatorStatus {
            target_deg: self.target.get(),
            steering_angle_deg: self.data.steering_angle.latest().map(|s| s.value().degrees()),
            velocity_kmph: self.data.velocity.latest().map(|s| s.value().average_kmph()),
            producer_running,
            can,
            commands_sent,
            failed_commands,
            log_failures: self.log_failures.load(Ordering::Relaxed),
            dropped_events: self.events.dropped(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_some()
    }

    /// 按关闭顺序停止所有线程（幂等）
    ///
    /// 各步骤的失败会被记录，关闭流程继续执行；返回遇到的第一个错误。
    pub fn shutdown(&mut self) -> Result<(), SteerError> {
        if self.controller.is_none() && self.consumers.is_empty() && self.updater.is_none() {
            return Ok(());
        }
        info!("Shutting down steering coordinator");
        let mut first_error: Option<SteerError> = None;
        let mut record = |result: Result<(), kia_driver::DriverError>| {
            if let Err(e) = result {
                error!("Shutdown step failed: {}", e);
                first_error.get_or_insert(e.into());
            }
        };

        if let Some(mut controller) = self.controller.take() {
            record(controller.stop(THREAD_JOIN_TIMEOUT));
        }

        for consumer in &self.consumers {
            consumer.request_stop();
        }
        let poll_period = self.config.poll_period();
        for mut consumer in self.consumers.drain(..) {
            let wait = consumer_stop_timeout(&consumer, poll_period);
            let result = consumer.wait_stopped(wait);
            if result.is_err() {
                warn!("Consumer '{}' did not stop within {:?}", consumer.name(), wait);
            }
            record(result);
        }

        if let Some(mut updater) = self.updater.take() {
            record(updater.stop(THREAD_JOIN_TIMEOUT));
        }

        info!(
            "Steering coordinator stopped (logs: {}, {})",
            self.log_paths.steering_commands.display(),
            self.log_paths.steering_angles.display()
        );
        first_error.map_or(Ok(()), Err)
    }

    fn ensure_running(&self) -> Result<(), SteerError> {
        if self.is_running() { Ok(()) } else { Err(SteerError::ShutDown) }
    }
}

impl Drop for SteeringCoordinator {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Coordinator shutdown failed: {}", e);
        }
    }
}

/// 等待消费者退出的超时
///
/// 展示类消费者在一个轮询周期内退出；日志类消费者还要写完积压条目并关闭文件，
/// 使用与其他线程相同的 join 超时。
fn consumer_stop_timeout(consumer: &PollConsumer, poll_period: Duration) -> Duration {
    if consumer.drains_on_stop() {
        THREAD_JOIN_TIMEOUT.max(poll_period * 4)
    } else {
        poll_period * 4
    }
}

/// 运行编号：启动时刻的 UNIX 毫秒数
fn run_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    millis.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kia_driver::TimestampedHistory;

    #[test]
    fn test_logging_consumers_get_join_budget() {
        let history = Arc::new(TimestampedHistory::<u8>::new());
        let period = Duration::from_millis(50);
        let ui = PollConsumer::builder("ui")
            .history(history.clone())
            .period(period)
            .spawn(|_| {})
            .unwrap();
        let log = PollConsumer::builder("log")
            .history(history)
            .period(period)
            .drain_on_stop()
            .spawn(|_| {})
            .unwrap();

        assert_eq!(consumer_stop_timeout(&ui, period), Duration::from_millis(200));
        assert_eq!(consumer_stop_timeout(&log, period), THREAD_JOIN_TIMEOUT);
    }

    #[test]
    fn test_run_id_is_numeric() {
        assert!(run_id().chars().all(|c| c.is_ascii_digit()));
    }
}
