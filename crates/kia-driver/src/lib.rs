//! 驱动层模块
//!
//! 本模块提供转向系统的实时数据面，包括：
//! - 带时间戳的值历史（单写多读，阻塞式 "等待下一个值"）
//! - 有界等待计时器与通用轮询消费者线程
//! - CAN 接收线程（把车身帧解析进历史）
//! - 转向角闭环控制线程与串口执行器通道
//! - 追加写入的 JSON 结构化日志
//!
//! # 线程模型
//!
//! ```text
//! CAN 接收线程 ──append──▶ TimestampedHistory ──wait_get_next──▶ PollConsumer (×N)
//!                               │
//!                               └──latest──▶ 闭环控制线程 ──send──▶ 执行器
//! ```

pub mod actuator;
pub mod car_motion;
pub mod controller;
mod error;
pub mod history;
mod join;
pub mod json_logger;
pub mod poll_consumer;
mod priority;
pub mod timestamped;
pub mod wait_timer;

pub use actuator::{
    ActuatorChannel, ActuatorError, LineActuatorChannel, SerialActuatorChannel, SharedActuator,
};
pub use car_motion::{CarMotionData, CarMotionDataUpdater, UpdaterMetrics, UpdaterMetricsSnapshot};
pub use controller::{
    SteeringAngleHolderController, SteeringAngleHolderSettings, TargetAngleState, TargetSnapshot,
};
pub use error::DriverError;
pub use history::TimestampedHistory;
pub use json_logger::{LoggerError, TimestampedJsonLogger};
pub use poll_consumer::{ConsumerState, PollConsumer, PollConsumerBuilder};
pub use timestamped::{Timestamped, monotonic_micros};
pub use wait_timer::BoundedWaitTimer;
