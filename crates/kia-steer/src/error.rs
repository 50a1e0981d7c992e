//! 协调层错误类型

use kia_can::CanError;
use kia_driver::{ActuatorError, DriverError, LoggerError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SteerError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("CAN error: {0}")]
    Can(#[from] CanError),

    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Logger error: {0}")]
    Logger(#[from] LoggerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// 操作员输入的目标角无法解析
    #[error("Invalid target angle: {0:?}")]
    InvalidTarget(String),

    #[error("Coordinator already shut down")]
    ShutDown,
}
