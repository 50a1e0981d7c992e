//! 驱动层错误类型定义

use crate::actuator::ActuatorError;
use crate::json_logger::LoggerError;
use kia_can::CanError;
use kia_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 驱动错误
    #[error("CAN driver error: {0}")]
    Can(#[from] CanError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 执行器通道错误
    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    /// 结构化日志错误
    #[error("Logger error: {0}")]
    Logger(#[from] LoggerError),

    /// 构造时缺少必需的绑定（如消费者未绑定历史）
    #[error("Missing binding: {0}")]
    MissingBinding(&'static str),

    /// 无效配置
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// 线程创建失败
    #[error("Failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// 线程未在超时内退出或已 panic
    #[error("Thread '{0}' did not shut down cleanly")]
    Join(String),
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use kia_can::CanError;
    use kia_protocol::ProtocolError;

    #[test]
    fn test_driver_error_display() {
        let msg = format!("{}", DriverError::Can(CanError::Timeout));
        assert!(msg.contains("CAN") && msg.contains("Read timeout"), "{}", msg);

        let msg = format!(
            "{}",
            DriverError::Protocol(ProtocolError::InvalidLength {
                expected: 8,
                actual: 4,
            })
        );
        assert!(msg.contains("Invalid frame length"), "{}", msg);

        let msg = format!("{}", DriverError::MissingBinding("history"));
        assert_eq!(msg, "Missing binding: history");

        let msg = format!("{}", DriverError::Join("poll-velocity".into()));
        assert!(msg.contains("poll-velocity"));
    }

    #[test]
    fn test_from_can_error() {
        let driver_error: DriverError = CanError::BusOff.into();
        assert!(matches!(driver_error, DriverError::Can(CanError::BusOff)));
    }
}
