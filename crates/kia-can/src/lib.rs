//! # Kia CAN Adapter Layer
//!
//! CAN 硬件抽象层，提供统一的 CAN 接收接口。

use std::time::Duration;
use thiserror::Error;

pub use kia_protocol::KiaFrame;

#[cfg(target_os = "linux")]
pub mod socketcan;

#[cfg(target_os = "linux")]
pub use socketcan::SocketCanAdapter;

/// CAN 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(String),
    #[error("Read timeout")]
    Timeout,
    #[error("Buffer overflow")]
    BufferOverflow,
    #[error("Bus off")]
    BusOff,
    #[error("Unsupported platform: {0}")]
    Unsupported(&'static str),
}

impl CanError {
    /// 是否为不可恢复错误（接收线程应退出）
    pub fn is_fatal(&self) -> bool {
        matches!(self, CanError::Device(_) | CanError::Unsupported(_))
    }
}

/// CAN 适配器
///
/// 实现方必须保证 `receive()` 受读超时约束，接收线程依赖超时返回
/// 来检查退出标志。
pub trait CanAdapter {
    fn receive(&mut self) -> Result<KiaFrame, CanError>;
    fn set_receive_timeout(&mut self, _timeout: Duration) {}
    fn receive_timeout(&mut self, timeout: Duration) -> Result<KiaFrame, CanError> {
        self.set_receive_timeout(timeout);
        self.receive()
    }
}

impl<A: CanAdapter + ?Sized> CanAdapter for Box<A> {
    fn receive(&mut self) -> Result<KiaFrame, CanError> {
        (**self).receive()
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        (**self).set_receive_timeout(timeout)
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<KiaFrame, CanError> {
        (**self).receive_timeout(timeout)
    }
}

/// 按接口名打开平台默认适配器
#[cfg(target_os = "linux")]
pub fn open_default(interface: &str) -> Result<Box<dyn CanAdapter + Send>, CanError> {
    Ok(Box::new(SocketCanAdapter::new(interface)?))
}

/// 按接口名打开平台默认适配器
#[cfg(not(target_os = "linux"))]
pub fn open_default(_interface: &str) -> Result<Box<dyn CanAdapter + Send>, CanError> {
    Err(CanError::Unsupported("SocketCAN is only available on Linux"))
}
