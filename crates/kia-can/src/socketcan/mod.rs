//! SocketCAN CAN 适配器实现
//!
//! Linux 平台下基于内核 SocketCAN 的接收实现。
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**
//! - **接口配置**：波特率由系统工具（`ip link`）完成，不在应用层设置
//! - **时间戳**：使用接收时刻的用户空间单调时钟，由上层统一打时间戳

use crate::{CanAdapter, CanError, KiaFrame};
use socketcan::{CanError as SocketCanError, CanFrame, CanSocket, EmbeddedFrame, Frame, Socket};
use std::io::ErrorKind;
use std::time::Duration;
use tracing::{error, trace, warn};

mod interface_check;

use interface_check::check_interface_status;

/// 默认读超时（与接收线程的退出检查周期一致）
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(2);

/// SocketCAN 适配器
///
/// # 示例
///
/// ```no_run
/// use kia_can::{CanAdapter, SocketCanAdapter};
///
/// let mut adapter = SocketCanAdapter::new("can0").unwrap();
/// let frame = adapter.receive().unwrap();
/// ```
#[derive(Debug)]
pub struct SocketCanAdapter {
    socket: CanSocket,
    interface: String,
    read_timeout: Duration,
}

impl SocketCanAdapter {
    /// 打开 CAN 接口
    ///
    /// 打开 socket 之前会检查接口是否存在且处于 UP 状态。
    ///
    /// # 错误
    /// - `CanError::Device`: 接口不存在、未启动或无法打开
    /// - `CanError::Io`: 设置读超时失败
    pub fn new(interface: impl Into<String>) -> Result<Self, CanError> {
        let interface = interface.into();

        if !check_interface_status(&interface)? {
            return Err(CanError::Device(format!(
                "CAN interface '{}' exists but is not UP. Please start it first:\n  sudo ip link set up {}",
                interface, interface
            )));
        }

        let socket = CanSocket::open(&interface).map_err(|e| {
            CanError::Device(format!("Failed to open CAN interface '{}': {}", interface, e))
        })?;
        socket.set_read_timeout(DEFAULT_READ_TIMEOUT)?;

        trace!("SocketCAN interface '{}' opened", interface);

        Ok(Self {
            socket,
            interface,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// 获取接口名称
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// 获取当前读超时
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// 设置读超时
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), CanError> {
        self.socket.set_read_timeout(timeout)?;
        self.read_timeout = timeout;
        Ok(())
    }

    fn to_kia_frame(frame: &CanFrame) -> KiaFrame {
        let mut data = [0u8; 8];
        let frame_data = frame.data();
        let len = frame_data.len().min(8);
        data[..len].copy_from_slice(&frame_data[..len]);

        KiaFrame {
            id: frame.raw_id(),
            data,
            len: len as u8,
            is_extended: frame.is_extended(),
            timestamp_us: 0,
        }
    }
}

impl CanAdapter for SocketCanAdapter {
    /// 接收帧（阻塞直到收到有效数据帧或超时）
    ///
    /// 错误帧被过滤：Bus Off 作为错误返回，其余错误帧记录后继续接收。
    fn receive(&mut self) -> Result<KiaFrame, CanError> {
        loop {
            let frame = match self.socket.read_frame() {
                Ok(frame) => frame,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(CanError::Timeout);
                },
                Err(e) => return Err(CanError::Io(e)),
            };

            match frame {
                CanFrame::Error(error_frame) => match SocketCanError::from(error_frame) {
                    SocketCanError::BusOff => {
                        error!("CAN Bus Off error detected on '{}'", self.interface);
                        return Err(CanError::BusOff);
                    },
                    other => {
                        warn!("CAN Error Frame received: {}, ignoring", other);
                        continue;
                    },
                },
                CanFrame::Remote(_) => continue,
                data_frame => {
                    let kia_frame = Self::to_kia_frame(&data_frame);
                    trace!(
                        "Received CAN frame: ID=0x{:X}, len={}",
                        kia_frame.id, kia_frame.len
                    );
                    return Ok(kia_frame);
                },
            }
        }
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        if let Err(e) = self.set_read_timeout(timeout) {
            warn!("Failed to set receive timeout: {}", e);
        }
    }
}
