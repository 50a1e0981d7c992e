//! 转向执行器通道
//!
//! 执行器挂在串口上，接收 ASCII 行协议：每条命令一行 `S<torque>\n`，
//! `<torque>` 为带符号的十进制力矩偏置。命令是发后即忘的，
//! 执行器不回包。

use crate::history::TimestampedHistory;
use crate::timestamped::monotonic_micros;
use kia_protocol::KiaControlCommand;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// 串口写超时
const SERIAL_WRITE_TIMEOUT: Duration = Duration::from_millis(20);

/// 执行器通道错误
#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// 执行器通道
pub trait ActuatorChannel: Send {
    fn send_command(&mut self, command: &KiaControlCommand) -> Result<(), ActuatorError>;
}

impl<C: ActuatorChannel + ?Sized> ActuatorChannel for Box<C> {
    fn send_command(&mut self, command: &KiaControlCommand) -> Result<(), ActuatorError> {
        (**self).send_command(command)
    }
}

/// 在任意 `Write` 上实现行协议
pub struct LineActuatorChannel<W> {
    writer: W,
}

impl<W: Write + Send> LineActuatorChannel<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// 编码一条命令（不含写出）
    pub fn encode(command: &KiaControlCommand) -> String {
        format!("S{}\n", command.steering_torque_offset)
    }
}

impl<W: Write + Send> ActuatorChannel for LineActuatorChannel<W> {
    fn send_command(&mut self, command: &KiaControlCommand) -> Result<(), ActuatorError> {
        let line = Self::encode(command);
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        trace!("actuator <- {}", line.trim_end());
        Ok(())
    }
}

/// 串口执行器
pub struct SerialActuatorChannel {
    inner: LineActuatorChannel<Box<dyn serialport::SerialPort>>,
    path: String,
}

impl SerialActuatorChannel {
    /// 打开串口（8N1，无流控）
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, ActuatorError> {
        let port = serialport::new(path, baud_rate)
            .timeout(SERIAL_WRITE_TIMEOUT)
            .open()?;
        debug!("Opened actuator serial port {} @ {} baud", path, baud_rate);
        Ok(Self {
            inner: LineActuatorChannel::new(port),
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl ActuatorChannel for SerialActuatorChannel {
    fn send_command(&mut self, command: &KiaControlCommand) -> Result<(), ActuatorError> {
        self.inner.send_command(command)
    }
}

/// 控制线程与手动命令共享的执行器句柄
///
/// 互斥保证一条命令的字节不会与另一条交错。
#[derive(Clone)]
pub struct SharedActuator {
    inner: Arc<Mutex<Box<dyn ActuatorChannel>>>,
}

impl SharedActuator {
    pub fn new(channel: impl ActuatorChannel + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(channel))),
        }
    }

    pub fn send(&self, command: &KiaControlCommand) -> Result<(), ActuatorError> {
        self.inner.lock().send_command(command)
    }

    /// 记录到命令历史后发送，返回记录的时间戳
    ///
    /// 时间戳在持锁期间取得并追加，多个发送方共用同一条历史时仍保持单调。
    /// 发送失败的命令也会留在历史中。
    pub fn send_recorded(
        &self,
        command: KiaControlCommand,
        history: &TimestampedHistory<KiaControlCommand>,
    ) -> Result<u64, ActuatorError> {
        let mut channel = self.inner.lock();
        let timestamp_us = monotonic_micros();
        history.append(command, timestamp_us);
        channel.send_command(&command)?;
        Ok(timestamp_us)
    }
}

impl std::fmt::Debug for SharedActuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedActuator").finish_non_exhaustive()
    }
}
