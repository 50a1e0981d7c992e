//! 运行配置
//!
//! TOML 文件，所有字段都有默认值，缺省的表或字段取默认：
//!
//! ```toml
//! can_interface = "can0"
//! actuator_tty = "/dev/ttyACM0"
//! log_dir = "./logs"
//!
//! [controller]
//! kp = 4.0
//! frequency_hz = 100.0
//! ```

use crate::error::SteerError;
use kia_driver::SteeringAngleHolderSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// SocketCAN 接口名
    pub can_interface: String,
    /// 执行器串口设备
    pub actuator_tty: String,
    pub actuator_baud_rate: u32,
    /// 结构化日志与运行日志目录
    pub log_dir: PathBuf,
    /// 消费者轮询周期（毫秒），也是退出延迟上限
    pub poll_period_ms: u64,
    /// 每条历史的保留条数，0 表示不限
    pub history_capacity: usize,
    /// 左转/右转按钮的步长（度）
    pub target_shift_step_deg: f64,
    /// 界面事件通道容量
    pub event_channel_capacity: usize,
    pub controller: SteeringAngleHolderSettings,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            can_interface: "can0".into(),
            actuator_tty: "/dev/ttyACM0".into(),
            actuator_baud_rate: 115_200,
            log_dir: PathBuf::from("./logs"),
            poll_period_ms: 50,
            history_capacity: 100_000,
            target_shift_step_deg: 5.0,
            event_channel_capacity: 256,
            controller: SteeringAngleHolderSettings::default(),
        }
    }
}

impl SteeringConfig {
    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(text: &str) -> Result<Self, SteerError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 读取 TOML 文件
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SteerError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// 文件存在时读取，否则返回默认配置
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, SteerError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String, SteerError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), SteerError> {
        if self.can_interface.trim().is_empty() {
            return Err(SteerError::InvalidConfig("can_interface must not be empty".into()));
        }
        if self.actuator_baud_rate == 0 {
            return Err(SteerError::InvalidConfig("actuator_baud_rate must be > 0".into()));
        }
        if self.poll_period_ms == 0 {
            return Err(SteerError::InvalidConfig("poll_period_ms must be > 0".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(SteerError::InvalidConfig("event_channel_capacity must be > 0".into()));
        }
        if !self.target_shift_step_deg.is_finite() || self.target_shift_step_deg <= 0.0 {
            return Err(SteerError::InvalidConfig(format!(
                "target_shift_step_deg must be > 0, got {}",
                self.target_shift_step_deg
            )));
        }
        self.controller.validate()?;
        Ok(())
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn history_capacity_limit(&self) -> Option<usize> {
        (self.history_capacity > 0).then_some(self.history_capacity)
    }
}
