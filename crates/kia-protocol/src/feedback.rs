//! 反馈帧解析
//!
//! 将车身 CAN 帧解析为遥测值：转向角（SAS11）和四轮轮速（WHL_SPD11）。

use crate::ids::KiaFrameId;
use crate::{KiaFrame, ProtocolError, bytes_to_i16_le, extract_bits_le};

/// 轮速信号分辨率（km/h / LSB）
pub const WHEEL_SPEED_SCALE_KMPH: f64 = 0.031_25;

/// 转向角速度分辨率（deg/s / LSB）
pub const STEERING_SPEED_SCALE_DPS: u16 = 4;

/// 转向角反馈
///
/// 角度以 0.1 度（deci-degree）为单位，左转为正。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SteeringAngle {
    /// 方向盘转角（0.1 度）
    pub angle_deci_degrees: i16,
    /// 方向盘角速度（deg/s）
    pub rotation_speed_dps: u16,
}

impl SteeringAngle {
    pub fn new(angle_deci_degrees: i16) -> Self {
        Self {
            angle_deci_degrees,
            rotation_speed_dps: 0,
        }
    }

    /// 转换为度
    pub fn degrees(&self) -> f64 {
        f64::from(self.angle_deci_degrees) / 10.0
    }
}

impl TryFrom<&KiaFrame> for SteeringAngle {
    type Error = ProtocolError;

    fn try_from(frame: &KiaFrame) -> Result<Self, Self::Error> {
        check_frame(frame, KiaFrameId::SteeringAngle)?;

        Ok(Self {
            angle_deci_degrees: bytes_to_i16_le([frame.data[0], frame.data[1]]),
            rotation_speed_dps: u16::from(frame.data[2]) * STEERING_SPEED_SCALE_DPS,
        })
    }
}

/// 四轮轮速反馈（km/h）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Velocity {
    pub front_left: f64,
    pub front_right: f64,
    pub rear_left: f64,
    pub rear_right: f64,
}

impl Velocity {
    pub fn new(front_left: f64, front_right: f64, rear_left: f64, rear_right: f64) -> Self {
        Self {
            front_left,
            front_right,
            rear_left,
            rear_right,
        }
    }

    /// 四轮平均速度（km/h）
    pub fn average_kmph(&self) -> f64 {
        (self.front_left + self.front_right + self.rear_left + self.rear_right) / 4.0
    }
}

impl TryFrom<&KiaFrame> for Velocity {
    type Error = ProtocolError;

    fn try_from(frame: &KiaFrame) -> Result<Self, Self::Error> {
        check_frame(frame, KiaFrameId::WheelSpeed)?;

        // 每个轮速占 14 bit，起始位分别为 0/16/32/48
        let wheel = |start_bit: u32| {
            f64::from(extract_bits_le(&frame.data, start_bit, 14)) * WHEEL_SPEED_SCALE_KMPH
        };

        Ok(Self {
            front_left: wheel(0),
            front_right: wheel(16),
            rear_left: wheel(32),
            rear_right: wheel(48),
        })
    }
}

fn check_frame(frame: &KiaFrame, expected: KiaFrameId) -> Result<(), ProtocolError> {
    if frame.is_extended || frame.id != u32::from(expected) {
        return Err(ProtocolError::InvalidCanId { id: frame.id });
    }
    if (frame.len as usize) < expected.min_len() {
        return Err(ProtocolError::InvalidLength {
            expected: expected.min_len(),
            actual: frame.len as usize,
        });
    }
    Ok(())
}
