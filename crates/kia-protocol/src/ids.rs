//! CAN ID 常量定义和枚举
//!
//! 只收录转向闭环需要的车身帧，其余 ID 由 CAN 层直接丢弃。

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 转向角传感器（SAS11）
pub const ID_STEERING_ANGLE: u32 = 0x2B0;

/// 四轮轮速（WHL_SPD11）
pub const ID_WHEEL_SPEED: u32 = 0x386;

/// 已知帧类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum KiaFrameId {
    /// 转向角传感器
    SteeringAngle = ID_STEERING_ANGLE,
    /// 四轮轮速
    WheelSpeed = ID_WHEEL_SPEED,
}

impl KiaFrameId {
    /// 帧的最小有效长度
    pub const fn min_len(self) -> usize {
        match self {
            KiaFrameId::SteeringAngle => 3,
            KiaFrameId::WheelSpeed => 8,
        }
    }
}
