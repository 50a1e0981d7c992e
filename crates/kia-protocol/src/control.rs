//! 控制命令记录
//!
//! 发往转向执行器的命令。命令本身不带时间戳，存入历史或日志时
//! 由 `Timestamped` 包装。

/// 转向控制命令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KiaControlCommand {
    /// 叠加在驾驶员输入上的转向力矩偏置（执行器单位，正值向左）
    pub steering_torque_offset: i16,
    /// 生成该命令时闭环跟踪的目标角（0.1 度），手动命令为 `None`
    pub target_angle_deci_degrees: Option<i16>,
}

impl KiaControlCommand {
    /// 闭环控制器生成的命令
    pub fn steer(steering_torque_offset: i16, target_angle_deci_degrees: i16) -> Self {
        Self {
            steering_torque_offset,
            target_angle_deci_degrees: Some(target_angle_deci_degrees),
        }
    }

    /// 手动单次命令（不关联目标角）
    pub fn manual(steering_torque_offset: i16) -> Self {
        Self {
            steering_torque_offset,
            target_angle_deci_degrees: None,
        }
    }

    /// 零力矩命令，用于释放执行器
    pub fn release() -> Self {
        Self::default()
    }

    pub fn is_release(&self) -> bool {
        self.steering_torque_offset == 0
    }
}
