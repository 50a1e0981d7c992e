//! # Kia Protocol
//!
//! 车辆 CAN 总线遥测协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: CAN ID 常量与帧类型枚举
//! - `feedback`: 反馈帧解析（转向角、轮速）
//! - `control`: 发往转向执行器的控制命令记录
//!
//! ## 字节序
//!
//! 车身 CAN 信号使用 Intel（小端）字节序，与 DBC 定义保持一致。

pub mod control;
pub mod feedback;
pub mod ids;

pub use control::KiaControlCommand;
pub use feedback::{SteeringAngle, Velocity};
pub use ids::KiaFrameId;

use thiserror::Error;

/// CAN 2.0 帧的统一抽象
///
/// `KiaFrame` 是协议层和硬件层之间的中间抽象：协议层只通过
/// `TryFrom<&KiaFrame>` 解析遥测值，不依赖 SocketCAN 的具体类型。
///
/// ```text
/// Protocol Layer (kia-protocol)
///     ↓ TryFrom<&KiaFrame> 解析
/// KiaFrame (此类型)
///     ↓ 转换逻辑在 CAN 层实现
/// CAN Layer (kia-can)
/// ```
///
/// # 示例
///
/// ```rust
/// use kia_protocol::KiaFrame;
///
/// let frame = KiaFrame::new_standard(0x2B0, &[0x10, 0x00]);
/// assert_eq!(frame.id(), 0x2B0);
/// assert_eq!(frame.data_slice(), &[0x10, 0x00]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KiaFrame {
    /// CAN ID（标准帧或扩展帧）
    pub id: u32,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 是否为扩展帧（29-bit ID）
    pub is_extended: bool,

    /// 接收时间戳（微秒），0 表示不可用
    pub timestamp_us: u64,
}

impl KiaFrame {
    /// 创建标准帧
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        Self::new(id as u32, data, false)
    }

    /// 创建扩展帧
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::new(id, data, true)
    }

    fn new(id: u32, data: &[u8], is_extended: bool) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed_data,
            len: len as u8,
            is_extended,
            timestamp_us: 0,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u32 {
        self.id
    }

    /// 按已知帧类型分类，未知 ID 返回 `None`
    pub fn kind(&self) -> Option<KiaFrameId> {
        if self.is_extended {
            return None;
        }
        KiaFrameId::try_from(self.id).ok()
    }
}

/// 协议解析错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid CAN ID: 0x{id:X}")]
    InvalidCanId { id: u32 },
}

/// 小端字节序转 i16
pub fn bytes_to_i16_le(bytes: [u8; 2]) -> i16 {
    i16::from_le_bytes(bytes)
}

/// 从小端帧数据中按位提取无符号字段
///
/// `start_bit` 与 DBC 中 Intel 信号的起始位一致，`width` 最大 32。
pub fn extract_bits_le(data: &[u8; 8], start_bit: u32, width: u32) -> u32 {
    debug_assert!(width > 0 && width <= 32 && start_bit + width <= 64);
    let raw = u64::from_le_bytes(*data);
    ((raw >> start_bit) & ((1u64 << width) - 1)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_new_standard_truncates_to_eight_bytes() {
        let frame = KiaFrame::new_standard(0x123, &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(frame.len, 8);
        assert_eq!(frame.data, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(!frame.is_extended);
        assert_eq!(frame.timestamp_us, 0);
    }

    #[test]
    fn test_frame_kind() {
        let sas = KiaFrame::new_standard(0x2B0, &[0; 5]);
        assert_eq!(sas.kind(), Some(KiaFrameId::SteeringAngle));

        let whl = KiaFrame::new_standard(0x386, &[0; 8]);
        assert_eq!(whl.kind(), Some(KiaFrameId::WheelSpeed));

        let unknown = KiaFrame::new_standard(0x7FF, &[]);
        assert_eq!(unknown.kind(), None);

        // 扩展帧即使 ID 数值相同也不属于车身协议
        let ext = KiaFrame::new_extended(0x2B0, &[0; 5]);
        assert_eq!(ext.kind(), None);
    }

    #[test]
    fn test_bytes_to_i16_le_negative() {
        assert_eq!(bytes_to_i16_le([0xFF, 0xFF]), -1);
        assert_eq!(bytes_to_i16_le([0x34, 0x12]), 0x1234);
    }

    #[test]
    fn test_extract_bits_le() {
        let data = [0xFF, 0x3F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80];
        assert_eq!(extract_bits_le(&data, 0, 14), 0x3FFF);
        assert_eq!(extract_bits_le(&data, 14, 2), 0);
        assert_eq!(extract_bits_le(&data, 63, 1), 1);
    }
}
