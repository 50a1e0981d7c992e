//! CAN 接口状态检查
//!
//! 通过 sysfs 读取网络接口标志位，只读操作，不需要特殊权限。

use crate::CanError;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::trace;

/// `IFF_UP` 标志位（linux/if.h）
const IFF_UP: u32 = 0x1;

/// IFNAMSIZ - 1
const MAX_IFACE_NAME_LEN: usize = 15;

/// 检查 CAN 接口是否存在且已启动
///
/// # 返回值
/// - `Ok(true)`: 接口存在且 IFF_UP 为真
/// - `Ok(false)`: 接口存在但处于 DOWN 状态
/// - `Err(CanError::Device)`: 接口不存在或接口名无效
pub fn check_interface_status(interface: &str) -> Result<bool, CanError> {
    check_interface_status_in(Path::new("/sys/class/net"), interface)
}

fn check_interface_status_in(sysfs_net: &Path, interface: &str) -> Result<bool, CanError> {
    if interface.is_empty() || interface.len() > MAX_IFACE_NAME_LEN || interface.contains('/') {
        return Err(CanError::Device(format!(
            "Invalid interface name '{}' (1-{} characters, no '/')",
            interface, MAX_IFACE_NAME_LEN
        )));
    }

    let flags_path = sysfs_net.join(interface).join("flags");
    let raw = match fs::read_to_string(&flags_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CanError::Device(format!(
                "CAN interface '{}' does not exist. Please create it first:\n  sudo ip link add dev {} type can",
                interface, interface
            )));
        },
        Err(e) => return Err(CanError::Io(e)),
    };

    let flags = parse_flags(&raw).ok_or_else(|| {
        CanError::Device(format!(
            "Unexpected flags '{}' for interface '{}'",
            raw.trim(),
            interface
        ))
    })?;

    trace!("CAN interface '{}' flags=0x{:x}", interface, flags);
    Ok(flags & IFF_UP != 0)
}

fn parse_flags(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    u32::from_str_radix(hex, 16).ok()
}
