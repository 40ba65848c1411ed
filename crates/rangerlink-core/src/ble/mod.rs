pub mod backend;
pub mod client;
pub mod scanner;

use crate::error::RobotError;
use btleplug::api::BDAddr;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

pub use backend::{BleBackend, RobotBackend, RobotChannel};
pub use client::RobotLink;
pub use scanner::{DiscoveredDevice, RobotScanner, ScanCallback, ScanOutcome};

/// 机器人蓝牙模块的默认 MAC 地址
pub const TARGET_ADDRESS: &str = "00:1B:10:69:20:1E";
pub const TARGET_ADDRESS_BYTES: [u8; 6] = [0x00, 0x1B, 0x10, 0x69, 0x20, 0x1E];

pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);
pub const WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ffe3_0000_1000_8000_00805f9b34fb);
pub const NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ffe2_0000_1000_8000_00805f9b34fb);
/// Client Characteristic Configuration Descriptor
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// 扫描超时后改为按地址直连
pub const SCAN_PERIOD: Duration = Duration::from_secs(10);

/// 解析 `AA:BB:CC:DD:EE:FF` 形式的地址（不区分大小写）
pub fn parse_address(address: &str) -> Result<BDAddr, RobotError> {
    BDAddr::from_str(address.trim()).map_err(|_| RobotError::InvalidAddress(address.to_string()))
}
