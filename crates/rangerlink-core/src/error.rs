//! 错误类型
//!
//! 所有 BLE 操作共用一个错误枚举。每个变体都带有一条简短的
//! 面向用户的提示（[`RobotError::notice`]），UI 直接弹出即可。

use uuid::Uuid;

/// 机器人连接/通信错误
#[derive(Debug, thiserror::Error)]
pub enum RobotError {
    #[error("No Bluetooth adapters found")]
    NoAdapter,

    #[error("Bluetooth adapter is powered off")]
    AdapterDisabled,

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(Uuid),

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection to robot lost")]
    LinkLost,

    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),
}

impl RobotError {
    /// 一次性提示文本
    pub fn notice(&self) -> String {
        match self {
            RobotError::NoAdapter => "Bluetooth unsupported".to_string(),
            RobotError::AdapterDisabled => "Enable Bluetooth".to_string(),
            RobotError::ScanFailed(_) => "BLE Scanner unavailable".to_string(),
            RobotError::DeviceNotFound(addr) => format!("Robot {addr} not found"),
            RobotError::ServiceNotFound(_) | RobotError::CharacteristicNotFound(_) => {
                "Robot service unavailable".to_string()
            }
            RobotError::NotConnected => "Not connected".to_string(),
            RobotError::LinkLost => "Connection lost".to_string(),
            other => other.to_string(),
        }
    }
}
