//! Rangerlink Core Library
//!
//! mBot Ranger 机器人 BLE 遥控的核心实现库
//!
//! # 模块
//!
//! - **protocol**: 单字节指令与 `DIST:` 遥测解析
//! - **ble**: 扫描、按地址直连、GATT 写入与通知
//! - **workflow**: 连接流程与事件通道
//! - **debounce**: 按键防抖
//! - **config**: 设置持久化
//!
//! # 使用示例
//!
//! ```ignore
//! use rangerlink_core::{Command, ControllerOptions, RobotController, RobotEvent};
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::channel(64);
//! let controller = RobotController::new(ControllerOptions::default(), tx);
//!
//! // 扫描 10 秒，超时后按地址直连
//! controller.connect().await?;
//! controller.send(Command::QueryDistance).await?;
//!
//! while let Some(event) = rx.recv().await {
//!     if let RobotEvent::Telemetry(t) = event {
//!         println!("{}", t.text());
//!     }
//! }
//! ```

pub mod ble;
pub mod config;
pub mod debounce;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod workflow;

// BLE re-exports
pub use ble::{
    BleBackend, CCCD_UUID, DiscoveredDevice, NOTIFY_CHAR_UUID, RobotBackend, RobotChannel,
    RobotLink, RobotScanner, SCAN_PERIOD, SERVICE_UUID, ScanCallback, ScanOutcome,
    TARGET_ADDRESS, WRITE_CHAR_UUID, parse_address,
};

pub use config::AppSettings;
pub use debounce::Debouncer;
pub use error::RobotError;
pub use protocol::{Command, Telemetry};
pub use workflow::{ControllerOptions, LinkState, RobotController, RobotEvent};
