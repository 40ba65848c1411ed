//! 控制器使用的蓝牙后端
//!
//! [`RobotBackend`] 负责适配器、扫描和建立连接，[`RobotChannel`] 是建立好的
//! 连接。默认实现 [`BleBackend`] 基于 btleplug。

use crate::ble::{RobotLink, RobotScanner, ScanOutcome};
use crate::error::RobotError;
use crate::protocol::{Command, Telemetry};
use btleplug::api::BDAddr;
use btleplug::platform::Peripheral;
use futures_util::stream::BoxStream;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[async_trait::async_trait]
pub trait RobotBackend: Send + Sync + 'static {
    /// 扫描或直连查找到的设备
    type Device: Send + 'static;
    type Link: RobotChannel;

    /// 选择适配器并确认已开启
    async fn prepare(&self) -> Result<(), RobotError>;

    async fn find_target(
        &self,
        target: BDAddr,
        timeout: Duration,
    ) -> Result<ScanOutcome<Self::Device>, RobotError>;

    /// 按地址直连
    async fn lookup(&self, target: BDAddr) -> Result<Option<Self::Device>, RobotError>;

    async fn establish(
        &self,
        device: Self::Device,
        prefer_response: bool,
    ) -> Result<Self::Link, RobotError>;

    /// 连接断开时产出一项
    async fn disconnections(&self, link: &Self::Link)
    -> Result<BoxStream<'static, ()>, RobotError>;
}

#[async_trait::async_trait]
pub trait RobotChannel: Clone + Send + Sync + 'static {
    fn has_telemetry(&self) -> bool;

    async fn is_connected(&self) -> bool;

    /// 写入单字节指令
    async fn send(&self, command: Command) -> Result<(), RobotError>;

    /// notify 消息流，链路断开时结束
    async fn telemetry(&self) -> Result<BoxStream<'static, Telemetry>, RobotError>;

    async fn disconnect(&self) -> Result<(), RobotError>;
}

/// btleplug 后端
///
/// 每次 [`prepare`](RobotBackend::prepare) 重新选择适配器。
#[derive(Default)]
pub struct BleBackend {
    scanner: Mutex<Option<RobotScanner>>,
}

impl BleBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn scanner(&self) -> Result<RobotScanner, RobotError> {
        self.scanner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(RobotError::NoAdapter)
    }
}

#[async_trait::async_trait]
impl RobotBackend for BleBackend {
    type Device = Peripheral;
    type Link = RobotLink;

    async fn prepare(&self) -> Result<(), RobotError> {
        let scanner = RobotScanner::new().await?;
        scanner.ensure_powered().await?;
        *self.scanner.lock().unwrap_or_else(PoisonError::into_inner) = Some(scanner);
        Ok(())
    }

    async fn find_target(
        &self,
        target: BDAddr,
        timeout: Duration,
    ) -> Result<ScanOutcome<Peripheral>, RobotError> {
        let scanner = self.scanner()?;
        scanner.find_target(target, timeout).await
    }

    async fn lookup(&self, target: BDAddr) -> Result<Option<Peripheral>, RobotError> {
        let scanner = self.scanner()?;
        scanner.lookup(target).await
    }

    async fn establish(
        &self,
        device: Peripheral,
        prefer_response: bool,
    ) -> Result<RobotLink, RobotError> {
        RobotLink::establish(device, prefer_response).await
    }

    async fn disconnections(
        &self,
        link: &RobotLink,
    ) -> Result<BoxStream<'static, ()>, RobotError> {
        let scanner = self.scanner()?;
        scanner.disconnections(link.id()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_requires_prepare() {
        let backend = BleBackend::new();
        assert!(matches!(backend.scanner(), Err(RobotError::NoAdapter)));
    }
}
