//! BLE Scanner - 查找机器人
//!
//! 基于 btleplug 的 central 事件流。
//!
//! # 两种用法
//!
//! - [`RobotScanner::find_target`]：只关心目标地址，命中后立即停止扫描；
//!   超时返回 [`ScanOutcome::TimedOut`]，由调用方决定是否直连。
//! - [`RobotScanner::discover`]：列出附近所有设备，供 CLI 的 `scan` 使用。

use log::{debug, info, warn};

use crate::error::RobotError;
use btleplug::api::{
    BDAddr, Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, serde::Serialize)]
pub struct DiscoveredDevice {
    pub name: Option<String>,
    pub address: String,
    pub rssi: Option<i16>,
    /// 是否广播了机器人的串口服务
    pub has_robot_service: bool,
}

impl DiscoveredDevice {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unknown>")
    }
}

/// 扫描回调接口，用于实时汇报发现的设备
#[async_trait::async_trait]
pub trait ScanCallback: Send + Sync {
    async fn on_device_found(&self, device: DiscoveredDevice);
}

/// [`RobotScanner::find_target`] 的结果
#[derive(Debug)]
pub enum ScanOutcome<D = Peripheral> {
    Found(D),
    TimedOut,
}

#[derive(Clone)]
pub struct RobotScanner {
    adapter: Adapter,
}

impl RobotScanner {
    /// 使用第一个可用的适配器
    pub async fn new() -> Result<Self, RobotError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters.into_iter().next().ok_or(RobotError::NoAdapter)?;

        match adapter.adapter_info().await {
            Ok(info) => debug!("Using adapter: {}", info),
            Err(e) => debug!("Adapter info unavailable: {}", e),
        }

        Ok(Self { adapter })
    }

    /// 检查适配器是否已开启
    ///
    /// 部分平台无法报告电源状态（`Unknown`），此时继续执行。
    pub async fn ensure_powered(&self) -> Result<(), RobotError> {
        match self.adapter.adapter_state().await {
            Ok(CentralState::PoweredOff) => Err(RobotError::AdapterDisabled),
            Ok(CentralState::PoweredOn) => Ok(()),
            Ok(CentralState::Unknown) => {
                debug!("Adapter state unknown, continuing");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to query adapter state: {}", e);
                Ok(())
            }
        }
    }

    /// 扫描目标地址，最长 `timeout`
    ///
    /// 命中或超时都会停止扫描。
    pub async fn find_target(
        &self,
        target: BDAddr,
        timeout: Duration,
    ) -> Result<ScanOutcome, RobotError> {
        // 先订阅事件再开始扫描，避免漏掉第一批广播
        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| RobotError::ScanFailed(e.to_string()))?;

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| RobotError::ScanFailed(e.to_string()))?;

        info!("Scanning for {} ({}s)", target, timeout.as_secs());

        // 也检查扫描开始前已缓存的设备
        if let Some(peripheral) = cached_match(self.lookup(target).await) {
            debug!("Target {} already known to adapter", target);
            self.stop_scan().await;
            return Ok(ScanOutcome::Found(peripheral));
        }

        let timeout_fut = tokio::time::sleep(timeout);
        tokio::pin!(timeout_fut);

        let outcome = loop {
            tokio::select! {
                () = &mut timeout_fut => {
                    info!("Scan timed out after {}s", timeout.as_secs());
                    break ScanOutcome::TimedOut;
                }
                event = events.next() => {
                    match event {
                        Some(CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id)) => {
                            if let Some(peripheral) = self.match_target(&id, target).await {
                                info!("Found target {}", target);
                                break ScanOutcome::Found(peripheral);
                            }
                        }
                        Some(CentralEvent::StateUpdate(CentralState::PoweredOff)) => {
                            self.stop_scan().await;
                            return Err(RobotError::AdapterDisabled);
                        }
                        Some(_) => {}
                        None => {
                            self.stop_scan().await;
                            return Err(RobotError::ScanFailed("event stream closed".to_string()));
                        }
                    }
                }
            }
        };

        self.stop_scan().await;
        Ok(outcome)
    }

    /// 在适配器缓存中按地址查找设备（直连路径）
    pub async fn lookup(&self, target: BDAddr) -> Result<Option<Peripheral>, RobotError> {
        for peripheral in self.adapter.peripherals().await? {
            if peripheral.address() == target {
                return Ok(Some(peripheral));
            }
            if let Some(props) = peripheral.properties().await?
                && props.address == target
            {
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    /// 列出附近所有设备
    pub async fn discover(
        &self,
        timeout: Duration,
        callback: Option<Arc<dyn ScanCallback>>,
    ) -> Result<Vec<DiscoveredDevice>, RobotError> {
        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| RobotError::ScanFailed(e.to_string()))?;
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| RobotError::ScanFailed(e.to_string()))?;

        info!("Starting BLE scan for {} seconds", timeout.as_secs());

        let mut discovered_map: HashMap<PeripheralId, DiscoveredDevice> = HashMap::new();
        let timeout_fut = tokio::time::sleep(timeout);
        tokio::pin!(timeout_fut);

        loop {
            tokio::select! {
                () = &mut timeout_fut => break,
                event = events.next() => {
                    match event {
                        Some(CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id)) => {
                            let Ok(Some(dev)) = self.describe(&id).await else {
                                continue;
                            };
                            if record_device(&mut discovered_map, id, dev.clone()) {
                                debug!("Device found: addr={}, name='{}'", dev.address, dev.display_name());

                                // 实时汇报
                                if let Some(ref cb) = callback {
                                    cb.on_device_found(dev).await;
                                }
                            }
                        }
                        None => break,
                        Some(_) => {}
                    }
                }
            }
        }

        self.stop_scan().await;

        let mut devices: Vec<DiscoveredDevice> = discovered_map.into_values().collect();
        // 信号强的排前面，未知 RSSI 排最后
        devices.sort_by_key(|d| std::cmp::Reverse(d.rssi.unwrap_or(i16::MIN)));

        info!("Scan complete: found {} device(s)", devices.len());
        Ok(devices)
    }

    /// 监听指定设备的断开事件
    pub async fn disconnections(
        &self,
        id: PeripheralId,
    ) -> Result<BoxStream<'static, ()>, RobotError> {
        let events = self.adapter.events().await?;
        Ok(events
            .filter_map(move |event| {
                let matched = matches!(
                    &event,
                    CentralEvent::DeviceDisconnected(dropped) if *dropped == id
                );
                async move { matched.then_some(()) }
            })
            .boxed())
    }

    async fn match_target(&self, id: &PeripheralId, target: BDAddr) -> Option<Peripheral> {
        let peripheral = self.adapter.peripheral(id).await.ok()?;
        if peripheral.address() == target {
            return Some(peripheral);
        }
        let props = peripheral.properties().await.ok()??;
        (props.address == target).then_some(peripheral)
    }

    async fn describe(&self, id: &PeripheralId) -> Result<Option<DiscoveredDevice>, RobotError> {
        let peripheral = self.adapter.peripheral(id).await?;
        let Some(props) = peripheral.properties().await? else {
            return Ok(None);
        };

        Ok(Some(DiscoveredDevice {
            name: props.local_name,
            address: props.address.to_string(),
            rssi: props.rssi,
            has_robot_service: props.services.contains(&super::SERVICE_UUID),
        }))
    }

    async fn stop_scan(&self) {
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
    }
}

/// 缓存查找失败不影响扫描
fn cached_match<P>(result: Result<Option<P>, RobotError>) -> Option<P> {
    match result {
        Ok(found) => found,
        Err(e) => {
            warn!("Cached device lookup failed: {}", e);
            None
        }
    }
}

/// 记录设备，首次出现时返回 true
///
/// 后续更新刷新 RSSI 等字段，缺失的名称沿用之前的值。
fn record_device<K: Hash + Eq>(
    map: &mut HashMap<K, DiscoveredDevice>,
    key: K,
    mut device: DiscoveredDevice,
) -> bool {
    match map.get_mut(&key) {
        Some(existing) => {
            if device.name.is_none() {
                device.name = existing.name.take();
            }
            if device.rssi.is_none() {
                device.rssi = existing.rssi;
            }
            device.has_robot_service |= existing.has_robot_service;
            *existing = device;
            false
        }
        None => {
            map.insert(key, device);
            true
        }
    }
}
