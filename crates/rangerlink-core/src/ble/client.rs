//! BLE Client - 与机器人的 GATT 连接
//!
//! 流程:
//! 1. 连接外设
//! 2. 发现服务，定位写特征与 notify 特征
//! 3. 订阅 notify 特征（btleplug 会写入 CCCD 0x2902）
//! 4. 之后每条指令写入一个字节，遥测通过 [`RobotLink::telemetry`] 读取

use crate::ble::{CCCD_UUID, NOTIFY_CHAR_UUID, RobotChannel, SERVICE_UUID, WRITE_CHAR_UUID};
use crate::error::RobotError;
use crate::protocol::{Command, Telemetry};
use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Peripheral, PeripheralId};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use log::{debug, info, warn};
use uuid::Uuid;

/// 已完成服务发现的连接
#[derive(Debug, Clone)]
pub struct RobotLink {
    peripheral: Peripheral,
    write_char: Characteristic,
    notify_char: Option<Characteristic>,
    write_type: WriteType,
}

impl RobotLink {
    /// 连接并完成服务发现与通知订阅
    ///
    /// `prefer_response` 为 true 且特征支持带应答写入时使用 `WithResponse`。
    pub async fn establish(
        peripheral: Peripheral,
        prefer_response: bool,
    ) -> Result<Self, RobotError> {
        let address = peripheral.address();

        if peripheral.is_connected().await? {
            debug!("{} already connected", address);
        } else {
            info!("Connecting to {}", address);
            peripheral.connect().await?;
        }

        info!("Connected, discovering services");
        peripheral.discover_services().await?;

        let services = peripheral.services();
        let service = services
            .iter()
            .find(|s| s.uuid == SERVICE_UUID)
            .ok_or(RobotError::ServiceNotFound(SERVICE_UUID))?;
        debug!(
            "Service {} has {} characteristic(s)",
            service.uuid,
            service.characteristics.len()
        );

        let write_char = find_characteristic(&service.characteristics, WRITE_CHAR_UUID)
            .ok_or(RobotError::CharacteristicNotFound(WRITE_CHAR_UUID))?;
        let write_type = choose_write_type(write_char.properties, prefer_response);
        debug!(
            "Write characteristic properties: {:?}, using {:?}",
            write_char.properties, write_type
        );

        let notify_char = find_characteristic(&service.characteristics, NOTIFY_CHAR_UUID);
        match &notify_char {
            Some(ch) => {
                if !has_cccd(ch) {
                    debug!("{} reports no CCCD descriptor", ch.uuid);
                }
                peripheral.subscribe(ch).await?;
                info!("Notifications enabled on {}", ch.uuid);
            }
            None => warn!(
                "Notify characteristic {} missing, telemetry disabled",
                NOTIFY_CHAR_UUID
            ),
        }

        Ok(Self {
            peripheral,
            write_char,
            notify_char,
            write_type,
        })
    }

    pub fn address(&self) -> String {
        self.peripheral.address().to_string()
    }

    pub fn id(&self) -> PeripheralId {
        self.peripheral.id()
    }
}

#[async_trait::async_trait]
impl RobotChannel for RobotLink {
    fn has_telemetry(&self) -> bool {
        self.notify_char.is_some()
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn send(&self, command: Command) -> Result<(), RobotError> {
        let payload = [command.byte()];
        debug!("BLE TX: {:?}", char::from(payload[0]));
        self.peripheral
            .write(&self.write_char, &payload, self.write_type)
            .await?;
        Ok(())
    }

    /// 没有 notify 特征时返回空流。
    async fn telemetry(&self) -> Result<BoxStream<'static, Telemetry>, RobotError> {
        if self.notify_char.is_none() {
            return Ok(futures_util::stream::empty().boxed());
        }

        let notifications = self.peripheral.notifications().await?;
        Ok(notifications
            .filter_map(|n| async move {
                if n.uuid != NOTIFY_CHAR_UUID {
                    return None;
                }
                let telemetry = Telemetry::parse(&n.value);
                debug!("BLE RX: {}", telemetry.text());
                Some(telemetry)
            })
            .boxed())
    }

    async fn disconnect(&self) -> Result<(), RobotError> {
        if let Some(ch) = &self.notify_char
            && let Err(e) = self.peripheral.unsubscribe(ch).await
        {
            debug!("Unsubscribe failed: {}", e);
        }
        self.peripheral.disconnect().await?;
        info!("Disconnected from {}", self.address());
        Ok(())
    }
}

fn find_characteristic<'a>(
    chars: impl IntoIterator<Item = &'a Characteristic>,
    uuid: Uuid,
) -> Option<Characteristic> {
    chars.into_iter().find(|c| c.uuid == uuid).cloned()
}

fn has_cccd(ch: &Characteristic) -> bool {
    ch.descriptors.iter().any(|d| d.uuid == CCCD_UUID)
}

/// 选择写入方式
pub fn choose_write_type(props: CharPropFlags, prefer_response: bool) -> WriteType {
    let with_response = props.contains(CharPropFlags::WRITE);
    let without_response = props.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE);

    match (with_response, without_response) {
        (true, true) if prefer_response => WriteType::WithResponse,
        (true, true) | (false, true) => WriteType::WithoutResponse,
        _ => WriteType::WithResponse,
    }
}
