//! 机器人控制工作流
//!
//! 高层 API 封装完整的连接流程:
//! 1. 检查适配器
//! 2. 扫描目标地址（默认 10 秒）
//! 3. 命中则停止扫描并连接；超时或扫描失败则按地址直连
//! 4. 发现服务、开启通知，之后才允许发送指令
//! 5. 连接期间监听断开事件与通知流，任一结束即视为断线
//!
//! 所有结果通过 [`RobotEvent`] 通道汇报给前端。

use crate::ble::{
    BleBackend, RobotBackend, RobotChannel, SCAN_PERIOD, ScanOutcome, TARGET_ADDRESS_BYTES,
};
use crate::config::AppSettings;
use crate::debounce::{DEFAULT_DEBOUNCE, Debouncer};
use crate::error::RobotError;
use crate::protocol::{Command, Telemetry};
use btleplug::api::BDAddr;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Scanning,
    Connecting,
    Connected,
    Disconnected,
}

impl LinkState {
    /// 正在扫描或连接
    pub fn is_busy(self) -> bool {
        matches!(self, LinkState::Scanning | LinkState::Connecting)
    }

    /// 指令按钮是否可用
    pub fn can_send(self) -> bool {
        self == LinkState::Connected
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LinkState::Idle => "Idle",
            LinkState::Scanning => "Scanning…",
            LinkState::Connecting => "Connecting…",
            LinkState::Connected => "Connected",
            LinkState::Disconnected => "Disconnected",
        };
        f.write_str(text)
    }
}

/// 控制器发往前端的事件
#[derive(Debug, Clone, PartialEq)]
pub enum RobotEvent {
    State(LinkState),
    /// 状态文本（替换）
    Status(String),
    /// 收到的 notify 消息（追加）
    Telemetry(Telemetry),
    /// 一次性提示
    Notice(String),
    CommandSent(Command),
}

/// 连接参数
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub target: BDAddr,
    pub scan_timeout: Duration,
    pub debounce: Duration,
    pub write_with_response: bool,
}

impl ControllerOptions {
    pub fn from_settings(settings: &AppSettings) -> Result<Self, RobotError> {
        Ok(Self {
            target: settings.target()?,
            scan_timeout: settings.scan_timeout(),
            debounce: settings.debounce(),
            write_with_response: settings.write_with_response,
        })
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            target: BDAddr::from(TARGET_ADDRESS_BYTES),
            scan_timeout: SCAN_PERIOD,
            debounce: DEFAULT_DEBOUNCE,
            write_with_response: true,
        }
    }
}

/// 机器人控制器
pub struct RobotController<B: RobotBackend = BleBackend> {
    backend: B,
    options: ControllerOptions,
    events: mpsc::Sender<RobotEvent>,
    debouncer: Debouncer,
    link: AsyncMutex<Option<B::Link>>,
    state: Mutex<LinkState>,
    /// 每次建立或断开连接递增，旧的监听任务据此判断自己是否过期
    session: AtomicU64,
}

impl RobotController {
    pub fn new(options: ControllerOptions, events: mpsc::Sender<RobotEvent>) -> Arc<Self> {
        Self::with_backend(BleBackend::new(), options, events)
    }
}

impl<B: RobotBackend> RobotController<B> {
    pub fn with_backend(
        backend: B,
        options: ControllerOptions,
        events: mpsc::Sender<RobotEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            debouncer: Debouncer::new(options.debounce),
            options,
            events,
            link: AsyncMutex::new(None),
            state: Mutex::new(LinkState::Idle),
            session: AtomicU64::new(0),
        })
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 扫描并连接
    ///
    /// 扫描或连接进行中、或已连接时直接返回。
    /// 失败时除了返回错误，还会发出一条 [`RobotEvent::Notice`]。
    pub async fn connect(self: &Arc<Self>) -> Result<(), RobotError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_busy() || state.can_send() {
                debug!("Connect ignored, state = {:?}", *state);
                return Ok(());
            }
            *state = LinkState::Scanning;
        }

        match self.run_connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Connect failed: {}", e);
                self.set_state(LinkState::Idle).await;
                self.emit(RobotEvent::Status("Connection failed".to_string())).await;
                self.emit(RobotEvent::Notice(e.notice())).await;
                Err(e)
            }
        }
    }

    async fn run_connect(self: &Arc<Self>) -> Result<(), RobotError> {
        self.backend.prepare().await?;

        let target = self.options.target;
        self.emit(RobotEvent::State(LinkState::Scanning)).await;
        self.emit(RobotEvent::Status("Scanning…".to_string())).await;

        let device = match self.backend.find_target(target, self.options.scan_timeout).await {
            Ok(ScanOutcome::Found(device)) => {
                self.emit(RobotEvent::Status("Connecting…".to_string())).await;
                device
            }
            Ok(ScanOutcome::TimedOut) => {
                self.emit(RobotEvent::Status("Scan timed out, connecting".to_string())).await;
                self.direct_device(target).await?
            }
            Err(RobotError::ScanFailed(reason)) => {
                error!("Scan failed: {}", reason);
                self.direct_device(target).await?
            }
            Err(e) => return Err(e),
        };

        self.set_state(LinkState::Connecting).await;
        let link = self
            .backend
            .establish(device, self.options.write_with_response)
            .await?;

        let (telemetry, disconnections) = match self.link_streams(&link).await {
            Ok(streams) => streams,
            Err(e) => {
                if let Err(close) = link.disconnect().await {
                    debug!("Cleanup disconnect failed: {}", close);
                }
                return Err(e);
            }
        };

        let session = {
            let mut guard = self.link.lock().await;
            *guard = Some(link);
            self.session.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.set_state(LinkState::Connected).await;
        self.emit(RobotEvent::Status("Connected".to_string())).await;
        info!("Robot {} ready", target);

        let this = Arc::clone(self);
        tokio::spawn(async move { this.watch_link(session, telemetry, disconnections).await });
        Ok(())
    }

    async fn direct_device(&self, target: BDAddr) -> Result<B::Device, RobotError> {
        info!("Connecting directly to {}", target);
        self.backend
            .lookup(target)
            .await?
            .ok_or_else(|| RobotError::DeviceNotFound(target.to_string()))
    }

    async fn link_streams(
        &self,
        link: &B::Link,
    ) -> Result<(BoxStream<'static, Telemetry>, BoxStream<'static, ()>), RobotError> {
        // 没有 notify 特征时只靠断开事件判断断线
        let telemetry = if link.has_telemetry() {
            link.telemetry().await?
        } else {
            stream::pending::<Telemetry>().boxed()
        };
        let disconnections = self.backend.disconnections(link).await?;
        Ok((telemetry, disconnections))
    }

    /// 发送一条指令
    ///
    /// 返回 `Ok(false)` 表示被防抖丢弃或尚未连接。防抖窗口在检查连接之前
    /// 就已生效。写入失败且链路已断开时按断线处理。
    pub async fn send(&self, command: Command) -> Result<bool, RobotError> {
        if !self.debouncer.try_acquire() {
            debug!("{} dropped by debounce", command);
            return Ok(false);
        }

        let (link, session) = {
            let guard = self.link.lock().await;
            let Some(link) = guard.as_ref() else {
                debug!("{} ignored, not connected", command);
                return Ok(false);
            };
            (link.clone(), self.session.load(Ordering::SeqCst))
        };

        if let Err(e) = link.send(command).await {
            error!("Failed to send {}: {}", command, e);
            if !link.is_connected().await {
                self.link_lost(session).await;
            }
            return Err(e);
        }

        info!("Sent {}", command);
        self.emit(RobotEvent::CommandSent(command)).await;
        self.emit(RobotEvent::Status(command.label().to_string())).await;
        Ok(true)
    }

    /// 主动断开
    pub async fn disconnect(&self) -> Result<(), RobotError> {
        let link = {
            let mut guard = self.link.lock().await;
            self.session.fetch_add(1, Ordering::SeqCst);
            guard.take()
        };

        let Some(link) = link else {
            debug!("Disconnect ignored, no active link");
            return Ok(());
        };

        let result = link.disconnect().await;
        self.set_state(LinkState::Disconnected).await;
        self.emit(RobotEvent::Status("Disconnected".to_string())).await;
        result
    }

    async fn watch_link(
        self: Arc<Self>,
        session: u64,
        mut telemetry: BoxStream<'static, Telemetry>,
        mut disconnections: BoxStream<'static, ()>,
    ) {
        let reason = loop {
            tokio::select! {
                item = telemetry.next() => match item {
                    Some(message) => self.emit(RobotEvent::Telemetry(message)).await,
                    None => break "telemetry stream ended",
                },
                _ = disconnections.next() => break "peripheral disconnected",
            }
        };

        if self.session.load(Ordering::SeqCst) != session {
            debug!("Watcher of stale session {} stopped ({})", session, reason);
            return;
        }

        warn!("Link lost: {}", reason);
        self.link_lost(session).await;
    }

    /// 断线处理，`session` 已过期时什么都不做
    async fn link_lost(&self, session: u64) {
        let link = {
            let mut guard = self.link.lock().await;
            if self
                .session
                .compare_exchange(session, session + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                debug!("Link loss of stale session {} ignored", session);
                return;
            }
            guard.take()
        };

        self.set_state(LinkState::Disconnected).await;
        self.emit(RobotEvent::Status("Disconnected".to_string())).await;
        self.emit(RobotEvent::Notice(RobotError::LinkLost.notice())).await;

        if let Some(link) = link
            && let Err(e) = link.disconnect().await
        {
            debug!("Disconnect after link loss failed: {}", e);
        }
    }

    async fn set_state(&self, state: LinkState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        self.emit(RobotEvent::State(state)).await;
    }

    async fn emit(&self, event: RobotEvent) {
        // 前端已退出时忽略
        let _ = self.events.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::Notify;

    #[test]
    fn test_link_state_flags() {
        assert!(LinkState::Scanning.is_busy());
        assert!(LinkState::Connecting.is_busy());
        assert!(!LinkState::Connected.is_busy());
        assert!(LinkState::Connected.can_send());
        assert!(!LinkState::Disconnected.can_send());
        assert_eq!(LinkState::Scanning.to_string(), "Scanning…");
    }

    #[test]
    fn test_options_from_settings() {
        let settings = AppSettings {
            target_address: "aa:bb:cc:dd:ee:ff".to_string(),
            scan_timeout_secs: 4,
            debounce_ms: 250,
            ..Default::default()
        };
        let options = ControllerOptions::from_settings(&settings).unwrap();
        assert_eq!(options.target.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(options.scan_timeout, Duration::from_secs(4));
        assert_eq!(options.debounce, Duration::from_millis(250));
    }

    #[test]
    fn test_default_options() {
        let options = ControllerOptions::default();
        assert_eq!(options.target.to_string(), crate::ble::TARGET_ADDRESS);
        assert_eq!(options.scan_timeout, SCAN_PERIOD);
    }

    #[tokio::test]
    async fn test_send_without_link_is_ignored() {
        let (tx, mut rx) = mpsc::channel(8);
        let controller = RobotController::new(ControllerOptions::default(), tx);

        assert!(!controller.send(Command::Stop).await.unwrap());
        assert_eq!(controller.state(), LinkState::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_without_link_is_noop() {
        let (tx, mut rx) = mpsc::channel(8);
        let controller = RobotController::new(ControllerOptions::default(), tx);

        controller.disconnect().await.unwrap();
        assert_eq!(controller.state(), LinkState::Idle);
        assert!(rx.try_recv().is_err());
    }
    // ---- 脚本化后端 ----

    type Calls = Arc<Mutex<Vec<String>>>;

    fn record(calls: &Calls, call: impl Into<String>) {
        calls.lock().unwrap().push(call.into());
    }

    fn receiver_stream<T: Send + 'static>(rx: Option<mpsc::Receiver<T>>) -> BoxStream<'static, T> {
        match rx {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed(),
            None => stream::pending().boxed(),
        }
    }

    fn statuses(events: &[RobotEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                RobotEvent::Status(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[derive(Clone, Copy)]
    enum Scan {
        Found,
        TimedOut,
        Fails,
        /// 等待 gate 放行后命中
        Stalls,
    }

    #[derive(Clone)]
    struct FakeLink {
        calls: Calls,
        connected: Arc<AtomicBool>,
        write_fails: Arc<AtomicBool>,
        write_stalls: Arc<AtomicBool>,
        release: Arc<Notify>,
        telemetry_rx: Arc<Mutex<Option<mpsc::Receiver<Telemetry>>>>,
    }

    #[async_trait::async_trait]
    impl RobotChannel for FakeLink {
        fn has_telemetry(&self) -> bool {
            true
        }

        async fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn send(&self, command: Command) -> Result<(), RobotError> {
            record(&self.calls, format!("send:{}", char::from(command.byte())));
            if self.write_stalls.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            if self.write_fails.load(Ordering::SeqCst) {
                return Err(RobotError::NotConnected);
            }
            Ok(())
        }

        async fn telemetry(&self) -> Result<BoxStream<'static, Telemetry>, RobotError> {
            let rx = self.telemetry_rx.lock().unwrap().take();
            Ok(receiver_stream(rx))
        }

        async fn disconnect(&self) -> Result<(), RobotError> {
            record(&self.calls, "disconnect");
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeBackend {
        scan: Scan,
        cached: bool,
        gate: Arc<Notify>,
        calls: Calls,
        link: FakeLink,
        drop_rx: Mutex<Option<mpsc::Receiver<()>>>,
    }

    #[async_trait::async_trait]
    impl RobotBackend for FakeBackend {
        type Device = &'static str;
        type Link = FakeLink;

        async fn prepare(&self) -> Result<(), RobotError> {
            record(&self.calls, "prepare");
            Ok(())
        }

        async fn find_target(
            &self,
            _target: BDAddr,
            _timeout: Duration,
        ) -> Result<ScanOutcome<&'static str>, RobotError> {
            record(&self.calls, "find_target");
            match self.scan {
                Scan::Found => Ok(ScanOutcome::Found("scan")),
                Scan::TimedOut => Ok(ScanOutcome::TimedOut),
                Scan::Fails => Err(RobotError::ScanFailed("scanner busy".into())),
                Scan::Stalls => {
                    self.gate.notified().await;
                    Ok(ScanOutcome::Found("scan"))
                }
            }
        }

        async fn lookup(&self, _target: BDAddr) -> Result<Option<&'static str>, RobotError> {
            record(&self.calls, "lookup");
            Ok(self.cached.then_some("cache"))
        }

        async fn establish(
            &self,
            device: &'static str,
            _prefer_response: bool,
        ) -> Result<FakeLink, RobotError> {
            record(&self.calls, format!("establish:{device}"));
            self.link.connected.store(true, Ordering::SeqCst);
            Ok(self.link.clone())
        }

        async fn disconnections(
            &self,
            _link: &FakeLink,
        ) -> Result<BoxStream<'static, ()>, RobotError> {
            let rx = self.drop_rx.lock().unwrap().take();
            Ok(receiver_stream(rx))
        }
    }

    struct Rig {
        controller: Arc<RobotController<FakeBackend>>,
        events: mpsc::Receiver<RobotEvent>,
        calls: Calls,
        link: FakeLink,
        gate: Arc<Notify>,
        telemetry_tx: mpsc::Sender<Telemetry>,
        drop_tx: mpsc::Sender<()>,
    }

    impl Rig {
        fn new(scan: Scan, cached: bool) -> Self {
            let calls: Calls = Arc::default();
            let (telemetry_tx, telemetry_rx) = mpsc::channel(8);
            let (drop_tx, drop_rx) = mpsc::channel(1);
            let link = FakeLink {
                calls: Arc::clone(&calls),
                connected: Arc::default(),
                write_fails: Arc::default(),
                write_stalls: Arc::default(),
                release: Arc::default(),
                telemetry_rx: Arc::new(Mutex::new(Some(telemetry_rx))),
            };
            let gate = Arc::new(Notify::new());
            let backend = FakeBackend {
                scan,
                cached,
                gate: Arc::clone(&gate),
                calls: Arc::clone(&calls),
                link: link.clone(),
                drop_rx: Mutex::new(Some(drop_rx)),
            };
            let options = ControllerOptions {
                debounce: Duration::ZERO,
                ..Default::default()
            };
            let (tx, events) = mpsc::channel(64);

            Self {
                controller: RobotController::with_backend(backend, options, tx),
                events,
                calls,
                link,
                gate,
                telemetry_tx,
                drop_tx,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn drain(&mut self) -> Vec<RobotEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }

        async fn wait_for(&mut self, expected: RobotEvent) {
            let events = &mut self.events;
            tokio::time::timeout(Duration::from_secs(1), async {
                while let Some(event) = events.recv().await {
                    if event == expected {
                        return;
                    }
                }
                panic!("event channel closed");
            })
            .await
            .expect("event not received in time");
        }
    }

    #[tokio::test]
    async fn test_connect_after_scan_match() {
        let mut rig = Rig::new(Scan::Found, false);
        rig.controller.connect().await.unwrap();

        assert_eq!(rig.controller.state(), LinkState::Connected);
        assert_eq!(
            statuses(&rig.drain()),
            vec!["Scanning…", "Connecting…", "Connected"]
        );
        assert_eq!(rig.calls(), vec!["prepare", "find_target", "establish:scan"]);
    }

    #[tokio::test]
    async fn test_connect_directly_after_scan_timeout() {
        let mut rig = Rig::new(Scan::TimedOut, true);
        rig.controller.connect().await.unwrap();

        assert_eq!(rig.controller.state(), LinkState::Connected);
        assert_eq!(
            statuses(&rig.drain()),
            vec!["Scanning…", "Scan timed out, connecting", "Connected"]
        );
        assert_eq!(
            rig.calls(),
            vec!["prepare", "find_target", "lookup", "establish:cache"]
        );
    }

    #[tokio::test]
    async fn test_connect_directly_after_scan_failure() {
        let mut rig = Rig::new(Scan::Fails, true);
        rig.controller.connect().await.unwrap();

        let events = rig.drain();
        assert_eq!(rig.controller.state(), LinkState::Connected);
        assert_eq!(statuses(&events), vec!["Scanning…", "Connected"]);
        assert!(!events.iter().any(|e| matches!(e, RobotEvent::Notice(_))));
        assert!(rig.calls().contains(&"establish:cache".to_string()));
    }

    #[tokio::test]
    async fn test_connect_failure_reports_notice_and_resets() {
        let mut rig = Rig::new(Scan::TimedOut, false);
        let result = rig.controller.connect().await;

        assert!(matches!(result, Err(RobotError::DeviceNotFound(_))));
        assert_eq!(rig.controller.state(), LinkState::Idle);

        let events = rig.drain();
        assert!(events.contains(&RobotEvent::State(LinkState::Idle)));
        assert!(events.contains(&RobotEvent::Status("Connection failed".into())));
        assert!(events.contains(&RobotEvent::Notice(
            "Robot 00:1B:10:69:20:1E not found".into()
        )));

        // 失败后可以重试
        assert!(rig.controller.connect().await.is_err());
        assert_eq!(
            rig.calls().iter().filter(|c| *c == "find_target").count(),
            2
        );
    }

    #[tokio::test]
    async fn test_second_connect_ignored_while_scanning() {
        let rig = Rig::new(Scan::Stalls, false);
        let controller = Arc::clone(&rig.controller);
        let gate = Arc::clone(&rig.gate);

        let (first, second) = tokio::join!(controller.connect(), async {
            let result = controller.connect().await;
            gate.notify_one();
            result
        });
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(controller.state(), LinkState::Connected);

        // 已连接时同样忽略
        controller.connect().await.unwrap();
        assert_eq!(
            rig.calls().iter().filter(|c| *c == "find_target").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_send_writes_through_link() {
        let mut rig = Rig::new(Scan::Found, false);
        rig.controller.connect().await.unwrap();
        rig.drain();

        assert!(rig.controller.send(Command::Stop).await.unwrap());
        assert!(rig.calls().contains(&"send:S".to_string()));

        let events = rig.drain();
        assert!(events.contains(&RobotEvent::CommandSent(Command::Stop)));
        assert!(events.contains(&RobotEvent::Status(Command::Stop.label().to_string())));
    }

    #[tokio::test]
    async fn test_telemetry_forwarded() {
        let mut rig = Rig::new(Scan::Found, false);
        rig.controller.connect().await.unwrap();

        rig.telemetry_tx
            .send(Telemetry::parse(b"DIST:12"))
            .await
            .unwrap();
        rig.wait_for(RobotEvent::Telemetry(Telemetry::parse(b"DIST:12")))
            .await;
        assert_eq!(rig.controller.state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn test_peripheral_drop_marks_link_lost() {
        let mut rig = Rig::new(Scan::Found, false);
        rig.controller.connect().await.unwrap();

        rig.drop_tx.send(()).await.unwrap();
        rig.wait_for(RobotEvent::State(LinkState::Disconnected)).await;
        rig.wait_for(RobotEvent::Notice("Connection lost".into()))
            .await;

        assert_eq!(rig.controller.state(), LinkState::Disconnected);
        assert!(!rig.controller.send(Command::Stop).await.unwrap());

        // 断线后可以重新连接
        rig.controller.connect().await.unwrap();
        assert_eq!(rig.controller.state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn test_failed_write_on_dropped_link() {
        let mut rig = Rig::new(Scan::Found, false);
        rig.controller.connect().await.unwrap();
        rig.drain();

        rig.link.write_fails.store(true, Ordering::SeqCst);
        rig.link.connected.store(false, Ordering::SeqCst);
        assert!(rig.controller.send(Command::LineFollow).await.is_err());

        assert_eq!(rig.controller.state(), LinkState::Disconnected);
        let events = rig.drain();
        assert!(events.contains(&RobotEvent::Notice("Connection lost".into())));
        assert!(rig.calls().contains(&"disconnect".to_string()));
    }

    #[tokio::test]
    async fn test_failed_write_on_live_link_keeps_connection() {
        let mut rig = Rig::new(Scan::Found, false);
        rig.controller.connect().await.unwrap();
        rig.drain();

        rig.link.write_fails.store(true, Ordering::SeqCst);
        assert!(rig.controller.send(Command::LineFollow).await.is_err());

        assert_eq!(rig.controller.state(), LinkState::Connected);
        assert!(!rig.drain().iter().any(|e| matches!(e, RobotEvent::Notice(_))));
    }

    #[tokio::test]
    async fn test_stalled_write_does_not_block_disconnect() {
        let rig = Rig::new(Scan::Found, false);
        rig.controller.connect().await.unwrap();
        rig.link.write_stalls.store(true, Ordering::SeqCst);

        let controller = Arc::clone(&rig.controller);
        let pending = tokio::spawn(async move { controller.send(Command::HandFollow).await });
        while !rig.calls().contains(&"send:H".to_string()) {
            tokio::task::yield_now().await;
        }

        tokio::time::timeout(Duration::from_secs(1), rig.controller.disconnect())
            .await
            .expect("disconnect waited for the pending write")
            .unwrap();
        assert_eq!(rig.controller.state(), LinkState::Disconnected);

        rig.link.release.notify_one();
        assert!(pending.await.unwrap().unwrap());
    }
}
