//! Application state

use std::sync::Arc;

use rangerlink_core::logging::{LogEntry, LogLevel};
use rangerlink_core::{
    AppSettings, Command, ControllerOptions, LinkState, RobotController, RobotEvent,
};
use tokio::sync::mpsc;

/// 状态面板最多保留的行数
const MAX_STATUS_LINES: usize = 200;
/// 日志面板最多保留的条数
const MAX_LOG_ENTRIES: usize = 500;

/// 发往 UI 线程的事件
#[derive(Debug)]
pub enum AppEvent {
    LogMessage { level: LogLevel, message: String },
}

pub struct App {
    pub link_state: LinkState,
    /// 最近一次状态文本 + 之后收到的消息
    pub status_lines: Vec<String>,
    pub distance: Option<String>,
    pub last_command: Option<Command>,
    pub logs: Vec<LogEntry>,
    pub log_filter: LogLevel,
    /// 一次性提示弹窗
    pub notice: Option<String>,
    pub target: String,
    pub event_tx: mpsc::Sender<AppEvent>,
    event_rx: mpsc::Receiver<AppEvent>,
    robot_rx: mpsc::Receiver<RobotEvent>,
    controller: Arc<RobotController>,
}

impl App {
    pub fn new(options: ControllerOptions) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (robot_tx, robot_rx) = mpsc::channel(256);
        let controller = RobotController::new(options, robot_tx);
        let target = controller.options().target.to_string();

        Self {
            link_state: LinkState::Idle,
            status_lines: vec!["Press 'c' to connect".to_string()],
            distance: None,
            last_command: None,
            logs: vec![LogEntry::new(LogLevel::Info, "Rangerlink TUI 启动")],
            log_filter: LogLevel::Info,
            notice: None,
            target,
            event_tx,
            event_rx,
            robot_rx,
            controller,
        }
    }

    pub fn from_settings(settings: &AppSettings) -> anyhow::Result<Self> {
        Ok(Self::new(ControllerOptions::from_settings(settings)?))
    }

    /// 按钮是否可用（服务发现完成之后）
    pub fn commands_enabled(&self) -> bool {
        self.link_state.can_send()
    }

    pub fn connect(&mut self) {
        if self.link_state.is_busy() {
            return;
        }
        let controller = Arc::clone(&self.controller);
        tokio::spawn(async move {
            // 失败会以 Notice 事件返回
            let _ = controller.connect().await;
        });
    }

    pub fn disconnect(&mut self) {
        let controller = Arc::clone(&self.controller);
        tokio::spawn(async move {
            if let Err(e) = controller.disconnect().await {
                tracing::warn!("Disconnect failed: {}", e);
            }
        });
    }

    pub fn send_command(&mut self, command: Command) {
        if !self.commands_enabled() {
            return;
        }
        let controller = Arc::clone(&self.controller);
        tokio::spawn(async move {
            if let Err(e) = controller.send(command).await {
                tracing::error!("Failed to send {}: {}", command, e);
            }
        });
    }

    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry::new(level, message));
        if self.logs.len() > MAX_LOG_ENTRIES {
            let overflow = self.logs.len() - MAX_LOG_ENTRIES;
            self.logs.drain(..overflow);
        }
    }

    pub fn visible_logs(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.logs
            .iter()
            .filter(|entry| entry.level.passes(self.log_filter))
    }

    pub fn toggle_log_level(&mut self) {
        self.log_filter = self.log_filter.cycle();
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn apply_robot_event(&mut self, event: RobotEvent) {
        match event {
            RobotEvent::State(state) => self.link_state = state,
            RobotEvent::Status(text) => {
                self.status_lines.clear();
                self.status_lines.push(text);
            }
            RobotEvent::Telemetry(telemetry) => {
                if let Some(distance) = telemetry.distance_display() {
                    self.distance = Some(distance);
                }
                self.status_lines.push(telemetry.text());
                if self.status_lines.len() > MAX_STATUS_LINES {
                    let overflow = self.status_lines.len() - MAX_STATUS_LINES;
                    self.status_lines.drain(..overflow);
                }
            }
            RobotEvent::Notice(text) => {
                self.add_log(LogLevel::Warn, text.clone());
                self.notice = Some(text);
            }
            RobotEvent::CommandSent(command) => self.last_command = Some(command),
        }
    }

    /// 处理所有排队的异步事件
    pub fn tick(&mut self) {
        while let Ok(event) = self.robot_rx.try_recv() {
            self.apply_robot_event(event);
        }
        while let Ok(event) = self.event_rx.try_recv() {
            let AppEvent::LogMessage { level, message } = event;
            self.add_log(level, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangerlink_core::Telemetry;

    fn app() -> App {
        App::new(ControllerOptions::default())
    }

    #[test]
    fn test_commands_disabled_until_connected() {
        let mut app = app();
        assert!(!app.commands_enabled());

        app.apply_robot_event(RobotEvent::State(LinkState::Scanning));
        assert!(!app.commands_enabled());

        app.apply_robot_event(RobotEvent::State(LinkState::Connected));
        assert!(app.commands_enabled());

        app.apply_robot_event(RobotEvent::State(LinkState::Disconnected));
        assert!(!app.commands_enabled());
    }

    #[test]
    fn test_status_replaced_and_telemetry_appended() {
        let mut app = app();
        app.apply_robot_event(RobotEvent::Status("Connected".into()));
        app.apply_robot_event(RobotEvent::Telemetry(Telemetry::parse(b"hello")));
        app.apply_robot_event(RobotEvent::Telemetry(Telemetry::parse(b"DIST:33.3")));
        assert_eq!(app.status_lines, vec!["Connected", "hello", "DIST:33.3"]);
        assert_eq!(app.distance.as_deref(), Some("Distance: 33.3 cm"));

        app.apply_robot_event(RobotEvent::Status("Stopped".into()));
        assert_eq!(app.status_lines, vec!["Stopped"]);
        // 距离面板保持最后一次读数
        assert_eq!(app.distance.as_deref(), Some("Distance: 33.3 cm"));
    }

    #[test]
    fn test_notice_popup() {
        let mut app = app();
        app.apply_robot_event(RobotEvent::Notice("Bluetooth unsupported".into()));
        assert_eq!(app.notice.as_deref(), Some("Bluetooth unsupported"));
        app.dismiss_notice();
        assert!(app.notice.is_none());
    }

    #[test]
    fn test_log_filter() {
        let mut app = app();
        app.clear_logs();
        app.add_log(LogLevel::Debug, "rx detail");
        app.add_log(LogLevel::Info, "connected");

        assert_eq!(app.visible_logs().count(), 1);
        app.toggle_log_level();
        assert_eq!(app.log_filter, LogLevel::Debug);
        assert_eq!(app.visible_logs().count(), 2);
    }

    #[test]
    fn test_clear_logs_keeps_status_panel() {
        let mut app = app();
        app.apply_robot_event(RobotEvent::Status("Connected".into()));
        app.apply_robot_event(RobotEvent::Telemetry(Telemetry::parse(b"DIST:20")));
        app.add_log(LogLevel::Info, "sent Stop");

        app.clear_logs();
        assert!(app.logs.is_empty());
        assert_eq!(app.status_lines, vec!["Connected", "DIST:20"]);
        assert_eq!(app.distance.as_deref(), Some("Distance: 20 cm"));
    }

    #[test]
    fn test_header_target_from_options() {
        let options = ControllerOptions {
            target: rangerlink_core::parse_address("aa:bb:cc:dd:ee:ff").unwrap(),
            ..Default::default()
        };
        assert_eq!(App::new(options).target, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_status_lines_are_bounded() {
        let mut app = app();
        for i in 0..(MAX_STATUS_LINES + 20) {
            let line = format!("line {i}");
            app.apply_robot_event(RobotEvent::Telemetry(Telemetry::parse(line.as_bytes())));
        }
        assert_eq!(app.status_lines.len(), MAX_STATUS_LINES);
        assert_eq!(
            app.status_lines.last().map(String::as_str),
            Some(format!("line {}", MAX_STATUS_LINES + 19).as_str())
        );
    }

    #[test]
    fn test_tick_drains_log_channel() {
        let mut app = app();
        let before = app.logs.len();
        app.event_tx
            .try_send(AppEvent::LogMessage {
                level: LogLevel::Info,
                message: "from tracing".into(),
            })
            .unwrap();
        app.tick();
        assert_eq!(app.logs.len(), before + 1);
    }
}
