//! Rangerlink TUI - 单屏机器人遥控界面
//!
//! 使用 ratatui 显示连接状态、距离读数和状态日志。
//!
//! # 日志
//!
//! 日志默认显示在界面底部的日志面板中。
//! 如需输出到文件进行调试，设置 RUST_LOG 环境变量：
//!
//! ```bash
//! RUST_LOG=debug cargo run -p rangerlink-tui 2>> /tmp/rangerlink.log
//! ```

mod app;
mod tui_log;
mod ui;

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use rangerlink_core::logging::LogLevel;
use rangerlink_core::{AppSettings, Command};
use std::io;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use app::App;
use tui_log::TuiLogLayer;

#[derive(Parser)]
#[command(name = "rangerlink-tui", version, about = "mBot Ranger 蓝牙遥控界面")]
struct Args {
    /// 机器人 MAC 地址 (覆盖配置文件)
    #[arg(short, long)]
    address: Option<String>,
    /// 扫描超时时间 (秒)
    #[arg(short = 't', long)]
    scan_timeout: Option<u64>,
    /// 日志面板初始过滤级别 (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = AppSettings::load();
    if let Some(address) = args.address {
        settings.target_address = address;
    }
    if let Some(secs) = args.scan_timeout {
        settings.scan_timeout_secs = secs;
    }

    // 在进入原始模式之前校验地址，错误信息才能正常显示
    let mut app = App::from_settings(&settings)?;
    app.log_filter = args.log_level;

    // 初始化日志系统，发送到 TUI 日志面板
    init_logging(app.event_tx.clone(), settings.verbose);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run app
    let res = run_app(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

/// 初始化日志系统
///
/// - 总是将日志发送到 TUI 日志面板
/// - 如果设置了 RUST_LOG，同时输出到 stderr（用于调试）
fn init_logging(log_tx: tokio::sync::mpsc::Sender<app::AppEvent>, verbose: bool) {
    // 桥接 log crate（rangerlink-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    // TUI 日志层 - 总是启用
    let tui_layer = TuiLogLayer::new(log_tx);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug,btleplug=info")
        } else {
            EnvFilter::new("info,rangerlink_core=debug")
        }
    });

    // 如果设置了 RUST_LOG，同时输出到 stderr
    if std::env::var("RUST_LOG").is_ok() {
        use tracing_subscriber::fmt;

        let stderr_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .compact();

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .with(stderr_layer)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .try_init();
    }
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, &app))?;

        // 使用 poll 避免无限阻塞
        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            // 提示弹窗拦截所有按键以关闭它
            if app.notice.is_some() {
                app.dismiss_notice();
                continue;
            }

            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') | KeyCode::Enter => app.connect(),
                KeyCode::Char('x') => app.disconnect(),
                KeyCode::Char('v') => app.toggle_log_level(),
                KeyCode::Char('e') => app.clear_logs(),
                KeyCode::Char(c) => {
                    if let Some(cmd) = u8::try_from(c).ok().and_then(Command::from_byte) {
                        app.send_command(cmd);
                    }
                }
                _ => {}
            }
        }

        // Update app state (handle async events)
        app.tick();
    }
}
