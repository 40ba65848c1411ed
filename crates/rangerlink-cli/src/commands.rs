//! 子命令实现

use anyhow::Result;
use rangerlink_core::{
    AppSettings, Command, ControllerOptions, DiscoveredDevice, LinkState, RobotController,
    RobotEvent, RobotScanner, ScanCallback,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// 扫描期间实时打印设备
struct PrintCallback {
    target: String,
}

#[async_trait::async_trait]
impl ScanCallback for PrintCallback {
    async fn on_device_found(&self, device: DiscoveredDevice) {
        println!("   + {}", describe_device(&device, &self.target));
    }
}

pub async fn scan(settings: &AppSettings, timeout: u64, json: bool) -> Result<()> {
    let target = settings.target()?.to_string();
    let scanner = RobotScanner::new().await?;
    scanner.ensure_powered().await?;

    let callback: Option<Arc<dyn ScanCallback>> = if json {
        None
    } else {
        println!("🔍 扫描设备 ({timeout}s)...");
        Some(Arc::new(PrintCallback {
            target: target.clone(),
        }))
    };

    let devices = scanner
        .discover(Duration::from_secs(timeout), callback)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("   未发现设备");
    } else {
        println!();
        for (i, dev) in devices.iter().enumerate() {
            println!("   [{}] {}", i, describe_device(dev, &target));
        }
    }
    if !devices.iter().any(|d| d.address == target) {
        println!("   目标 {target} 未出现在扫描结果中");
    }
    Ok(())
}

pub async fn send(settings: &AppSettings, commands: &[Command], wait: u64) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(64);
    let controller = RobotController::new(ControllerOptions::from_settings(settings)?, tx);
    let debounce = controller.options().debounce;

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    controller.connect().await?;

    for &command in commands {
        if !controller.send(command).await? {
            anyhow::bail!("{command} was not sent, link not ready");
        }
        // 等过防抖窗口再发下一条
        tokio::time::sleep(debounce).await;
    }

    tokio::time::sleep(Duration::from_secs(wait)).await;
    controller.disconnect().await?;

    // 让最后几条事件打印出来
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();
    Ok(())
}

pub async fn monitor(settings: &AppSettings, poll: Option<u64>) -> Result<()> {
    let options = ControllerOptions::from_settings(settings)?;
    let (tx, mut rx) = mpsc::channel(64);
    let controller = RobotController::new(options, tx);

    // connect 期间的事件留在通道里，连接完成后统一打印
    let connected = controller.connect().await;
    while let Ok(event) = rx.try_recv() {
        print_event(&event);
    }
    connected?;

    println!("📡 监听中，按 Ctrl-C 退出");

    let mut ticker = tokio::time::interval(Duration::from_secs(poll.unwrap_or(1).max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                print_event(&event);
                if event == RobotEvent::State(LinkState::Disconnected) {
                    anyhow::bail!("link lost");
                }
            }
            _ = ticker.tick(), if poll.is_some() => {
                controller.send(Command::QueryDistance).await?;
            }
        }
    }

    controller.disconnect().await?;
    Ok(())
}

pub fn show_config(settings: &AppSettings) {
    println!("配置文件: {}", AppSettings::config_path().display());
    println!("  机器人地址:   {}", settings.target_address);
    println!("  扫描超时:     {}s", settings.scan_timeout_secs);
    println!("  防抖窗口:     {}ms", settings.debounce_ms);
    println!("  带应答写入:   {}", settings.write_with_response);
    println!("  详细日志:     {}", settings.verbose);
}

fn print_event(event: &RobotEvent) {
    if let Some(line) = format_event(event) {
        println!("{line}");
    }
}

/// 事件的单行文本，状态变化由 Status 文本表达，不单独输出
fn format_event(event: &RobotEvent) -> Option<String> {
    match event {
        RobotEvent::State(_) => None,
        RobotEvent::Status(text) => Some(format!("● {text}")),
        RobotEvent::Telemetry(telemetry) => Some(match telemetry.distance_display() {
            Some(distance) => format!("📏 {distance}"),
            None => format!("« {}", telemetry.text()),
        }),
        RobotEvent::Notice(text) => Some(format!("⚠️  {text}")),
        RobotEvent::CommandSent(command) => Some(format!("» {command}")),
    }
}

fn describe_device(device: &DiscoveredDevice, target: &str) -> String {
    let marker = if device.address == target { "★ " } else { "" };
    let rssi = device
        .rssi
        .map_or_else(|| "--".to_string(), |r| format!("{r} dBm"));
    let service = if device.has_robot_service { " [FFE1]" } else { "" };
    format!(
        "{}{} ({}) {}{}",
        marker,
        device.display_name(),
        device.address,
        rssi,
        service
    )
}
