//! Rangerlink CLI
//!
//! 命令行客户端，适合脚本化地遥控机器人

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rangerlink_core::{AppSettings, Command};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rangerlink", version, about = "mBot Ranger 蓝牙遥控工具")]
struct Cli {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 扫描附近设备
    Scan {
        /// 扫描超时时间 (秒)
        #[arg(short, long, default_value = "10")]
        timeout: u64,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 连接并依次发送指令 (L/O/H/S/D 或 line/obstacle/hand/stop/distance)
    Send {
        /// 指令列表
        #[arg(required = true)]
        commands: Vec<Command>,
        /// 机器人地址 (覆盖配置文件)
        #[arg(short, long)]
        address: Option<String>,
        /// 发送后等待回复的时间 (秒)
        #[arg(short, long, default_value = "1")]
        wait: u64,
    },
    /// 连接并持续打印遥测，Ctrl-C 退出
    Monitor {
        /// 机器人地址 (覆盖配置文件)
        #[arg(short, long)]
        address: Option<String>,
        /// 每隔 N 秒发送一次距离查询
        #[arg(short, long)]
        poll: Option<u64>,
    },
    /// 查看或修改配置
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// 显示当前配置
    Show,
    /// 显示配置文件路径
    Path,
    /// 设置机器人地址
    SetAddress { address: String },
    /// 恢复默认配置
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = AppSettings::load();

    init_logging(cli.verbose || settings.verbose);

    match cli.command {
        Commands::Scan { timeout, json } => {
            commands::scan(&settings, timeout, json).await?;
        }
        Commands::Send {
            commands: list,
            address,
            wait,
        } => {
            override_address(&mut settings, address);
            commands::send(&settings, &list, wait).await?;
        }
        Commands::Monitor { address, poll } => {
            override_address(&mut settings, address);
            commands::monitor(&settings, poll).await?;
        }
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::show_config(&settings),
            ConfigAction::Path => println!("{}", AppSettings::config_path().display()),
            ConfigAction::SetAddress { address } => {
                settings.target_address = address;
                settings.target()?;
                settings.save()?;
                println!("✅ 机器人地址已更新为: {}", settings.target_address);
            }
            ConfigAction::Reset => {
                AppSettings::default().save()?;
                println!("✅ 已恢复默认配置");
            }
        },
    }

    Ok(())
}

fn override_address(settings: &mut AppSettings, address: Option<String>) {
    if let Some(address) = address {
        settings.target_address = address;
    }
}

fn init_logging(verbose: bool) {
    // 桥接 log crate（rangerlink-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let default_filter = if verbose {
        "debug,btleplug=info"
    } else {
        "warn"
    };

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init();
}
