//! 交互式控制台
//!
//! 专用输入线程跑 rustyline，通过通道把行送到主线程；
//! 主线程用 `select!` 同时等待输入、展示事件和 Ctrl+C。

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, bounded, never, select};
use kia_steer::{CoordinatorStatus, SteeringConfig, SteeringCoordinator, UiEvent, events};
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use std::path::PathBuf;
use std::thread;
use tracing::{info, warn};

const PROMPT: &str = "steer> ";

/// 控制台命令
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    /// 设置目标角（原始输入交给协调器解析）
    SetTarget(String),
    Left,
    Right,
    Clear,
    /// 绕过控制器直接发送一条力矩命令
    Send(i16),
    Status,
    Help,
    Quit,
}

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&head) = parts.first() else {
            anyhow::bail!("空命令");
        };

        // 裸数字等价于 set
        if head.parse::<f64>().is_ok() {
            return Ok(ShellCommand::SetTarget(line.trim().to_string()));
        }

        let command = match head {
            "set" => {
                let value = parts.get(1).ok_or_else(|| anyhow::anyhow!("用法: set <度>"))?;
                ShellCommand::SetTarget((*value).to_string())
            },
            "left" | "l" => ShellCommand::Left,
            "right" | "r" => ShellCommand::Right,
            "clear" | "release" => ShellCommand::Clear,
            "send" => {
                let value = parts.get(1).ok_or_else(|| anyhow::anyhow!("用法: send <力矩>"))?;
                let torque = value
                    .parse::<i16>()
                    .with_context(|| format!("力矩必须是 i16 整数: {}", value))?;
                ShellCommand::Send(torque)
            },
            "status" | "s" => ShellCommand::Status,
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" | "q" => ShellCommand::Quit,
            other => anyhow::bail!("未知命令: {}", other),
        };

        let takes_argument = matches!(command, ShellCommand::SetTarget(_) | ShellCommand::Send(_));
        if parts.len() > 2 || (parts.len() == 2 && !takes_argument) {
            anyhow::bail!("多余的参数: {}", line.trim());
        }
        Ok(command)
    }
}

/// 展示事件的最新值
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Dashboard {
    pub steering_angle_deci: Option<i16>,
    pub velocity: Option<String>,
    pub steering_torque: Option<String>,
}

impl Dashboard {
    pub fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::SteeringAngleChanged(deci) => self.steering_angle_deci = Some(deci),
            UiEvent::VelocityChanged(text) => self.velocity = Some(text),
            UiEvent::SteeringTorqueChanged(text) => self.steering_torque = Some(text),
        }
    }
}

enum InputEvent {
    Line(String),
    Interrupt,
}

fn history_path() -> Option<PathBuf> {
    let mut path = dirs::data_local_dir()?;
    path.push("kia-steer");
    path.push("history.txt");
    Some(path)
}

/// 启动输入线程
///
/// 输入结束（Ctrl+D 或 stdin 关闭）时线程退出，通道随之断开。
fn spawn_input() -> Result<Receiver<InputEvent>> {
    let (tx, rx) = bounded::<InputEvent>(10);

    thread::Builder::new()
        .name("kia-steer-input".into())
        .spawn(move || {
            let mut rl = match Editor::<(), DefaultHistory>::new() {
                Ok(rl) => rl,
                Err(e) => {
                    eprintln!("Failed to initialize readline: {}", e);
                    return;
                },
            };

            let history = history_path();
            if let Some(path) = &history {
                rl.load_history(path).ok(); // 首次运行没有历史
            }

            loop {
                match rl.readline(PROMPT) {
                    Ok(line) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        let _ = rl.add_history_entry(line.as_str());
                        if tx.send(InputEvent::Line(line)).is_err() {
                            break;
                        }
                    },
                    Err(ReadlineError::Interrupted) => {
                        println!("^C");
                        let _ = tx.send(InputEvent::Interrupt);
                        break;
                    },
                    Err(ReadlineError::Eof) => break,
                    Err(err) => {
                        eprintln!("Error: {:?}", err);
                        break;
                    },
                }
            }

            if let Some(path) = &history {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).ok();
                }
                rl.save_history(path).ok();
            }
        })
        .context("启动输入线程失败")?;

    Ok(rx)
}

/// 运行控制台，直到 quit、Ctrl+C 或输入结束
pub fn run(config: SteeringConfig) -> Result<()> {
    let (sink, ui_rx) = events::channel(config.event_channel_capacity);
    let can = config.can_interface.clone();
    let tty = config.actuator_tty.clone();

    let mut coordinator = SteeringCoordinator::connect(config, sink)
        .with_context(|| format!("启动失败（CAN: {}, 执行器: {}）", can, tty))?;

    let paths = coordinator.log_paths();
    info!(
        "Coordinator started: commands -> {}, angles -> {}",
        paths.steering_commands.display(),
        paths.steering_angles.display()
    );

    // 非交互 stdin 下 Ctrl+C 不经过 rustyline
    let (interrupt_tx, interrupt_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    })
    .context("安装 Ctrl+C 处理器失败")?;

    println!("Kia Steer v{} - 交互式控制台", env!("CARGO_PKG_VERSION"));
    println!("输入 'help' 查看帮助，'quit' 退出");
    println!();

    let input = spawn_input()?;
    let mut ui_rx = ui_rx;
    let mut dashboard = Dashboard::default();

    loop {
        select! {
            recv(input) -> event => match event {
                Ok(InputEvent::Line(line)) => match ShellCommand::parse(&line) {
                    Ok(ShellCommand::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = execute(command, &coordinator, &dashboard) {
                            eprintln!("❌ {:#}", e);
                        }
                    },
                    Err(e) => {
                        eprintln!("❌ {}", e);
                        println!("输入 'help' 查看可用命令");
                    },
                },
                Ok(InputEvent::Interrupt) => break,
                Err(_) => break,
            },

            recv(ui_rx) -> event => match event {
                Ok(event) => dashboard.apply(event),
                Err(_) => {
                    warn!("UI event channel closed");
                    ui_rx = never();
                },
            },

            recv(interrupt_rx) -> _ => {
                eprintln!("\n🛑 收到 Ctrl+C，正在关闭...");
                break;
            },
        }
    }

    println!("⏳ 关闭中...");
    coordinator.shutdown().context("关闭协调器失败")?;
    print_status(&coordinator.status(), &dashboard);
    println!("👋 再见！");
    Ok(())
}

fn execute(command: ShellCommand, coordinator: &SteeringCoordinator, dashboard: &Dashboard) -> Result<()> {
    match command {
        ShellCommand::SetTarget(input) => {
            let target = coordinator.set_target_from_input(&input)?;
            println!("✅ 目标: {:.1}°", target);
        },
        ShellCommand::Left => {
            let target = coordinator.turn_left()?;
            println!("✅ 目标: {:.1}°", target);
        },
        ShellCommand::Right => {
            let target = coordinator.turn_right()?;
            println!("✅ 目标: {:.1}°", target);
        },
        ShellCommand::Clear => match coordinator.clear_target() {
            Some(previous) => println!("✅ 已清除目标（原 {:.1}°），已释放转向", previous),
            None => println!("⚠️  当前没有目标"),
        },
        ShellCommand::Send(torque) => {
            coordinator.send_single_command(torque)?;
            println!("✅ 已发送力矩 {}", torque);
        },
        ShellCommand::Status => print_status(&coordinator.status(), dashboard),
        ShellCommand::Help => print_help(),
        ShellCommand::Quit => {},
    }
    Ok(())
}

fn fmt_opt(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}{}", v, unit))
}

fn print_status(status: &CoordinatorStatus, dashboard: &Dashboard) {
    println!("📊 状态");
    println!("  目标角:     {}", fmt_opt(status.target_deg, "°"));
    let measured = status
        .steering_angle_deg
        .or(dashboard.steering_angle_deci.map(|deci| f64::from(deci) / 10.0));
    println!("  转向角:     {}", fmt_opt(measured, "°"));
    println!("  车速:       {}", dashboard.velocity.as_deref().unwrap_or("-"));
    println!("  力矩偏置:   {}", dashboard.steering_torque.as_deref().unwrap_or("-"));
    println!(
        "  CAN:        {} ({} 帧, {} 解码错误, {} 设备错误)",
        if status.producer_running { "运行中" } else { "已停止" },
        status.can.rx_frames_total,
        status.can.decode_errors,
        status.can.device_errors
    );
    println!("  命令:       {} 已发送, {} 失败", status.commands_sent, status.failed_commands);
    println!("  日志失败:   {}", status.log_failures);
    println!("  丢弃事件:   {}", status.dropped_events);
}

fn print_help() {
    println!("可用命令:");
    println!("  set <度> | <度>   设置目标转向角（正值向左）");
    println!("  left | l          目标角左移一个步长");
    println!("  right | r         目标角右移一个步长");
    println!("  clear             清除目标并释放转向");
    println!("  send <力矩>       直接发送一条力矩命令");
    println!("  status | s        显示当前状态");
    println!("  help | ?          显示本帮助");
    println!("  quit | exit | q   关闭并退出");
}
