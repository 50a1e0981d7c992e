//! # Kia Steer CLI
//!
//! 转向系统的操作员控制台。
//!
//! ```bash
//! # 查看生效配置（默认读取 ~/.config/kia-steer/config.toml）
//! kia-steer config show
//!
//! # 启动交互式控制台
//! $ kia-steer --can can0 --tty /dev/ttyACM0
//! steer> set 15
//! steer> left
//! steer> status
//! steer> quit
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod logging;
mod shell;

use commands::config::{ConfigArgs, ConfigCommand};

/// Kia Steer - 转向角保持控制台
#[derive(Parser, Debug)]
#[command(name = "kia-steer")]
#[command(about = "Operator console for the Kia steering-angle holder", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 启动交互式控制台（默认）
    Shell,

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Config(cmd) => {
            let _guard = logging::init(None)?;
            cmd.execute(&cli.config)
        },

        Commands::Shell => {
            let config = cli.config.resolve()?;
            // guard 必须存活到退出，否则文件日志会丢失尾部
            let _guard = logging::init(Some(&config.log_dir))?;
            shell::run(config)
        },
    }
}
