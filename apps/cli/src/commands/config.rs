//! 配置管理命令
//!
//! 配置文件默认位于 `<config_dir>/kia-steer/config.toml`，命令行参数覆盖文件中的同名项。

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use kia_steer::SteeringConfig;
use std::fs;
use std::path::PathBuf;

/// 默认配置文件路径
fn default_config_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("kia-steer");
    path.push("config.toml");
    Ok(path)
}

/// 配置来源与覆盖项（对所有子命令生效）
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// 配置文件路径
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// SocketCAN 接口名（如 can0）
    #[arg(long, global = true, value_name = "IFACE")]
    pub can: Option<String>,

    /// 执行器串口设备
    #[arg(long, global = true, value_name = "DEVICE")]
    pub tty: Option<String>,

    /// 日志目录
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => default_config_path(),
        }
    }

    fn apply_overrides(&self, config: &mut SteeringConfig) {
        if let Some(can) = &self.can {
            config.can_interface = can.clone();
        }
        if let Some(tty) = &self.tty {
            config.actuator_tty = tty.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
    }

    /// 读取配置（文件不存在时取默认），应用覆盖项并校验
    pub fn resolve(&self) -> Result<SteeringConfig> {
        let path = self.path()?;
        let mut config = SteeringConfig::load_or_default(&path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        self.apply_overrides(&mut config);
        config.validate().context("配置无效")?;
        Ok(config)
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印配置文件路径
    Path,

    /// 打印生效的配置（含命令行覆盖项）
    Show,

    /// 校验配置文件
    Check,

    /// 写入默认配置文件
    Init {
        /// 覆盖已存在的文件
        #[arg(short, long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(self, args: &ConfigArgs) -> Result<()> {
        match self {
            ConfigCommand::Path => {
                println!("{}", args.path()?.display());
                Ok(())
            },

            ConfigCommand::Show => {
                let config = args.resolve()?;
                print!("{}", config.to_toml_string()?);
                Ok(())
            },

            ConfigCommand::Check => Self::check_(args),

            ConfigCommand::Init { force } => Self::init_(args, force),
        }
    }

    fn check_(args: &ConfigArgs) -> Result<()> {
        let path = args.path()?;
        if !path.exists() {
            anyhow::bail!("配置文件不存在: {}", path.display());
        }
        SteeringConfig::load(&path).with_context(|| format!("配置文件无效: {}", path.display()))?;
        println!("✅ 配置有效: {}", path.display());
        Ok(())
    }

    fn init_(args: &ConfigArgs, force: bool) -> Result<()> {
        let path = args.path()?;
        if path.exists() && !force {
            anyhow::bail!("配置文件已存在: {}（使用 --force 覆盖）", path.display());
        }

        let mut config = SteeringConfig::default();
        args.apply_overrides(&mut config);
        config.validate().context("配置无效")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("创建配置目录失败")?;
        }
        fs::write(&path, config.to_toml_string()?).context("写入配置文件失败")?;

        println!("✅ 已写入: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "can_interface = \"can1\"\nactuator_tty = \"/dev/ttyUSB0\"\n").unwrap();

        let args = ConfigArgs {
            config: Some(path),
            can: Some("vcan0".into()),
            ..Default::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.can_interface, "vcan0");
        assert_eq!(config.actuator_tty, "/dev/ttyUSB0");
    }

    #[test]
    fn test_missing_file_resolves_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let args = ConfigArgs {
            config: Some(dir.path().join("absent.toml")),
            ..Default::default()
        };
        assert_eq!(args.resolve().unwrap(), SteeringConfig::default());
    }

    #[test]
    fn test_invalid_override_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let args = ConfigArgs {
            config: Some(dir.path().join("absent.toml")),
            can: Some("  ".into()),
            ..Default::default()
        };
        assert!(args.resolve().is_err());
    }
}
