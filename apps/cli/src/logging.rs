//! 日志初始化
//!
//! 终端输出到 stderr；控制台模式下额外写一份 `kia-steer.log` 到日志目录。
//! 过滤规则取 `RUST_LOG`，缺省为各 crate 的 info 级别。

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DIRECTIVES: &str = "kia_steer=info,kia_steer_cli=info,kia_driver=info,kia_can=info";
const LOG_FILE_NAME: &str = "kia-steer.log";

/// 安装全局 subscriber
///
/// 返回的 guard 持有文件写入线程，调用方需保持其存活。
pub fn init(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).with_context(|| format!("创建日志目录失败: {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_target(true).with_writer(writer);
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("初始化日志失败")?;

    Ok(guard)
}
