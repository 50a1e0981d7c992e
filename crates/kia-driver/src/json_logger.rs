//! 追加写入的 JSON 结构化日志
//!
//! 每个日志流对应一个文件 `<root>_<run_id>.json`，内容是一个 JSON 文档：
//!
//! ```text
//! {"steering_commands":[
//! {"time_usec":1203,"value":{"steering_torque_offset":12,"target_angle_deci_degrees":50}},
//! {"time_usec":1305,"value":{...}}
//! ]}
//! ```
//!
//! 记录逐条追加并立即刷盘；结尾的 `]}` 在 `finish()` 或 Drop 时写入。
//! 进程异常终止时文件缺少结尾，读取方需自行补齐。

use crate::timestamped::Timestamped;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// 结构化日志错误
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Logger already finished")]
    Finished,
}

#[derive(Serialize)]
struct Record<'a, T> {
    time_usec: u64,
    value: &'a T,
}

/// 带时间戳记录的 JSON 日志
pub struct TimestampedJsonLogger<T> {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    records: u64,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Serialize> TimestampedJsonLogger<T> {
    /// 在 `dir` 下创建 `<root>_<run_id>.json` 并写入文档开头
    ///
    /// 目录不存在时会被创建。
    pub fn create(dir: impl AsRef<Path>, root: &str, run_id: &str) -> Result<Self, LoggerError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}_{}.json", root, run_id));

        let mut writer = BufWriter::new(File::create(&path)?);
        // 根键经 serde_json 转义
        write!(writer, "{{{}:[", serde_json::to_string(root)?)?;
        writer.flush()?;

        debug!("Structured log opened: {}", path.display());
        Ok(Self {
            writer: Some(writer),
            path,
            records: 0,
            _marker: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 已写入的记录数
    pub fn records(&self) -> u64 {
        self.records
    }

    /// 追加一条记录并刷盘
    ///
    /// 分隔符与记录先编码到缓冲区，整体写入后才计数：编码失败不会在文件中
    /// 留下孤立的 `,`。刷盘失败时记录已在写缓冲中，仍计入。
    pub fn append(&mut self, sample: &Timestamped<T>) -> Result<(), LoggerError> {
        let writer = self.writer.as_mut().ok_or(LoggerError::Finished)?;

        let mut line = Vec::with_capacity(96);
        if self.records > 0 {
            line.push(b',');
        }
        line.push(b'\n');
        serde_json::to_writer(
            &mut line,
            &Record {
                time_usec: sample.timestamp_us(),
                value: sample.value(),
            },
        )?;

        writer.write_all(&line)?;
        self.records += 1;
        writer.flush()?;
        Ok(())
    }

    /// 写入文档结尾并关闭文件
    ///
    /// 重复调用返回 `LoggerError::Finished`。
    pub fn finish(&mut self) -> Result<(), LoggerError> {
        let mut writer = self.writer.take().ok_or(LoggerError::Finished)?;
        writer.write_all(b"\n]}\n")?;
        writer.flush()?;
        debug!(
            "Structured log closed: {} ({} records)",
            self.path.display(),
            self.records
        );
        Ok(())
    }
}

impl<T> Drop for TimestampedJsonLogger<T> {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take()
            && let Err(e) = writer.write_all(b"\n]}\n").and_then(|_| writer.flush())
        {
            warn!("Failed to close structured log {}: {}", self.path.display(), e);
        }
    }
}
