//! 日志模块 - 控制台日志 + 带大小限制的文件日志

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "staticsync.log";

/// 日志配置（配置文件中的 log 段）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否写入日志文件
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 文件日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
        }
    }
}

impl LogConfig {
    /// 从配置文件的 log 段加载，缺失或损坏时使用默认值
    pub fn load(config_file: &Path) -> Self {
        fs::read_to_string(config_file)
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .and_then(|config| config.get("log").cloned())
            .and_then(|log| serde_json::from_value::<LogConfig>(log).ok())
            .unwrap_or_default()
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

/// 命令行 verbosity 对应的控制台日志级别
pub fn console_level(verbosity: u8) -> tracing::Level {
    match verbosity {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

/// 初始化日志系统：控制台（stderr）+ 文件
pub fn init_logging(config: &LogConfig, log_dir: &Path, verbosity: u8) {
    let console_filter = EnvFilter::builder()
        .with_default_directive(console_level(verbosity).into())
        .from_env_lossy()
        .add_directive("hyper=warn".parse().expect("static directive"))
        .add_directive("reqwest=warn".parse().expect("static directive"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let file_layer = if config.enabled {
        match SizeRotatingWriter::new(log_dir, config.max_size_mb) {
            Ok(writer) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false)
                    .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
                        config.tracing_level(),
                    )),
            ),
            Err(e) => {
                eprintln!("无法创建日志文件 {}: {}", log_dir.display(), e);
                None
            }
        }
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

type SharedWriter = Arc<Mutex<Option<BufWriter<File>>>>;

/// 带大小限制的日志写入器，超过上限时轮转为 .old
#[derive(Clone)]
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    writer: SharedWriter,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let file_path = log_dir.join(LOG_FILE_NAME);
        let max_size = (max_size_mb as u64) * 1024 * 1024;
        let writer = open_log(&file_path, max_size)?;

        Ok(Self {
            file_path,
            max_size,
            writer: Arc::new(Mutex::new(Some(writer))),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

fn lock(writer: &SharedWriter) -> MutexGuard<'_, Option<BufWriter<File>>> {
    // 写日志的线程 panic 不应让日志永久不可用
    writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn exceeds(file_path: &Path, max_size: u64) -> bool {
    fs::metadata(file_path).map_or(false, |m| m.len() > max_size)
}

fn open_log(file_path: &Path, max_size: u64) -> io::Result<BufWriter<File>> {
    if exceeds(file_path, max_size) {
        rotate_log(file_path)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)?;

    Ok(BufWriter::new(file))
}

/// 轮转日志文件：当前文件重命名为 <name>.old
fn rotate_log(file_path: &Path) -> io::Result<()> {
    let backup_path = file_path.with_extension("log.old");
    if backup_path.exists() {
        fs::remove_file(&backup_path)?;
    }
    fs::rename(file_path, &backup_path)
}

/// 检查大小，必要时关闭、轮转并重新打开
fn rotate_if_needed(writer: &SharedWriter, file_path: &Path, max_size: u64) -> io::Result<()> {
    if !exceeds(file_path, max_size) {
        return Ok(());
    }

    let mut guard = lock(writer);
    if let Some(mut w) = guard.take() {
        let _ = w.flush();
    }
    rotate_log(file_path)?;
    *guard = Some(open_log(file_path, max_size)?);
    Ok(())
}

/// 单次写入使用的句柄
pub struct LogWriter {
    inner: SharedWriter,
    file_path: PathBuf,
    max_size: u64,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = {
            let mut guard = lock(&self.inner);
            let writer = guard
                .as_mut()
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Writer not available"))?;
            let written = writer.write(buf)?;
            writer.flush()?;
            written
        };

        let _ = rotate_if_needed(&self.inner, &self.file_path, self.max_size);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match lock(&self.inner).as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        let _ = rotate_if_needed(&self.writer, &self.file_path, self.max_size);

        LogWriter {
            inner: self.writer.clone(),
            file_path: self.file_path.clone(),
            max_size: self.max_size,
        }
    }
}

/// 日志目录（配置目录下的 logs）
pub fn get_log_dir() -> PathBuf {
    crate::dirs::app_config_dir().join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("config.json");

        assert_eq!(LogConfig::load(&file).level, "info");

        fs::write(&file, r#"{"log": {"level": "DEBUG", "maxSizeMb": 1}}"#).unwrap();
        let config = LogConfig::load(&file);
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
        assert_eq!(config.max_size_mb, 1);
        assert!(config.enabled);
    }

    #[test]
    fn test_console_level_by_verbosity() {
        assert_eq!(console_level(0), tracing::Level::ERROR);
        assert_eq!(console_level(1), tracing::Level::WARN);
        assert_eq!(console_level(2), tracing::Level::DEBUG);
        assert_eq!(console_level(9), tracing::Level::TRACE);
    }

    #[test]
    fn test_rotates_when_over_limit() {
        let tmp = tempfile::tempdir().unwrap();
        // 上限为 0 MB：每次写入后都会轮转
        let writer = SizeRotatingWriter::new(tmp.path(), 0).unwrap();

        let mut w = writer.make_writer();
        w.write_all(b"first line\n").unwrap();

        let backup = writer.file_path().with_extension("log.old");
        assert!(backup.exists());
        assert_eq!(fs::read_to_string(&backup).unwrap(), "first line\n");
        assert_eq!(fs::metadata(writer.file_path()).unwrap().len(), 0);
    }
}
