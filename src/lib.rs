pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::{HeaderRule, RemoteConfig, RemoteType, SyncSettings};
pub use core::{RunOptions, SyncEngine, SyncReport};
pub use error::{Result, SyncError};

/// 平台相关目录
pub mod dirs {
    use std::path::PathBuf;

    const APP_DIR_NAME: &str = "staticsync";

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            // Linux：优先 XDG_CONFIG_HOME
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }

    /// 应用配置目录，无法确定时使用当前目录下的 .staticsync
    pub fn app_config_dir() -> PathBuf {
        config_dir()
            .map(|p| p.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR_NAME)))
    }

    /// 默认配置文件路径
    pub fn default_config_file() -> PathBuf {
        app_config_dir().join("config.json")
    }
}
