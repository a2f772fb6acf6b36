//! 应用配置模块

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Rackspace Cloud Files 美国区认证地址
pub const US_AUTH_URL: &str = "https://auth.api.rackspacecloud.com/v1.0";

/// 远程存储类型
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteType {
    #[default]
    Swift,
    Local,
}

/// 远程存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(rename = "type", default)]
    pub typ: RemoteType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// 通过内网（ServiceNet）访问
    #[serde(default)]
    pub servicenet: bool,
    /// 本地存储根目录（type = local）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// 公开容器的 CDN TTL（秒）
    #[serde(default = "default_cdn_ttl")]
    pub cdn_ttl: u64,
}

fn default_auth_url() -> String {
    US_AUTH_URL.to_string()
}

fn default_cdn_ttl() -> u64 {
    86400
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            typ: RemoteType::default(),
            username: None,
            api_key: None,
            auth_url: default_auth_url(),
            servicenet: false,
            path: None,
            container: None,
            cdn_ttl: default_cdn_ttl(),
        }
    }
}

impl RemoteConfig {
    fn validate(&self) -> Result<()> {
        if self.container.as_deref().map_or(true, str::is_empty) {
            return Err(SyncError::Config("remote.container is required".into()));
        }
        match self.typ {
            RemoteType::Swift => {
                if self.username.as_deref().map_or(true, str::is_empty) {
                    return Err(SyncError::Config("remote.username is required".into()));
                }
                if self.api_key.as_deref().map_or(true, str::is_empty) {
                    return Err(SyncError::Config("remote.apiKey is required".into()));
                }
                if self.auth_url.is_empty() {
                    return Err(SyncError::Config("remote.authUrl is required".into()));
                }
            }
            RemoteType::Local => {
                if self.path.is_none() {
                    return Err(SyncError::Config(
                        "remote.path is required for local storage".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// 对象头规则：对象名匹配 pattern（正则）时，上传后设置 headers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderRule {
    pub pattern: String,
    pub headers: BTreeMap<String, String>,
}

/// 同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// 本地静态文件根目录
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_root: Option<PathBuf>,
    /// 静态文件的公开 URL，其路径部分作为远程对象名前缀
    #[serde(default = "default_static_url")]
    pub static_url: String,
    /// 排除的文件名/模式
    #[serde(default = "default_filter_list")]
    pub filter_list: Vec<String>,
    #[serde(default)]
    pub headers: Vec<HeaderRule>,
    /// 最大并发传输数
    #[serde(default = "default_max_concurrent_transfers")]
    pub max_concurrent_transfers: usize,
    #[serde(default)]
    pub remote: RemoteConfig,
}

fn default_static_url() -> String {
    "/static/".to_string()
}

fn default_filter_list() -> Vec<String> {
    vec![".DS_Store".to_string(), "Thumbs.db".to_string()]
}

fn default_max_concurrent_transfers() -> usize {
    4
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            local_root: None,
            static_url: default_static_url(),
            filter_list: default_filter_list(),
            headers: Vec::new(),
            max_concurrent_transfers: default_max_concurrent_transfers(),
            remote: RemoteConfig::default(),
        }
    }
}

impl SyncSettings {
    /// 从配置文件加载；文件不存在时使用默认配置
    pub fn load(config_file: &Path) -> Result<Self> {
        if !config_file.exists() {
            tracing::debug!("配置文件不存在，使用默认配置: {}", config_file.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_file).map_err(|e| {
            SyncError::Config(format!("cannot read {}: {}", config_file.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            SyncError::Config(format!("invalid settings in {}: {}", config_file.display(), e))
        })
    }

    /// 在任何本地或远程 IO 之前检查必填项
    pub fn validate(&self) -> Result<()> {
        let root = self
            .local_root
            .as_ref()
            .ok_or_else(|| SyncError::Config("localRoot is required".into()))?;
        if !root.is_dir() {
            return Err(SyncError::Config(format!(
                "localRoot {} is not a directory",
                root.display()
            )));
        }
        if self.max_concurrent_transfers == 0 {
            return Err(SyncError::Config(
                "maxConcurrentTransfers must be at least 1".into(),
            ));
        }
        self.remote.validate()
    }

    /// 容器名（validate 之后可用）
    pub fn container(&self) -> Result<&str> {
        self.remote
            .container
            .as_deref()
            .ok_or_else(|| SyncError::Config("remote.container is required".into()))
    }
}
