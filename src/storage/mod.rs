pub mod local;
#[cfg(test)]
pub mod memory;
pub mod swift;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub use local::{LocalConnection, LocalContainer};
pub use swift::{SwiftConnection, SwiftContainer};

use crate::config::{RemoteConfig, RemoteType};

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;
/// 瞬时错误最大重试次数
pub const MAX_RETRIES: u32 = 3;
/// 重试基础延迟（毫秒），指数退避
pub const RETRY_BASE_DELAY_MS: u64 = 1000;

/// 远程对象元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectMeta {
    pub object_name: String,
    pub last_modified: Option<DateTime<Utc>>,
    /// 内容哈希（MD5 十六进制，与 ETag 相同）
    pub content_hash: Option<String>,
    pub size: u64,
}

/// 容器详情（CDN 地址、TTL、占用空间）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDetails {
    pub public_uri: Option<String>,
    pub public_ssl_uri: Option<String>,
    pub public_streaming_uri: Option<String>,
    pub cdn_ttl: Option<u64>,
    pub size_used: Option<u64>,
}

/// 远程对象句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHandle {
    pub name: String,
}

impl ObjectHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// 远程连接（负责容器的查找与创建）
#[async_trait]
pub trait Connection: Send + Sync {
    /// 查找容器，不存在时返回 None
    async fn get_container(&self, name: &str) -> Result<Option<Arc<dyn Container>>>;

    /// 创建容器
    async fn create_container(&self, name: &str) -> Result<Arc<dyn Container>>;

    /// 获取容器，不存在则创建
    async fn get_or_create_container(&self, name: &str) -> Result<Arc<dyn Container>> {
        match self.get_container(name).await? {
            Some(container) => Ok(container),
            None => self.create_container(name).await,
        }
    }

    /// 连接名称（用于日志）
    fn name(&self) -> &str;
}

/// 远程容器接口
#[async_trait]
pub trait Container: Send + Sync {
    fn name(&self) -> &str;

    async fn is_public(&self) -> Result<bool>;

    async fn make_public(&self) -> Result<()>;

    async fn object_count(&self) -> Result<u64>;

    /// 一次性列出所有对象的元数据
    async fn list_objects_info(&self) -> Result<Vec<RemoteObjectMeta>>;

    /// 列出所有对象名
    async fn list_objects(&self) -> Result<Vec<String>> {
        Ok(self
            .list_objects_info()
            .await?
            .into_iter()
            .map(|o| o.object_name)
            .collect())
    }

    /// 创建对象条目（内容由 upload 写入）
    async fn create_object(&self, name: &str) -> Result<ObjectHandle> {
        Ok(ObjectHandle::new(name))
    }

    /// 打开已存在的对象
    async fn get_object(&self, name: &str) -> Result<ObjectHandle>;

    /// 上传本地文件内容
    async fn upload(&self, object: &ObjectHandle, path: &Path) -> Result<()>;

    /// 设置对象头/元数据（上传后调用）
    async fn set_headers(
        &self,
        object: &ObjectHandle,
        headers: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn delete_object(&self, name: &str) -> Result<()>;

    async fn details(&self) -> Result<ContainerDetails>;
}

/// 根据配置创建远程连接
pub async fn connect(config: &RemoteConfig) -> Result<Arc<dyn Connection>> {
    match config.typ {
        RemoteType::Swift => {
            let username = config
                .username
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Swift storage requires username"))?;
            let api_key = config
                .api_key
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Swift storage requires apiKey"))?;
            tracing::info!(
                "连接 Swift 存储: auth_url={}, servicenet={}",
                config.auth_url,
                config.servicenet
            );
            Ok(Arc::new(
                SwiftConnection::connect(
                    username,
                    api_key,
                    &config.auth_url,
                    config.servicenet,
                    config.cdn_ttl,
                )
                .await?,
            ) as Arc<dyn Connection>)
        }
        RemoteType::Local => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Local storage requires path"))?;
            tracing::info!("初始化本地存储: {}", path.display());
            Ok(Arc::new(LocalConnection::new(path)?) as Arc<dyn Connection>)
        }
    }
}
