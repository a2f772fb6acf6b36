//! 本地目录存储：以目录作为远程存储，子目录作为容器

use super::{
    Connection, Container, ContainerDetails, ObjectHandle, RemoteObjectMeta, IO_TIMEOUT_SECS,
    OP_TIMEOUT_SECS,
};
use crate::core::hasher::{ContentHasher, Md5Hasher};
use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, services::Fs, Metakey, Operator};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// 上传时每次写入的块大小
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

pub struct LocalConnection {
    base_path: PathBuf,
    name: String,
}

impl LocalConnection {
    pub fn new(path: &Path) -> Result<Self> {
        if !path.exists() {
            std::fs::create_dir_all(path)?;
        }
        let name = format!("local:{}", path.display());
        Ok(Self {
            base_path: path.to_path_buf(),
            name,
        })
    }

    fn open(&self, name: &str) -> Result<Arc<dyn Container>> {
        Ok(Arc::new(LocalContainer::open(&self.base_path, name)?) as Arc<dyn Container>)
    }
}

#[async_trait]
impl Connection for LocalConnection {
    async fn get_container(&self, name: &str) -> Result<Option<Arc<dyn Container>>> {
        match tokio::fs::metadata(self.base_path.join(name)).await {
            Ok(meta) if meta.is_dir() => Ok(Some(self.open(name)?)),
            Ok(_) => bail!("{} exists but is not a directory", name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_container(&self, name: &str) -> Result<Arc<dyn Container>> {
        tokio::fs::create_dir_all(self.base_path.join(name)).await?;
        debug!("已创建本地容器: {}", name);
        self.open(name)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub struct LocalContainer {
    operator: Operator,
    dir: PathBuf,
    /// 公开标记文件，放在容器目录之外，避免出现在对象列表中
    public_marker: PathBuf,
    name: String,
}

impl LocalContainer {
    pub fn open(base_path: &Path, name: &str) -> Result<Self> {
        let dir = base_path.join(name);
        let root = dir
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid container path: {}", dir.display()))?;

        let operator = Operator::new(Fs::default().root(root))?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        Ok(Self {
            operator,
            public_marker: base_path.join(format!(".{}.public", name)),
            dir,
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl Container for LocalContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_public(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(&self.public_marker).await?)
    }

    async fn make_public(&self) -> Result<()> {
        tokio::fs::write(&self.public_marker, b"").await?;
        Ok(())
    }

    async fn object_count(&self) -> Result<u64> {
        Ok(self.list_objects().await?.len() as u64)
    }

    async fn list_objects(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut lister = self
            .operator
            .lister_with("")
            .recursive(true)
            .metakey(Metakey::Mode)
            .await?;

        while let Some(entry) = lister.try_next().await? {
            if entry.metadata().is_dir() {
                continue;
            }
            names.push(entry.path().trim_start_matches('/').to_string());
        }

        Ok(names)
    }

    async fn list_objects_info(&self) -> Result<Vec<RemoteObjectMeta>> {
        let mut objects = Vec::new();
        let mut lister = self
            .operator
            .lister_with("")
            .recursive(true)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Mode)
            .await?;

        while let Some(entry) = lister.try_next().await? {
            let meta = entry.metadata();
            if meta.is_dir() {
                continue;
            }

            // 本地目录没有 ETag，流式计算 MD5
            let object_name = entry.path().trim_start_matches('/').to_string();
            let file_path = self.dir.join(&object_name);
            let hash = tokio::task::spawn_blocking(move || Md5Hasher.hash_file(&file_path)).await??;
            objects.push(RemoteObjectMeta {
                object_name,
                last_modified: meta.last_modified(),
                content_hash: Some(hash),
                size: meta.content_length(),
            });
        }

        Ok(objects)
    }

    async fn get_object(&self, name: &str) -> Result<ObjectHandle> {
        match self.operator.stat(name).await {
            Ok(meta) if !meta.is_dir() => Ok(ObjectHandle::new(name)),
            Ok(_) => bail!("{} is a directory", name),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => bail!("No such object: {}", name),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, object: &ObjectHandle, path: &Path) -> Result<()> {
        let file = tokio::fs::File::open(path).await?;
        let mut chunks = ReaderStream::with_capacity(file, UPLOAD_CHUNK_SIZE);
        let mut writer = self.operator.writer(&object.name).await?;
        while let Some(chunk) = chunks.try_next().await? {
            writer.write(chunk).await?;
        }
        writer.close().await?;
        Ok(())
    }

    async fn set_headers(
        &self,
        object: &ObjectHandle,
        headers: &BTreeMap<String, String>,
    ) -> Result<()> {
        // 本地目录无法保存 HTTP 头
        if !headers.is_empty() {
            debug!("本地存储忽略 {} 个对象头: {}", headers.len(), object.name);
        }
        Ok(())
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        self.operator.delete(name).await?;
        Ok(())
    }

    async fn details(&self) -> Result<ContainerDetails> {
        let mut size_used = 0;
        let mut lister = self
            .operator
            .lister_with("")
            .recursive(true)
            .metakey(Metakey::ContentLength | Metakey::Mode)
            .await?;
        while let Some(entry) = lister.try_next().await? {
            if !entry.metadata().is_dir() {
                size_used += entry.metadata().content_length();
            }
        }

        Ok(ContainerDetails {
            public_uri: Some(format!("file://{}", self.dir.display())),
            size_used: Some(size_used),
            ..Default::default()
        })
    }
}
