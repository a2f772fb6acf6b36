//! 远程对象快照

use crate::error::{Result, SyncError};
use crate::storage::{Container, RemoteObjectMeta};
use std::collections::HashMap;
use tracing::{debug, info};

/// 对象名 -> 远程元数据
///
/// 每次运行只加载一次，之后只读；运行过程中不会重新拉取。
#[derive(Debug, Clone, Default)]
pub struct RemoteIndex {
    objects: HashMap<String, RemoteObjectMeta>,
}

impl RemoteIndex {
    /// 一次性列出容器中的全部对象
    pub async fn load(container: &dyn Container) -> Result<Self> {
        debug!("加载远程索引: {}", container.name());
        let objects = container
            .list_objects_info()
            .await
            .map_err(SyncError::remote_unavailable)?;
        let index = Self::from_objects(objects);
        info!("远程索引: {} 个对象", index.len());
        Ok(index)
    }

    pub fn from_objects(objects: impl IntoIterator<Item = RemoteObjectMeta>) -> Self {
        Self {
            objects: objects
                .into_iter()
                .map(|meta| (meta.object_name.clone(), meta))
                .collect(),
        }
    }

    pub fn get(&self, object_name: &str) -> Option<&RemoteObjectMeta> {
        self.objects.get(object_name)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryContainer;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_load_snapshot() {
        let container = MemoryContainer::new("static")
            .with_object("static/a.css", None, Some("abc"))
            .with_object("static/b.js", None, None);

        let index = RemoteIndex::load(&container).await.unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(
            index.get("static/a.css").and_then(|m| m.content_hash.as_deref()),
            Some("abc")
        );
        assert!(index.get("static/c.png").is_none());
    }

    #[tokio::test]
    async fn test_listing_failure_is_remote_unavailable() {
        let container = MemoryContainer::new("static");
        container.listing_fails.store(true, Ordering::SeqCst);

        let err = RemoteIndex::load(&container).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable(_)));
    }
}
