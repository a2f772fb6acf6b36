//! 容器准备：获取/创建、公开、清空

use crate::core::report::Reporter;
use crate::error::{RemoteOp, Result, SyncError};
use crate::storage::{Connection, Container};
use std::sync::Arc;
use tracing::{debug, info};

/// 容器准备
///
/// 试运行时只查询不修改：容器不存在不会被创建，也不会被设为公开。
#[derive(Debug, Clone, Copy)]
pub struct ContainerBootstrap {
    dry_run: bool,
}

impl ContainerBootstrap {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// 获取容器，不存在则创建
    ///
    /// 试运行且容器不存在时返回 None。
    pub async fn ensure(
        &self,
        conn: &dyn Connection,
        name: &str,
    ) -> Result<Option<Arc<dyn Container>>> {
        if self.dry_run {
            let container = conn
                .get_container(name)
                .await
                .map_err(SyncError::remote_unavailable)?;
            if container.is_none() {
                info!("容器 {} 不存在，试运行不创建", name);
            }
            return Ok(container);
        }

        let container = conn
            .get_or_create_container(name)
            .await
            .map_err(SyncError::remote_unavailable)?;
        debug!("使用容器: {} ({})", container.name(), conn.name());
        Ok(Some(container))
    }

    /// 确保容器公开可读（幂等）
    pub async fn ensure_public(&self, container: &dyn Container) -> Result<()> {
        let public = container
            .is_public()
            .await
            .map_err(SyncError::remote_unavailable)?;
        if public {
            return Ok(());
        }

        if self.dry_run {
            info!("容器 {} 未公开，试运行不修改", container.name());
            return Ok(());
        }

        container
            .make_public()
            .await
            .map_err(SyncError::remote_unavailable)?;
        info!("容器 {} 已设为公开", container.name());
        Ok(())
    }

    /// 删除容器中的全部对象
    ///
    /// 单个对象删除失败只记录，不中止。
    pub async fn wipe(
        &self,
        container: Option<&dyn Container>,
        reporter: &mut Reporter,
    ) -> Result<()> {
        let count = match container {
            Some(c) => c
                .object_count()
                .await
                .map_err(SyncError::remote_unavailable)?,
            None => 0,
        };

        let container = match container {
            Some(c) if !self.dry_run => c,
            _ => {
                reporter.line(format_args!("Wipe would delete {} objects.", count));
                return Ok(());
            }
        };

        reporter.line(format_args!("Deleting {} objects...", count));
        let names = container
            .list_objects()
            .await
            .map_err(SyncError::remote_unavailable)?;

        for name in names {
            match container.delete_object(&name).await {
                Ok(()) => reporter.verbose(format_args!("Deleted {}", name)),
                Err(e) => {
                    reporter.record_failure(&name, SyncError::remote_write(&name, RemoteOp::Delete, e))
                }
            }
        }
        info!("容器 {} 已清空", container.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::report::tests::SharedBuffer;
    use crate::storage::memory::{MemoryConnection, MemoryContainer};
    use std::sync::atomic::Ordering;

    fn reporter(verbosity: u8, dry_run: bool) -> (Reporter, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (
            Reporter::with_writer(verbosity, dry_run, Box::new(buffer.clone())),
            buffer,
        )
    }

    #[tokio::test]
    async fn test_creates_missing_container() {
        let conn = MemoryConnection::new();
        let container = ContainerBootstrap::new(false)
            .ensure(&conn, "static")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(container.name(), "static");
        assert!(conn.container("static").is_some());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_create_or_publish() {
        let conn = MemoryConnection::new();
        let bootstrap = ContainerBootstrap::new(true);
        assert!(bootstrap.ensure(&conn, "static").await.unwrap().is_none());
        assert!(conn.container("static").is_none());

        let existing = conn.add_container(MemoryContainer::new("assets"));
        let container = bootstrap.ensure(&conn, "assets").await.unwrap().unwrap();
        bootstrap.ensure_public(container.as_ref()).await.unwrap();
        assert!(existing.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_public_is_idempotent() {
        let container = MemoryContainer::new("static");
        let bootstrap = ContainerBootstrap::new(false);
        bootstrap.ensure_public(&container).await.unwrap();
        bootstrap.ensure_public(&container).await.unwrap();
        assert_eq!(container.mutations(), vec!["make_public"]);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_fatal() {
        let conn = MemoryConnection::new();
        conn.unreachable.store(true, Ordering::SeqCst);
        let err = ContainerBootstrap::new(false)
            .ensure(&conn, "static")
            .await
            .err()
            .unwrap();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_wipe_dry_run_only_reports() {
        let container = MemoryContainer::new("static")
            .with_object("a", None, None)
            .with_object("b", None, None);
        let (mut r, out) = reporter(1, true);

        ContainerBootstrap::new(true)
            .wipe(Some(&container), &mut r)
            .await
            .unwrap();
        assert_eq!(out.contents(), "Wipe would delete 2 objects.\n");
        assert!(container.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_wipe_deletes_everything_and_isolates_failures() {
        let container = MemoryContainer::new("static")
            .with_object("a", None, None)
            .with_object("b", None, None)
            .with_object("c", None, None);
        container.fail_on("b");
        let (mut r, out) = reporter(2, false);

        ContainerBootstrap::new(false)
            .wipe(Some(&container), &mut r)
            .await
            .unwrap();

        assert_eq!(container.object_names(), vec!["b"]);
        let text = out.contents();
        assert!(text.starts_with("Deleting 3 objects...\nDeleted a\n"));
        assert!(text.contains("Failed b: "));
        assert!(text.ends_with("Deleted c\n"));
        assert_eq!(r.counters().failed, 1);
        assert_eq!(r.counters().deleted, 0);
    }
}
