use crate::config::SyncSettings;
use crate::core::bootstrap::ContainerBootstrap;
use crate::core::executor::{ActionOutcome, ExecMode, Executor, HeaderSet};
use crate::core::filter::FilterSet;
use crate::core::hasher::{ContentHasher, Md5Hasher};
use crate::core::path_mapper::{base_path_from_url, PathMapper};
use crate::core::planner::{PlanOptions, SyncDecision, SyncPlanner};
use crate::core::remote_index::RemoteIndex;
use crate::core::report::{Reporter, RunCounters};
use crate::core::scanner::LocalScanner;
use crate::error::{Result, SyncError};
use crate::storage::{Connection, Container, ContainerDetails};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

/// 规划线程与执行端之间的缓冲决策数
const DECISION_CHANNEL_SIZE: usize = 256;

/// 单次运行的选项（来自命令行）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// 同步前清空容器
    pub wipe: bool,
    /// 试运行：不做任何远程写操作
    pub dry_run: bool,
    pub add_only: bool,
    pub no_delete: bool,
    pub verbosity: u8,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            wipe: false,
            dry_run: false,
            add_only: false,
            no_delete: false,
            verbosity: 1,
        }
    }
}

impl RunOptions {
    fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            add_only: self.add_only,
            no_delete: self.no_delete,
        }
    }
}

/// 同步报告
#[derive(Debug)]
pub struct SyncReport {
    pub counters: RunCounters,
    /// 单个对象的失败（不中止运行）
    pub errors: Vec<SyncError>,
    pub dry_run: bool,
    pub details: Option<ContainerDetails>,
}

impl SyncReport {
    /// 没有任何对象失败
    pub fn is_clean(&self) -> bool {
        self.counters.failed == 0
    }
}

/// 同步引擎
///
/// 运行顺序：准备容器 → 可选清空 → 加载远程索引 → 遍历本地目录并执行上传 →
/// 所有上传完成后执行删除 → 输出汇总。
pub struct SyncEngine {
    container_name: String,
    mapper: PathMapper,
    filters: FilterSet,
    headers: HeaderSet,
    max_concurrent_transfers: usize,
    options: RunOptions,
    hasher: Arc<dyn ContentHasher>,
}

impl SyncEngine {
    pub fn new(settings: &SyncSettings, options: RunOptions) -> Result<Self> {
        let local_root = settings
            .local_root
            .clone()
            .ok_or_else(|| SyncError::Config("localRoot is required".into()))?;
        let base_path = base_path_from_url(&settings.static_url)?;

        Ok(Self {
            container_name: settings.container()?.to_string(),
            mapper: PathMapper::new(local_root, &base_path),
            filters: FilterSet::new(settings.filter_list.as_slice())?,
            headers: HeaderSet::new(&settings.headers)?,
            max_concurrent_transfers: settings.max_concurrent_transfers.max(1),
            options,
            hasher: Arc::new(Md5Hasher),
        })
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// 执行一次完整同步
    ///
    /// 远程不可达等致命错误直接返回 Err；单个对象的失败计入报告后继续。
    pub async fn run(&self, conn: &dyn Connection, mut reporter: Reporter) -> Result<SyncReport> {
        let start = Instant::now();
        let dry_run = self.options.dry_run;
        info!(
            "开始同步: {} -> {}/{}{}",
            self.mapper.local_root().display(),
            self.container_name,
            self.mapper.base_path(),
            if dry_run { " (试运行)" } else { "" }
        );

        let bootstrap = ContainerBootstrap::new(dry_run);
        let container = bootstrap.ensure(conn, &self.container_name).await?;
        if let Some(c) = &container {
            bootstrap.ensure_public(c.as_ref()).await?;
        }

        if self.options.wipe {
            bootstrap.wipe(container.as_deref(), &mut reporter).await?;
        }

        reporter.verbose("Retrieving remote object metadata");
        let index = match &container {
            // 试运行不会真正清空，按清空后的空容器规划，计数与实际运行一致
            Some(_) if self.options.wipe && dry_run => RemoteIndex::default(),
            Some(c) => RemoteIndex::load(c.as_ref()).await?,
            None => RemoteIndex::default(),
        };

        let mode = match &container {
            Some(c) if !dry_run => ExecMode::Live(c.clone()),
            _ => ExecMode::DryRun,
        };
        let executor = Arc::new(Executor::new(mode, self.headers.clone()));

        let deletes = self
            .apply_uploads(Arc::new(index), executor.clone(), &mut reporter)
            .await?;
        self.apply_deletes(deletes, executor.as_ref(), &mut reporter)
            .await;

        reporter.print_summary();

        let details = if reporter.verbosity() > 1 {
            self.fetch_details(container.as_deref()).await
        } else {
            None
        };
        if let Some(d) = &details {
            reporter.print_details(d);
        }

        let (counters, errors) = reporter.finish();
        info!(
            "同步完成: 新建 {}, 更新 {}, 跳过 {}, 删除 {}, 失败 {}, 耗时 {:.1}s",
            counters.created,
            counters.update_count(),
            counters.skipped,
            counters.deleted,
            counters.failed,
            start.elapsed().as_secs_f64()
        );

        Ok(SyncReport {
            counters,
            errors,
            dry_run,
            details,
        })
    }

    /// 规划在阻塞线程中进行（遍历与哈希），决策经有界通道流入；
    /// 上传按 max_concurrent_transfers 并发执行。返回遍历结束后的删除集。
    async fn apply_uploads(
        &self,
        index: Arc<RemoteIndex>,
        executor: Arc<Executor>,
        reporter: &mut Reporter,
    ) -> Result<Vec<SyncDecision>> {
        let (tx, mut rx) = mpsc::channel::<SyncDecision>(DECISION_CHANNEL_SIZE);
        let scanner = LocalScanner::new(self.mapper.clone(), self.filters.clone());
        let mut planner = SyncPlanner::new(
            index,
            self.hasher.clone(),
            self.mapper.clone(),
            self.filters.clone(),
            self.options.plan_options(),
        );

        let plan_handle = tokio::task::spawn_blocking(move || {
            for entry in scanner.scan() {
                let Some(decision) = planner.decide_entry(entry) else {
                    continue;
                };
                if tx.blocking_send(decision).is_err() {
                    // 接收端已退出（致命错误），删除集不再有意义
                    return Vec::new();
                }
            }
            planner.finish()
        });

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_transfers));
        let mut uploads: JoinSet<(SyncDecision, Result<ActionOutcome>)> = JoinSet::new();

        while let Some(decision) = rx.recv().await {
            if !decision.is_upload() {
                let result = executor.apply(&decision).await;
                reporter.record(&decision, result);
                continue;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SyncError::Internal(e.to_string()))?;
            let executor = executor.clone();
            uploads.spawn(async move {
                let result = executor.apply(&decision).await;
                drop(permit);
                (decision, result)
            });

            while let Some(joined) = uploads.try_join_next() {
                record_joined(joined, reporter)?;
            }
        }

        while let Some(joined) = uploads.join_next().await {
            record_joined(joined, reporter)?;
        }

        let deletes = plan_handle
            .await
            .map_err(|e| SyncError::Internal(format!("planner task failed: {}", e)))?;
        debug!("上传阶段结束，待删除 {} 个对象", deletes.len());
        Ok(deletes)
    }

    /// 删除在所有上传完成之后执行，结果按对象名顺序记录
    async fn apply_deletes(
        &self,
        deletes: Vec<SyncDecision>,
        executor: &Executor,
        reporter: &mut Reporter,
    ) {
        let mut results = stream::iter(deletes)
            .map(|decision| async move {
                let result = executor.apply(&decision).await;
                (decision, result)
            })
            .buffered(self.max_concurrent_transfers);

        while let Some((decision, result)) = results.next().await {
            reporter.record(&decision, result);
        }
    }

    async fn fetch_details(&self, container: Option<&dyn Container>) -> Option<ContainerDetails> {
        match container?.details().await {
            Ok(details) => Some(details),
            Err(e) => {
                warn!("获取容器详情失败: {}", e);
                None
            }
        }
    }
}

fn record_joined(
    joined: std::result::Result<(SyncDecision, Result<ActionOutcome>), JoinError>,
    reporter: &mut Reporter,
) -> Result<()> {
    let (decision, result) =
        joined.map_err(|e| SyncError::Internal(format!("upload task failed: {}", e)))?;
    reporter.record(&decision, result);
    Ok(())
}
