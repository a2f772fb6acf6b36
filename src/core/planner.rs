//! 同步规划：为每个本地文件决定 Create / Update / Skip，遍历结束后计算删除集

use crate::core::filter::FilterSet;
use crate::core::hasher::{hashes_match, ContentHasher};
use crate::core::path_mapper::PathMapper;
use crate::core::remote_index::RemoteIndex;
use crate::core::scanner::LocalFile;
use crate::error::SyncError;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// 规划选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
    /// 只上传远程不存在的文件，不更新、不删除
    pub add_only: bool,
    /// 不删除远程多余对象
    pub no_delete: bool,
}

impl PlanOptions {
    pub fn deletes_enabled(&self) -> bool {
        !self.add_only && !self.no_delete
    }
}

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AddOnly,
    NotModifiedTimestamp,
    NotModifiedChecksum,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AddOnly => write!(f, "exists (add-only)"),
            SkipReason::NotModifiedTimestamp => write!(f, "not modified (timestamp)"),
            SkipReason::NotModifiedChecksum => write!(f, "not modified (checksum)"),
        }
    }
}

/// 单个对象的同步决策
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDecision {
    Create {
        object_name: String,
        local_path: PathBuf,
    },
    Update {
        object_name: String,
        local_path: PathBuf,
    },
    Skip {
        object_name: String,
        reason: SkipReason,
    },
    Delete {
        object_name: String,
    },
    /// 本地文件无法读取，只影响该文件
    Unreadable {
        object_name: String,
        local_path: PathBuf,
        message: String,
    },
}

impl SyncDecision {
    pub fn object_name(&self) -> &str {
        match self {
            SyncDecision::Create { object_name, .. }
            | SyncDecision::Update { object_name, .. }
            | SyncDecision::Skip { object_name, .. }
            | SyncDecision::Delete { object_name }
            | SyncDecision::Unreadable { object_name, .. } => object_name,
        }
    }

    /// 是否需要上传内容
    pub fn is_upload(&self) -> bool {
        matches!(self, SyncDecision::Create { .. } | SyncDecision::Update { .. })
    }
}

/// 同步规划器
///
/// 持有只读的远程索引，并记录本次遍历见过的对象名。遍历结束后调用
/// [`SyncPlanner::finish`] 得到删除集。
pub struct SyncPlanner {
    index: Arc<RemoteIndex>,
    hasher: Arc<dyn ContentHasher>,
    mapper: PathMapper,
    filters: FilterSet,
    options: PlanOptions,
    seen: HashSet<String>,
}

impl SyncPlanner {
    pub fn new(
        index: Arc<RemoteIndex>,
        hasher: Arc<dyn ContentHasher>,
        mapper: PathMapper,
        filters: FilterSet,
        options: PlanOptions,
    ) -> Self {
        Self {
            index,
            hasher,
            mapper,
            filters,
            options,
            seen: HashSet::new(),
        }
    }

    /// 对象名（去掉远程前缀后）是否被排除规则命中
    fn is_filtered(&self, object_name: &str) -> bool {
        let relative = self.mapper.strip_base(object_name).unwrap_or(object_name);
        self.filters.is_excluded_path(relative)
    }

    /// 为一个本地文件做决策；被排除的文件返回 None，不计入任何计数
    pub fn decide(&mut self, file: &LocalFile) -> Option<SyncDecision> {
        let object_name = file.relative_object_name.clone();
        if self.is_filtered(&object_name) {
            trace!("排除: {}", object_name);
            return None;
        }
        self.seen.insert(object_name.clone());
        Some(self.compare(object_name, file))
    }

    fn compare(&self, object_name: String, file: &LocalFile) -> SyncDecision {
        let remote = match self.index.get(&object_name) {
            Some(meta) => meta,
            None => {
                trace!("新文件: {}", object_name);
                return SyncDecision::Create {
                    object_name,
                    local_path: file.absolute_path.clone(),
                };
            }
        };

        if self.options.add_only {
            return SyncDecision::Skip {
                object_name,
                reason: SkipReason::AddOnly,
            };
        }

        // 远程比本地新则直接跳过，不比较内容
        if let Some(remote_modified) = remote.last_modified {
            if file.mtime < remote_modified {
                return SyncDecision::Skip {
                    object_name,
                    reason: SkipReason::NotModifiedTimestamp,
                };
            }
        }

        let local_hash = match self.hasher.hash_file(&file.absolute_path) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("计算哈希失败: {}: {}", file.absolute_path.display(), e);
                return SyncDecision::Unreadable {
                    object_name,
                    local_path: file.absolute_path.clone(),
                    message: e.to_string(),
                };
            }
        };

        match remote.content_hash.as_deref() {
            Some(remote_hash) if hashes_match(&local_hash, remote_hash) => SyncDecision::Skip {
                object_name,
                reason: SkipReason::NotModifiedChecksum,
            },
            _ => {
                debug!("内容变化: {}", object_name);
                SyncDecision::Update {
                    object_name,
                    local_path: file.absolute_path.clone(),
                }
            }
        }
    }

    /// 处理扫描结果（包括扫描错误）
    pub fn decide_entry(&mut self, entry: Result<LocalFile, SyncError>) -> Option<SyncDecision> {
        match entry {
            Ok(file) => self.decide(&file),
            Err(err) => {
                let (local_path, message) = match err {
                    SyncError::LocalRead { path, source } => (path, source.to_string()),
                    other => (self.mapper.local_root().to_path_buf(), other.to_string()),
                };
                let object_name = self
                    .mapper
                    .map(&local_path)
                    .unwrap_or_else(|| local_path.display().to_string());
                // 读不到的文件仍算"见过"，避免误删远程副本
                self.seen.insert(object_name.clone());
                Some(SyncDecision::Unreadable {
                    object_name,
                    local_path,
                    message,
                })
            }
        }
    }

    /// 遍历结束：远程存在但本地未见过的对象，按名称排序
    pub fn finish(self) -> Vec<SyncDecision> {
        if !self.options.deletes_enabled() || self.index.is_empty() {
            return Vec::new();
        }

        let mut names: Vec<&str> = self
            .index
            .names()
            .filter(|name| !self.seen.contains(*name) && !self.is_filtered(name))
            .collect();
        names.sort_unstable();

        names
            .into_iter()
            .map(|name| SyncDecision::Delete {
                object_name: name.to_string(),
            })
            .collect()
    }

    /// 对一组文件做完整规划（上传决策 + 删除集）
    pub fn plan<I>(mut self, files: I) -> Vec<SyncDecision>
    where
        I: IntoIterator<Item = Result<LocalFile, SyncError>>,
    {
        let mut decisions: Vec<SyncDecision> = files
            .into_iter()
            .filter_map(|entry| self.decide_entry(entry))
            .collect();
        decisions.extend(self.finish());
        decisions
    }
}
