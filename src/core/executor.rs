//! 执行同步决策

use crate::config::HeaderRule;
use crate::core::planner::SyncDecision;
use crate::error::{RemoteOp, Result, SyncError};
use crate::storage::{Container, ObjectHandle};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 对象头规则（编译后）
#[derive(Debug, Clone, Default)]
pub struct HeaderSet {
    rules: Vec<(Regex, BTreeMap<String, String>)>,
}

impl HeaderSet {
    pub fn new(rules: &[HeaderRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (re, rule.headers.clone()))
                    .map_err(|e| {
                        SyncError::Config(format!("invalid header pattern {}: {}", rule.pattern, e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// 对象应设置的头；多条规则命中时，后面的覆盖前面的同名头
    pub fn for_object(&self, object_name: &str) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        for (pattern, values) in &self.rules {
            if pattern.is_match(object_name) {
                headers.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        headers
    }
}

/// 执行模式
#[derive(Clone)]
pub enum ExecMode {
    /// 不做任何远程写操作
    DryRun,
    Live(Arc<dyn Container>),
}

/// 执行结果类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Create,
    Update,
    Skip,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    pub dry_run: bool,
}

/// 决策执行器
///
/// 只负责远程副作用，不修改远程索引也不计数。单个对象失败以
/// `RemoteWrite` 返回，由调用方记录后继续。
pub struct Executor {
    mode: ExecMode,
    headers: HeaderSet,
}

impl Executor {
    pub fn new(mode: ExecMode, headers: HeaderSet) -> Self {
        Self { mode, headers }
    }

    pub async fn apply(&self, decision: &SyncDecision) -> Result<ActionOutcome> {
        let kind = match decision {
            SyncDecision::Create { .. } => ActionKind::Create,
            SyncDecision::Update { .. } => ActionKind::Update,
            SyncDecision::Skip { .. } => ActionKind::Skip,
            SyncDecision::Delete { .. } => ActionKind::Delete,
            SyncDecision::Unreadable {
                local_path,
                message,
                ..
            } => {
                return Err(SyncError::LocalRead {
                    path: local_path.clone(),
                    source: std::io::Error::other(message.clone()),
                })
            }
        };

        let container = match &self.mode {
            ExecMode::DryRun => {
                return Ok(ActionOutcome {
                    kind,
                    dry_run: true,
                })
            }
            ExecMode::Live(container) => container.as_ref(),
        };

        match decision {
            SyncDecision::Create {
                object_name,
                local_path,
            } => {
                let object = container
                    .create_object(object_name)
                    .await
                    .map_err(|e| SyncError::remote_write(object_name, RemoteOp::Create, e))?;
                self.upload(container, &object, local_path, RemoteOp::Create)
                    .await?;
            }
            SyncDecision::Update {
                object_name,
                local_path,
            } => {
                let object = container
                    .get_object(object_name)
                    .await
                    .map_err(|e| SyncError::remote_write(object_name, RemoteOp::Update, e))?;
                self.upload(container, &object, local_path, RemoteOp::Update)
                    .await?;
            }
            SyncDecision::Delete { object_name } => {
                container
                    .delete_object(object_name)
                    .await
                    .map_err(|e| SyncError::remote_write(object_name, RemoteOp::Delete, e))?;
                info!("已删除: {}", object_name);
            }
            SyncDecision::Skip { .. } | SyncDecision::Unreadable { .. } => {}
        }

        Ok(ActionOutcome {
            kind,
            dry_run: false,
        })
    }

    async fn upload(
        &self,
        container: &dyn Container,
        object: &ObjectHandle,
        local_path: &Path,
        op: RemoteOp,
    ) -> Result<()> {
        debug!("上传: {} -> {}", local_path.display(), object.name);
        container
            .upload(object, local_path)
            .await
            .map_err(|e| SyncError::remote_write(&object.name, op, e))?;

        let headers = self.headers.for_object(&object.name);
        container
            .set_headers(object, &headers)
            .await
            .map_err(|e| SyncError::remote_write(&object.name, RemoteOp::SetHeaders, e))?;

        info!("已上传: {}", object.name);
        Ok(())
    }
}
