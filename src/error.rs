//! 错误类型

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// 远程写操作类型（用于错误报告）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Create,
    Update,
    Delete,
    SetHeaders,
}

impl std::fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteOp::Create => write!(f, "create"),
            RemoteOp::Update => write!(f, "update"),
            RemoteOp::Delete => write!(f, "delete"),
            RemoteOp::SetHeaders => write!(f, "set headers"),
        }
    }
}

/// 同步错误
#[derive(Error, Debug)]
pub enum SyncError {
    /// 无法访问远程存储（致命，在任何写操作前中止）
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// 本地文件无法读取或计算哈希（仅影响该文件）
    #[error("Cannot read {}: {source}", path.display())]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 单个对象的远程写操作失败（仅影响该对象）
    #[error("Remote {operation} failed for {object_name}: {message}")]
    RemoteWrite {
        object_name: String,
        operation: RemoteOp,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    /// 内部任务失败（例如规划线程 panic）
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn remote_unavailable(err: impl std::fmt::Display) -> Self {
        SyncError::RemoteUnavailable(err.to_string())
    }

    pub fn remote_write(
        object_name: impl Into<String>,
        operation: RemoteOp,
        err: impl std::fmt::Display,
    ) -> Self {
        SyncError::RemoteWrite {
            object_name: object_name.into(),
            operation,
            message: err.to_string(),
        }
    }

    /// 是否是致命错误（需要中止整个运行）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteUnavailable(_) | SyncError::Config(_) | SyncError::Internal(_)
        )
    }
}
