//! 本地路径到远程对象名的映射

use crate::error::{Result, SyncError};
use std::path::{Component, Path, PathBuf};
use url::Url;

/// 本地路径 -> 远程对象名
///
/// 去掉本地根目录前缀，统一使用 `/` 分隔，并拼接到远程前缀之后。
/// 非 UTF-8 路径不映射，保证不同路径不会得到同一个对象名。
#[derive(Debug, Clone)]
pub struct PathMapper {
    local_root: PathBuf,
    /// 规范化后的远程前缀，不含首尾 `/`，可能为空
    base_path: String,
}

impl PathMapper {
    pub fn new(local_root: impl Into<PathBuf>, remote_base_path: &str) -> Self {
        Self {
            local_root: local_root.into(),
            base_path: normalize_base(remote_base_path),
        }
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// 本地根目录下的相对路径（`/` 分隔）
    pub fn relative(&self, local_path: &Path) -> Option<String> {
        let rest = local_path.strip_prefix(&self.local_root).ok()?;
        let mut parts = Vec::new();
        for component in rest.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    /// 本地路径对应的远程对象名
    pub fn map(&self, local_path: &Path) -> Option<String> {
        self.relative(local_path).map(|rel| self.object_name(&rel))
    }

    /// 相对路径加上远程前缀
    pub fn object_name(&self, relative: &str) -> String {
        if self.base_path.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.base_path, relative)
        }
    }

    /// 对象名去掉远程前缀后的相对部分；不在前缀下时返回 None
    pub fn strip_base<'a>(&self, object_name: &'a str) -> Option<&'a str> {
        if self.base_path.is_empty() {
            return Some(object_name);
        }
        object_name
            .strip_prefix(self.base_path.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

fn normalize_base(base: &str) -> String {
    base.split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// 从公开 URL 取路径部分作为远程前缀（去掉开头的 `/`）
///
/// 既接受完整 URL（`https://cdn.example.com/static/`），也接受相对路径（`/static/`）。
pub fn base_path_from_url(static_url: &str) -> Result<String> {
    let parsed = match Url::parse(static_url) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse("http://localhost/")
            .and_then(|base| base.join(static_url))
            .map_err(|e| SyncError::Config(format!("invalid staticUrl {}: {}", static_url, e)))?,
        Err(e) => {
            return Err(SyncError::Config(format!(
                "invalid staticUrl {}: {}",
                static_url, e
            )))
        }
    };

    let path = urlencoding::decode(parsed.path())
        .map_err(|e| SyncError::Config(format!("invalid staticUrl {}: {}", static_url, e)))?;
    Ok(path.trim_start_matches('/').to_string())
}
