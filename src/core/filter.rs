//! 排除规则

use crate::error::{Result, SyncError};
use regex::Regex;

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Glob(Regex),
}

#[derive(Debug, Clone)]
struct FilterRule {
    matcher: Matcher,
    /// 含 `/` 的模式匹配完整相对路径，否则只匹配文件名
    anchored: bool,
}

impl FilterRule {
    fn is_match(&self, candidate: &str) -> bool {
        match &self.matcher {
            Matcher::Exact(name) => name == candidate,
            Matcher::Glob(re) => re.is_match(candidate),
        }
    }
}

/// 排除的文件名/模式集合
///
/// 支持精确文件名（`.DS_Store`）、`*`/`?` 通配（`*.tmp`）以及跨目录的
/// `**`（`admin/**`）。匹配区分大小写。
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    rules: Vec<FilterRule>,
}

impl FilterSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut rules = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }

            let anchored = pattern.contains('/');
            let pattern = pattern.trim_start_matches('/');
            let matcher = if pattern.contains(['*', '?']) {
                let re = Regex::new(&glob_to_regex(pattern)).map_err(|e| {
                    SyncError::Config(format!("invalid filter pattern {}: {}", pattern, e))
                })?;
                Matcher::Glob(re)
            } else {
                Matcher::Exact(pattern.trim_end_matches('/').to_string())
            };
            rules.push(FilterRule { matcher, anchored });
        }
        Ok(Self { rules })
    }

    /// 相对路径（`/` 分隔）是否被排除
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
        self.rules.iter().any(|rule| {
            if rule.anchored {
                rule.is_match(relative_path)
            } else {
                rule.is_match(file_name)
            }
        })
    }

    /// 路径本身或任一上级目录被排除
    ///
    /// 与扫描时整体跳过被排除目录的行为一致：`.svn/entries` 因 `.svn` 而被排除。
    pub fn is_excluded_path(&self, relative_path: &str) -> bool {
        relative_path
            .match_indices('/')
            .map(|(idx, _)| &relative_path[..idx])
            .chain(std::iter::once(relative_path))
            .any(|prefix| self.is_excluded(prefix))
    }
}

/// 简单的 glob -> 正则转换
fn glob_to_regex(pattern: &str) -> String {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                re.push_str(".*");
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    re
}
