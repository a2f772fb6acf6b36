use crate::core::filter::FilterSet;
use crate::core::path_mapper::PathMapper;
use crate::error::SyncError;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// 本地文件（每次运行重新扫描，不持久化）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub absolute_path: PathBuf,
    pub relative_object_name: String,
    pub mtime: DateTime<Utc>,
    pub size: u64,
}

/// 本地目录扫描器
pub struct LocalScanner {
    mapper: PathMapper,
    filters: FilterSet,
}

impl LocalScanner {
    pub fn new(mapper: PathMapper, filters: FilterSet) -> Self {
        Self { mapper, filters }
    }

    /// 惰性遍历本地根目录
    ///
    /// 同一目录内按文件名排序，结果在一次运行内是确定的。被排除的目录整体跳过。
    /// 无法读取的条目以 `LocalRead` 错误返回，由调用方决定如何记录。
    pub fn scan(&self) -> impl Iterator<Item = Result<LocalFile, SyncError>> + '_ {
        let root = self.mapper.local_root().to_path_buf();

        WalkDir::new(&root)
            .follow_links(true)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.is_filtered(entry))
            .filter_map(move |entry| match entry {
                Ok(entry) if entry.file_type().is_dir() => None,
                Ok(entry) => self.to_local_file(entry),
                Err(e) => {
                    let path = e.path().map(|p| p.to_path_buf()).unwrap_or_else(|| root.clone());
                    warn!("扫描失败: {}: {}", path.display(), e);
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                    Some(Err(SyncError::LocalRead { path, source }))
                }
            })
    }

    fn is_filtered(&self, entry: &DirEntry) -> bool {
        // min_depth 不影响 filter_entry，根目录本身也会经过这里
        if entry.depth() == 0 {
            return false;
        }
        match self.mapper.relative(entry.path()) {
            Some(rel) if self.filters.is_excluded(&rel) => {
                debug!("排除: {}", rel);
                true
            }
            Some(_) => false,
            None => {
                warn!("跳过无法映射的路径: {}", entry.path().display());
                true
            }
        }
    }

    fn to_local_file(&self, entry: DirEntry) -> Option<Result<LocalFile, SyncError>> {
        let relative_object_name = self.mapper.map(entry.path())?;
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                let path = entry.path().to_path_buf();
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("metadata unavailable"));
                return Some(Err(SyncError::LocalRead { path, source }));
            }
        };

        let mtime = match metadata.modified() {
            Ok(t) => DateTime::<Utc>::from(t),
            Err(source) => {
                return Some(Err(SyncError::LocalRead {
                    path: entry.path().to_path_buf(),
                    source,
                }))
            }
        };

        Some(Ok(LocalFile {
            absolute_path: entry.into_path(),
            relative_object_name,
            mtime,
            size: metadata.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn names(scanner: &LocalScanner) -> Vec<String> {
        scanner
            .scan()
            .map(|r| r.unwrap().relative_object_name)
            .collect()
    }

    #[test]
    fn test_scan_is_sorted_and_skips_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("js")).unwrap();
        fs::create_dir_all(root.join("css/empty")).unwrap();
        fs::write(root.join("js/b.js"), "b").unwrap();
        fs::write(root.join("css/a.css"), "a").unwrap();
        fs::write(root.join("robots.txt"), "r").unwrap();

        let scanner = LocalScanner::new(PathMapper::new(root, "static"), FilterSet::default());
        assert_eq!(
            names(&scanner),
            vec!["static/css/a.css", "static/js/b.js", "static/robots.txt"]
        );
    }

    #[test]
    fn test_filtered_entries_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::create_dir_all(root.join("img")).unwrap();
        fs::write(root.join(".git/objects/x"), "x").unwrap();
        fs::write(root.join("img/.DS_Store"), "").unwrap();
        fs::write(root.join("img/logo.png"), "png").unwrap();

        let filters = FilterSet::new(&[".git", ".DS_Store"]).unwrap();
        let scanner = LocalScanner::new(PathMapper::new(root, ""), filters);
        assert_eq!(names(&scanner), vec!["img/logo.png"]);
    }

    #[test]
    fn test_local_file_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.css");
        fs::write(&path, "body{}").unwrap();
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_300_000_000, 0))
            .unwrap();

        let scanner = LocalScanner::new(PathMapper::new(tmp.path(), ""), FilterSet::default());
        let files: Vec<_> = scanner.scan().collect::<Result<_, _>>().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].absolute_path, path);
        assert_eq!(files[0].size, 6);
        assert_eq!(files[0].mtime.timestamp(), 1_300_000_000);
    }
}
