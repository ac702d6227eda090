//! 目录浏览与元数据模块。
//!
//! 提供目录列表、磁盘用量、面包屑、常用目录、最近文件与 glob 搜索。

use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{FsError, Result};
use crate::mime::{FileCategory, categorize, guess_mime};
use crate::resolver::{PathResolver, ResolvedPath};

/// 条目类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Directory,
    File,
}

/// 目录条目，每次调用都从磁盘重新读取。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// 名称。
    pub name: String,
    /// 完整路径。
    pub path: String,
    pub kind: EntryKind,
    /// 文件大小（字节），目录为 0。
    pub size: u64,
    /// 修改时间（Unix 时间戳）。
    pub modified: Option<u64>,
    pub is_hidden: bool,
    pub is_symlink: bool,
    /// MIME 类型，仅对文件有效。
    pub mime: Option<String>,
    pub category: Option<FileCategory>,
    pub extension: Option<String>,
    /// 非隐藏直接子项数量，仅对目录有效。
    pub item_count: Option<usize>,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// 所在卷的磁盘用量。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsageStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub label: String,
    pub path: String,
}

/// 列表选项。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// 是否包含隐藏文件。
    #[serde(default = "default_show_hidden")]
    pub show_hidden: bool,
    /// 名称子串过滤（不区分大小写）。
    #[serde(default)]
    pub search: Option<String>,
}

fn default_show_hidden() -> bool {
    true
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            show_hidden: default_show_hidden(),
            search: None,
        }
    }
}

/// 目录列表结果。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryListing {
    /// 目录路径。
    pub path: String,
    /// 目录名称，根目录为 `Root`。
    pub name: String,
    pub entries: Vec<DirectoryEntry>,
    pub disk_usage: DiskUsageStats,
    pub breadcrumbs: Vec<Breadcrumb>,
}

/// 列出目录内容：目录在前，随后按名称不区分大小写排序。
pub fn list_directory(
    dir: &ResolvedPath,
    root: &Path,
    options: &ListOptions,
) -> Result<DirectoryListing> {
    dir.ensure_exists()?;
    if !dir.is_dir() {
        return Err(FsError::NotADirectory(dir.path().to_path_buf()));
    }

    info!(path = %dir.path().display(), "Listing directory");

    let needle = options
        .search
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let read = fs::read_dir(dir.path()).map_err(|err| FsError::from_io(err, dir.path()))?;
    let mut entries = Vec::new();
    for entry in read.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !options.show_hidden && is_hidden_name(&name) {
            continue;
        }
        if let Some(needle) = &needle {
            if !name.to_lowercase().contains(needle) {
                continue;
            }
        }
        match entry_info(&entry.path()) {
            Ok(info) => entries.push(info),
            Err(err) => debug!(path = %entry.path().display(), error = %err, "skipping unreadable entry"),
        }
    }
    sort_entries(&mut entries);

    Ok(DirectoryListing {
        path: dir.path().display().to_string(),
        name: label_for(dir.path()),
        entries,
        disk_usage: disk_usage(dir)?,
        breadcrumbs: breadcrumbs(dir, root),
    })
}

pub fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by(compare_entries);
}

fn compare_entries(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    a.kind
        .cmp(&b.kind)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// 读取单个路径的条目信息；符号链接按目标分类，悬空链接视为文件。
pub fn entry_info(path: &Path) -> Result<DirectoryEntry> {
    let link_meta = fs::symlink_metadata(path).map_err(|err| FsError::from_io(err, path))?;
    let is_symlink = link_meta.file_type().is_symlink();
    let metadata = if is_symlink {
        fs::metadata(path).unwrap_or(link_meta)
    } else {
        link_meta
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let modified = metadata.modified().ok().and_then(|t| {
        t.duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs())
    });

    let is_dir = metadata.is_dir();
    Ok(DirectoryEntry {
        is_hidden: is_hidden_name(&name),
        name,
        path: path.display().to_string(),
        kind: if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        },
        size: if is_dir { 0 } else { metadata.len() },
        modified,
        is_symlink,
        mime: (!is_dir).then(|| guess_mime(path)),
        category: (!is_dir).then(|| categorize(path)),
        extension: if is_dir {
            None
        } else {
            path.extension().map(|e| e.to_string_lossy().to_lowercase())
        },
        item_count: is_dir.then(|| visible_child_count(path)),
    })
}

fn visible_child_count(path: &Path) -> usize {
    fs::read_dir(path)
        .map(|read| {
            read.flatten()
                .filter(|e| !is_hidden_name(&e.file_name().to_string_lossy()))
                .count()
        })
        .unwrap_or(0)
}

/// 计算所在卷的用量，不递归统计目录大小。
pub fn disk_usage(dir: &ResolvedPath) -> Result<DiskUsageStats> {
    let path = dir.path();
    let total = fs2::total_space(path).map_err(|err| FsError::from_io(err, path))?;
    let free = fs2::free_space(path).map_err(|err| FsError::from_io(err, path))?;
    let available = fs2::available_space(path).map_err(|err| FsError::from_io(err, path))?;
    Ok(DiskUsageStats {
        total,
        used: total.saturating_sub(free),
        free: available,
    })
}

/// 从根目录到 `dir` 的面包屑，根目录在前。
pub fn breadcrumbs(dir: &ResolvedPath, root: &Path) -> Vec<Breadcrumb> {
    let mut crumbs = vec![Breadcrumb {
        label: label_for(root),
        path: root.display().to_string(),
    }];

    let Ok(relative) = dir.path().strip_prefix(root) else {
        return crumbs;
    };

    let mut current = root.to_path_buf();
    for part in relative.iter() {
        current.push(part);
        crumbs.push(Breadcrumb {
            label: part.to_string_lossy().to_string(),
            path: current.display().to_string(),
        });
    }
    crumbs
}

fn label_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "Root".to_string())
}

/// 获取常见目录列表（主目录、桌面、文档等），只保留根目录内存在的目录。
pub fn common_directories(resolver: &PathResolver) -> Vec<DirectoryEntry> {
    let mut candidates = vec![
        ("Home", dirs::home_dir()),
        ("Desktop", dirs::desktop_dir()),
        ("Documents", dirs::document_dir()),
        ("Downloads", dirs::download_dir()),
    ];

    // 项目目录（常见位置）
    let project_dirs: &[&str] = if cfg!(target_os = "macos") {
        &["Projects", "Developer", "workspace", "code"]
    } else if cfg!(target_os = "windows") {
        &["Projects", "source", "code"]
    } else {
        &["Projects", "workspace", "code"]
    };
    if let Some(home) = dirs::home_dir() {
        for name in project_dirs {
            candidates.push((*name, Some(home.join(name))));
        }
    }

    let mut seen = Vec::new();
    let mut out = Vec::new();
    for (label, path) in candidates {
        let Some(path) = path else { continue };
        let Ok(resolved) = resolver.resolve_path(&path) else {
            continue;
        };
        if !resolved.is_dir() || seen.contains(&resolved.path().to_path_buf()) {
            continue;
        }
        if let Ok(mut entry) = entry_info(resolved.path()) {
            entry.name = label.to_string();
            seen.push(resolved.path().to_path_buf());
            out.push(entry);
        }
    }
    out
}

/// 主目录及 Downloads/Documents/Desktop 下最近修改的非隐藏文件。
pub fn recent_files(resolver: &PathResolver, limit: usize) -> Vec<DirectoryEntry> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    let scan = [
        home.clone(),
        home.join("Downloads"),
        home.join("Documents"),
        home.join("Desktop"),
    ];

    let mut files = Vec::new();
    for dir in scan {
        let Ok(resolved) = resolver.resolve_path(&dir) else {
            continue;
        };
        let Ok(read) = fs::read_dir(resolved.path()) else {
            continue;
        };
        for entry in read.flatten() {
            if is_hidden_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            if let Ok(info) = entry_info(&entry.path()) {
                if !info.is_dir() && !info.is_symlink {
                    files.push(info);
                }
            }
        }
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
    files.truncate(limit);
    files
}

/// 文件搜索选项。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    /// 搜索模式（glob 格式）。
    pub pattern: String,
    /// 是否递归搜索。
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    /// 是否包含隐藏文件。
    #[serde(default)]
    pub include_hidden: bool,
    /// 最大搜索深度。
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// 最大结果数量。
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_recursive() -> bool {
    true
}

/// 搜索深度上限，同时是默认值。
pub const MAX_SEARCH_DEPTH: usize = 10;
/// 搜索结果数上限，同时是默认值。
pub const MAX_SEARCH_RESULTS: usize = 100;

impl SearchOptions {
    /// 把深度与结果数收紧到上限以内。
    pub fn bounded(self) -> Self {
        Self {
            max_depth: self.max_depth.min(MAX_SEARCH_DEPTH),
            max_results: self.max_results.min(MAX_SEARCH_RESULTS),
            ..self
        }
    }
}

fn default_max_depth() -> usize {
    MAX_SEARCH_DEPTH
}

fn default_max_results() -> usize {
    MAX_SEARCH_RESULTS
}

/// 搜索结果。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// 匹配的文件列表。
    pub files: Vec<DirectoryEntry>,
    /// 总匹配数（可能被截断）。
    pub total: usize,
    /// 是否被截断。
    pub truncated: bool,
}

/// 在 `base` 下按 glob 搜索。
pub fn search_files(base: &ResolvedPath, options: &SearchOptions) -> Result<SearchResult> {
    base.ensure_exists()?;
    if !base.is_dir() {
        return Err(FsError::NotADirectory(base.path().to_path_buf()));
    }

    info!(base = %base.path().display(), pattern = %options.pattern, "Searching files");

    let pattern = glob::Pattern::new(&options.pattern)
        .map_err(|err| FsError::InvalidPath(format!("无效的 glob 模式 {}: {err}", options.pattern)))?;

    let include_hidden = options.include_hidden;
    let walker = WalkDir::new(base.path())
        .min_depth(1)
        .max_depth(if options.recursive {
            options.max_depth
        } else {
            1
        })
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || include_hidden || !is_hidden_name(&e.file_name().to_string_lossy())
        });

    let mut files = Vec::new();
    let mut total = 0;
    for entry in walker.flatten() {
        let path = entry.path();
        let relative = path.strip_prefix(base.path()).unwrap_or(path);
        if !(pattern.matches_path(relative) || pattern.matches(&entry.file_name().to_string_lossy()))
        {
            continue;
        }
        total += 1;
        if files.len() < options.max_results {
            if let Ok(info) = entry_info(path) {
                files.push(info);
            }
        }
    }

    Ok(SearchResult {
        truncated: total > files.len(),
        files,
        total,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::resolver::ProtectedPathSet;

    fn resolver_for(root: &Path) -> PathResolver {
        PathResolver::new(root, ProtectedPathSet::default()).expect("resolver should build")
    }

    #[test]
    fn test_list_directory_orders_directories_first_case_insensitive() {
        let dir = tempdir().expect("create tempdir");
        fs::write(dir.path().join("b.txt"), b"b").expect("write b");
        fs::create_dir(dir.path().join("A")).expect("create A");
        fs::write(dir.path().join("a.txt"), b"a").expect("write a");
        let resolver = resolver_for(dir.path());
        let target = resolver.resolve(".").expect("resolve root");

        let listing = list_directory(&target, resolver.root(), &ListOptions::default())
            .expect("list directory");
        let names: Vec<_> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "a.txt", "b.txt"]);
        assert_eq!(listing.entries[0].kind, EntryKind::Directory);
        assert_eq!(listing.entries[1].size, 1);
        assert!(listing.disk_usage.total >= listing.disk_usage.used);
    }

    #[test]
    fn test_hidden_and_search_filters() {
        let dir = tempdir().expect("create tempdir");
        fs::write(dir.path().join(".secret"), b"").expect("write hidden");
        fs::write(dir.path().join("Report.pdf"), b"").expect("write report");
        fs::write(dir.path().join("notes.md"), b"").expect("write notes");
        let resolver = resolver_for(dir.path());
        let target = resolver.resolve(".").expect("resolve root");

        let all = list_directory(&target, resolver.root(), &ListOptions::default())
            .expect("list with hidden");
        assert_eq!(all.entries.len(), 3);

        let visible = list_directory(
            &target,
            resolver.root(),
            &ListOptions {
                show_hidden: false,
                search: None,
            },
        )
        .expect("list without hidden");
        assert_eq!(visible.entries.len(), 2);

        let searched = list_directory(
            &target,
            resolver.root(),
            &ListOptions {
                show_hidden: true,
                search: Some("report".to_string()),
            },
        )
        .expect("list with search");
        assert_eq!(searched.entries.len(), 1);
        assert_eq!(searched.entries[0].category, Some(FileCategory::Pdf));
    }

    #[test]
    fn test_list_rejects_files_and_missing_paths() {
        let dir = tempdir().expect("create tempdir");
        fs::write(dir.path().join("file.txt"), b"x").expect("write file");
        let resolver = resolver_for(dir.path());

        let file = resolver.resolve("file.txt").expect("resolve file");
        let err = list_directory(&file, resolver.root(), &ListOptions::default())
            .expect_err("file is not a directory");
        assert!(matches!(err, FsError::NotADirectory(_)));

        let missing = resolver.resolve("missing").expect("resolve missing");
        let err = list_directory(&missing, resolver.root(), &ListOptions::default())
            .expect_err("missing directory");
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[test]
    fn test_breadcrumbs_from_root() {
        let dir = tempdir().expect("create tempdir");
        fs::create_dir_all(dir.path().join("a/b")).expect("create nested");
        let resolver = resolver_for(dir.path());
        let target = resolver.resolve("a/b").expect("resolve nested");

        let crumbs = breadcrumbs(&target, resolver.root());
        assert_eq!(crumbs.len(), 3);
        assert_eq!(crumbs[0].path, resolver.root().display().to_string());
        assert_eq!(crumbs[1].label, "a");
        assert_eq!(crumbs[2].label, "b");
        assert_eq!(crumbs[2].path, target.path().display().to_string());
    }

    #[test]
    fn test_search_options_are_bounded() {
        let options = SearchOptions {
            pattern: "*".to_string(),
            recursive: true,
            include_hidden: false,
            max_depth: usize::MAX,
            max_results: 1_000_000,
        }
        .bounded();
        assert_eq!(options.max_depth, MAX_SEARCH_DEPTH);
        assert_eq!(options.max_results, MAX_SEARCH_RESULTS);

        let narrow = SearchOptions {
            max_depth: 2,
            max_results: 5,
            ..options
        }
        .bounded();
        assert_eq!((narrow.max_depth, narrow.max_results), (2, 5));
    }

    #[test]
    fn test_search_files() {
        let dir = tempdir().expect("create tempdir");
        fs::create_dir_all(dir.path().join("src/nested")).expect("create nested");
        fs::write(dir.path().join("src/lib.rs"), b"").expect("write lib");
        fs::write(dir.path().join("src/nested/mod.rs"), b"").expect("write mod");
        fs::write(dir.path().join("README.md"), b"").expect("write readme");
        let resolver = resolver_for(dir.path());
        let base = resolver.resolve(".").expect("resolve root");

        let options = SearchOptions {
            pattern: "*.rs".to_string(),
            recursive: true,
            include_hidden: false,
            max_depth: 10,
            max_results: 1,
        };
        let result = search_files(&base, &options).expect("search");
        assert_eq!(result.total, 2);
        assert_eq!(result.files.len(), 1);
        assert!(result.truncated);

        let bad = SearchOptions {
            pattern: "[unclosed".to_string(),
            ..options
        };
        let err = search_files(&base, &bad).expect_err("bad pattern");
        assert!(matches!(&err, FsError::InvalidPath(msg) if msg.contains("[unclosed")), "{err:?}");
    }
}
