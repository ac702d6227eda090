//! 文件系统能力接口。
//!
//! 对外的唯一入口：接收不可信的原始路径，经解析与保护检查后委托给各组件。

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::archive::{self, ArchiveSummary};
use crate::batch::BatchResult;
use crate::config::{ArchiveLimits, EngineConfig};
use crate::error::{FsError, Result};
use crate::listing::{
    self, Breadcrumb, DirectoryEntry, DirectoryListing, DiskUsageStats, ListOptions,
    SearchOptions, SearchResult,
};
use crate::mime::{self, PreviewClass};
use crate::ops::{self, MoveOutcome};
use crate::resolver::{PathResolver, ProtectedPathSet, ResolvedPath};
use crate::trash::{TrashManager, TrashRecord};

/// 最近文件的默认数量。
pub const DEFAULT_RECENT_LIMIT: usize = 30;

/// 删除模式。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// 移入回收站。
    #[default]
    Trash,
    /// 永久删除，仅在显式请求时使用。
    Permanent,
}

impl DeleteMode {
    pub fn from_permanent(permanent: bool) -> Self {
        if permanent { Self::Permanent } else { Self::Trash }
    }
}

/// 下载/预览前的检查结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadTicket {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub class: PreviewClass,
    pub content_type: String,
    /// 为 false 时只能以附件形式强制下载。
    pub inline: bool,
}

struct Inner {
    resolver: PathResolver,
    trash: TrashManager,
    archive_limits: ArchiveLimits,
    show_hidden: bool,
    cross_device_fallback: bool,
}

/// 文件系统能力接口，克隆开销很小。
#[derive(Clone)]
pub struct FileSystemCapabilities {
    inner: Arc<Inner>,
}

impl FileSystemCapabilities {
    /// 按配置创建实例：打开回收站并构造受保护路径集合。
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let trash = TrashManager::open(config.trash_dir(), config.cross_device_fallback)?;

        let root = fs::canonicalize(&config.root).map_err(|err| FsError::from_io(err, &config.root))?;
        let filesystem_root = root.ancestors().last().unwrap_or(root.as_path()).to_path_buf();

        let protected = ProtectedPathSet::builder()
            .exact(&filesystem_root)
            .exact(&root)
            .subtree(config.install_dir())
            .subtree(config.asset_dir())
            .subtree(trash.root())
            .build();
        for path in protected.paths() {
            info!(path = %path.display(), "protected path");
        }

        let resolver = PathResolver::new(&root, protected)?;
        info!(root = %resolver.root().display(), "filesystem engine ready");

        Ok(Self {
            inner: Arc::new(Inner {
                resolver,
                trash,
                archive_limits: config.archive,
                show_hidden: config.show_hidden,
                cross_device_fallback: config.cross_device_fallback,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        self.inner.resolver.root()
    }

    pub fn trash_root(&self) -> &Path {
        self.inner.trash.root()
    }

    /// 配置中的默认 `show_hidden`。
    pub fn default_list_options(&self) -> ListOptions {
        ListOptions {
            show_hidden: self.inner.show_hidden,
            search: None,
        }
    }

    pub fn resolve(&self, raw: &str) -> Result<ResolvedPath> {
        self.inner.resolver.resolve(raw)
    }

    /// 列出目录内容，附带磁盘用量与面包屑。
    pub fn list_directory(&self, raw: &str, options: &ListOptions) -> Result<DirectoryListing> {
        let dir = self.resolve(raw)?;
        listing::list_directory(&dir, self.root(), options)
    }

    pub fn disk_usage(&self, raw: &str) -> Result<DiskUsageStats> {
        let dir = self.resolve(raw)?;
        dir.ensure_exists()?;
        listing::disk_usage(&dir)
    }

    pub fn breadcrumbs(&self, raw: &str) -> Result<Vec<Breadcrumb>> {
        let dir = self.resolve(raw)?;
        Ok(listing::breadcrumbs(&dir, self.root()))
    }

    /// 获取用户主目录（须位于根目录内）。
    pub fn home_directory(&self) -> Option<String> {
        let home = dirs::home_dir()?;
        self.inner
            .resolver
            .resolve_path(&home)
            .ok()
            .map(|p| p.path().display().to_string())
    }

    pub fn common_directories(&self) -> Vec<DirectoryEntry> {
        listing::common_directories(&self.inner.resolver)
    }

    pub fn recent_files(&self, limit: usize) -> Vec<DirectoryEntry> {
        listing::recent_files(&self.inner.resolver, limit)
    }

    pub fn search_files(&self, base: &str, options: &SearchOptions) -> Result<SearchResult> {
        let base = self.resolve(base)?;
        listing::search_files(&base, options)
    }

    /// 复制到 `destination`（完整目标路径）。
    pub fn copy(&self, source: &str, destination: &str, overwrite: bool) -> Result<ResolvedPath> {
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;
        self.copy_resolved(&src, &dst, overwrite)
    }

    /// 移动到 `destination`（完整目标路径）。
    pub fn move_item(&self, source: &str, destination: &str, overwrite: bool) -> Result<ResolvedPath> {
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;
        self.move_resolved(&src, &dst, overwrite)
    }

    /// 在原目录内改名。
    pub fn rename(&self, raw: &str, new_name: &str) -> Result<ResolvedPath> {
        let target = self.resolve(raw)?;
        target.ensure_mutable()?;
        target.ensure_exists()?;

        let parent = target
            .path()
            .parent()
            .ok_or_else(|| FsError::Protected(target.path().to_path_buf()))?;
        let parent = self.inner.resolver.resolve_path(parent)?;
        let dst = self.inner.resolver.resolve_child(&parent, new_name)?;
        dst.ensure_mutable()?;
        if dst.exists_on_disk() {
            return Err(FsError::DestinationExists(dst.path().to_path_buf()));
        }

        fs::rename(target.path(), dst.path()).map_err(|err| FsError::from_io(err, target.path()))?;
        info!(from = %target.path().display(), to = %dst.path().display(), "renamed");
        self.inner.resolver.resolve_path(dst.path())
    }

    pub fn create_folder(&self, parent: &str, name: &str) -> Result<ResolvedPath> {
        let dst = self.child_of_directory(parent, name)?;
        fs::create_dir(dst.path()).map_err(|err| FsError::from_io(err, dst.path()))?;
        info!(path = %dst.path().display(), "created folder");
        self.inner.resolver.resolve_path(dst.path())
    }

    pub fn create_file(&self, parent: &str, name: &str) -> Result<ResolvedPath> {
        let dst = self.child_of_directory(parent, name)?;
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dst.path())
            .map_err(|err| FsError::from_io(err, dst.path()))?;
        info!(path = %dst.path().display(), "created file");
        self.inner.resolver.resolve_path(dst.path())
    }

    /// 删除：默认移入回收站，返回回收站记录；永久删除返回 `None`。
    pub fn delete(&self, raw: &str, mode: DeleteMode) -> Result<Option<TrashRecord>> {
        let target = self.resolve(raw)?;
        self.delete_resolved(&target, mode)
    }

    pub fn batch_delete(&self, targets: &[String], mode: DeleteMode) -> BatchResult {
        let result = BatchResult::run(targets, |raw| self.delete(raw, mode));
        info!(
            total = result.len(),
            succeeded = result.succeeded(),
            ?mode,
            "batch delete finished"
        );
        result
    }

    /// 逐个复制到 `destination_dir` 下的同名路径。
    pub fn batch_copy(&self, targets: &[String], destination_dir: &str, overwrite: bool) -> BatchResult {
        let result = self.batch_transfer(targets, destination_dir, |src, dst| {
            self.copy_resolved(src, dst, overwrite)
        });
        info!(total = result.len(), succeeded = result.succeeded(), "batch copy finished");
        result
    }

    pub fn batch_move(&self, targets: &[String], destination_dir: &str, overwrite: bool) -> BatchResult {
        let result = self.batch_transfer(targets, destination_dir, |src, dst| {
            self.move_resolved(src, dst, overwrite)
        });
        info!(total = result.len(), succeeded = result.succeeded(), "batch move finished");
        result
    }

    pub fn create_archive(&self, sources: &[String], destination: &str) -> Result<ArchiveSummary> {
        let sources = sources
            .iter()
            .map(|raw| self.resolve(raw))
            .collect::<Result<Vec<_>>>()?;
        let destination = self.resolve(destination)?;
        archive::create_archive(&sources, &destination)
    }

    /// 解压；调用方给出的上限只能收紧配置值。
    pub fn extract_archive(
        &self,
        archive_path: &str,
        destination: &str,
        limits: Option<ArchiveLimits>,
    ) -> Result<ArchiveSummary> {
        let archive_path = self.resolve(archive_path)?;
        let destination = self.resolve(destination)?;
        let limits = self.inner.archive_limits.tightened_by(limits);
        archive::extract_archive(&archive_path, &destination, &limits)
    }

    pub fn list_trash(&self) -> Result<Vec<TrashRecord>> {
        self.inner.trash.records()
    }

    /// 恢复回收站记录到其原始路径（重新经过解析与保护检查）。
    pub fn restore(&self, id: &str) -> Result<ResolvedPath> {
        let record = self.inner.trash.find(id)?;
        let destination = self.inner.resolver.resolve_path(&record.original_path)?;
        self.inner.trash.restore(id, &destination)?;
        self.inner.resolver.resolve_path(destination.path())
    }

    pub fn purge_trash(&self) -> Result<usize> {
        self.inner.trash.purge()
    }

    pub fn classify(&self, raw: &str) -> Result<PreviewClass> {
        let target = self.resolve(raw)?;
        mime::classify_preview(&target)
    }

    /// 输出文件字节之前的检查。目录一律拒绝；`Blocked` 只允许附件下载。
    pub fn prepare_download(&self, raw: &str) -> Result<DownloadTicket> {
        let target = self.resolve(raw)?;
        let class = mime::classify_preview(&target)?;
        let size = fs::metadata(target.path())
            .map(|m| m.len())
            .map_err(|err| FsError::from_io(err, target.path()))?;
        Ok(DownloadTicket {
            file_name: target.name(),
            size,
            class,
            content_type: mime::inline_content_type(target.path(), class),
            inline: class.is_inline(),
            path: target.path().to_path_buf(),
        })
    }

    fn child_of_directory(&self, parent: &str, name: &str) -> Result<ResolvedPath> {
        let parent = self.resolve(parent)?;
        parent.ensure_exists()?;
        if !parent.is_dir() {
            return Err(FsError::NotADirectory(parent.path().to_path_buf()));
        }
        let dst = self.inner.resolver.resolve_child(&parent, name)?;
        dst.ensure_mutable()?;
        if dst.exists_on_disk() {
            return Err(FsError::DestinationExists(dst.path().to_path_buf()));
        }
        Ok(dst)
    }

    fn delete_resolved(&self, target: &ResolvedPath, mode: DeleteMode) -> Result<Option<TrashRecord>> {
        target.ensure_mutable()?;
        target.ensure_exists()?;
        match mode {
            DeleteMode::Trash => self.inner.trash.soft_delete(target).map(Some),
            DeleteMode::Permanent => {
                ops::remove_path(target.path()).map_err(|err| FsError::from_io(err, target.path()))?;
                info!(path = %target.path().display(), "permanently deleted");
                Ok(None)
            }
        }
    }

    /// 复制/移动共用的端点检查，不修改磁盘。
    fn prepare_transfer(&self, src: &ResolvedPath, dst: &ResolvedPath, overwrite: bool) -> Result<()> {
        src.ensure_mutable()?;
        dst.ensure_mutable()?;
        src.ensure_exists()?;

        if dst.path().starts_with(src.path()) || src.path().starts_with(dst.path()) {
            return Err(FsError::InvalidPath(format!(
                "{} 与 {} 互相包含",
                src.path().display(),
                dst.path().display()
            )));
        }
        match dst.path().parent() {
            Some(parent) if parent.is_dir() => {}
            Some(parent) => return Err(FsError::NotFound(parent.to_path_buf())),
            None => return Err(FsError::InvalidPath(dst.path().display().to_string())),
        }

        if dst.exists_on_disk() && !overwrite {
            return Err(FsError::DestinationExists(dst.path().to_path_buf()));
        }
        Ok(())
    }

    /// 覆盖时先在暂存区完成复制再替换，失败不会损坏已有目标。
    fn copy_resolved(&self, src: &ResolvedPath, dst: &ResolvedPath, overwrite: bool) -> Result<ResolvedPath> {
        self.prepare_transfer(src, dst, overwrite)?;
        ops::copy_staged(src.path(), dst.path(), overwrite).map_err(|err| match err.kind() {
            std::io::ErrorKind::AlreadyExists => FsError::DestinationExists(dst.path().to_path_buf()),
            _ => FsError::from_io(err, src.path()),
        })?;
        info!(
            from = %src.path().display(),
            to = %dst.path().display(),
            replaced = dst.exists_on_disk(),
            "copied"
        );
        self.inner.resolver.resolve_path(dst.path())
    }

    fn move_resolved(&self, src: &ResolvedPath, dst: &ResolvedPath, overwrite: bool) -> Result<ResolvedPath> {
        self.prepare_transfer(src, dst, overwrite)?;
        let moved = ops::replace_path(dst.path(), || {
            ops::move_path(src.path(), dst.path(), self.inner.cross_device_fallback)
        });
        match moved {
            Ok(outcome) => {
                info!(
                    from = %src.path().display(),
                    to = %dst.path().display(),
                    across_devices = outcome == MoveOutcome::CopiedAcrossDevices,
                    replaced = dst.exists_on_disk(),
                    "moved"
                );
                self.inner.resolver.resolve_path(dst.path())
            }
            Err(err) if err.kind() == std::io::ErrorKind::CrossesDevices => {
                Err(FsError::CrossDeviceUnsupported(src.path().to_path_buf()))
            }
            Err(err) => Err(FsError::from_io(err, src.path())),
        }
    }

    fn destination_dir(&self, raw: &str) -> Result<ResolvedPath> {
        let dir = self.resolve(raw)?;
        dir.ensure_exists()?;
        if !dir.is_dir() {
            return Err(FsError::NotADirectory(dir.path().to_path_buf()));
        }
        Ok(dir)
    }

    fn batch_transfer<F>(&self, targets: &[String], destination_dir: &str, mut op: F) -> BatchResult
    where
        F: FnMut(&ResolvedPath, &ResolvedPath) -> Result<ResolvedPath>,
    {
        BatchResult::run(targets, |raw| {
            let dest_dir = self.destination_dir(destination_dir)?;
            let src = self.resolve(raw)?;
            let dst = self.inner.resolver.resolve_child(&dest_dir, &src.name())?;
            op(&src, &dst)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::error::FsErrorKind;

    fn engine() -> (TempDir, FileSystemCapabilities) {
        let dir = tempdir().expect("create tempdir");
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("app/templates")).expect("create app dir");
        let config = EngineConfig {
            trash_dir: Some(root.join(".trash")),
            install_dir: Some(root.join("app")),
            ..EngineConfig::with_root(&root)
        };
        let engine = FileSystemCapabilities::new(&config).expect("engine should build");
        (dir, engine)
    }

    #[test]
    fn test_copy_and_move_respect_overwrite_flag() {
        let (_dir, fs_engine) = engine();
        let root = fs_engine.root().to_path_buf();
        fs::write(root.join("a.txt"), b"a").expect("write a");
        fs::write(root.join("b.txt"), b"b").expect("write b");

        let err = fs_engine.copy("a.txt", "b.txt", false).expect_err("exists");
        assert_eq!(err.kind(), FsErrorKind::DestinationExists);

        fs_engine.copy("a.txt", "b.txt", true).expect("overwrite copy");
        assert_eq!(fs::read(root.join("b.txt")).expect("read b"), b"a");

        let moved = fs_engine.move_item("a.txt", "c.txt", false).expect("move");
        assert_eq!(moved.path(), root.join("c.txt"));
        assert!(!root.join("a.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_overwrite_copy_keeps_existing_destination() {
        let (_dir, fs_engine) = engine();
        let root = fs_engine.root().to_path_buf();
        fs::create_dir(root.join("src")).expect("create src");
        fs::write(root.join("src/a.txt"), b"a").expect("write a");
        let _listener =
            std::os::unix::net::UnixListener::bind(root.join("src/sock")).expect("bind socket");
        fs::create_dir(root.join("dst")).expect("create dst");
        fs::write(root.join("dst/precious.txt"), b"precious").expect("write precious");

        let err = fs_engine.copy("src", "dst", true).expect_err("socket cannot be copied");
        assert_eq!(err.kind(), FsErrorKind::IoFailure);
        assert_eq!(
            fs::read(root.join("dst/precious.txt")).expect("precious survives"),
            b"precious"
        );
        assert!(!root.join("dst/a.txt").exists());

        let names: Vec<_> = fs::read_dir(&root)
            .expect("read root")
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().all(|name| !name.starts_with(".filedeck-staging-")), "{names:?}");
    }

    #[test]
    fn test_overwrite_move_replaces_directory() {
        let (_dir, fs_engine) = engine();
        let root = fs_engine.root().to_path_buf();
        fs::create_dir(root.join("new")).expect("create new");
        fs::write(root.join("new/fresh.txt"), b"fresh").expect("write fresh");
        fs::create_dir(root.join("old")).expect("create old");
        fs::write(root.join("old/stale.txt"), b"stale").expect("write stale");

        fs_engine.move_item("new", "old", true).expect("overwrite move");
        assert!(!root.join("new").exists());
        assert_eq!(fs::read(root.join("old/fresh.txt")).expect("read fresh"), b"fresh");
        assert!(!root.join("old/stale.txt").exists());
    }

    #[test]
    fn test_copy_directory_into_itself_is_rejected() {
        let (_dir, fs_engine) = engine();
        fs::create_dir_all(fs_engine.root().join("folder")).expect("create folder");

        let err = fs_engine
            .copy("folder", "folder/inner", false)
            .expect_err("self copy");
        assert_eq!(err.kind(), FsErrorKind::InvalidPath);
    }

    #[test]
    fn test_protected_endpoints_are_rejected() {
        let (_dir, fs_engine) = engine();
        fs::write(fs_engine.root().join("a.txt"), b"a").expect("write a");

        let err = fs_engine
            .move_item("app", "moved-app", false)
            .expect_err("install dir is protected");
        assert_eq!(err.kind(), FsErrorKind::Protected);
        assert!(fs_engine.root().join("app").exists());

        let err = fs_engine
            .copy("a.txt", "app/templates/a.txt", false)
            .expect_err("asset dir is protected");
        assert_eq!(err.kind(), FsErrorKind::Protected);

        let err = fs_engine.rename("app", "renamed").expect_err("rename protected");
        assert_eq!(err.kind(), FsErrorKind::Protected);
    }

    #[test]
    fn test_rename_and_create() {
        let (_dir, fs_engine) = engine();
        let root = fs_engine.root().to_path_buf();

        fs_engine.create_folder(".", "docs").expect("create folder");
        fs_engine.create_file("docs", "note.md").expect("create file");
        assert!(root.join("docs/note.md").is_file());

        let err = fs_engine.create_file("docs", "note.md").expect_err("duplicate file");
        assert_eq!(err.kind(), FsErrorKind::DestinationExists);

        let err = fs_engine.create_folder("docs", "../escape").expect_err("bad name");
        assert_eq!(err.kind(), FsErrorKind::InvalidPath);

        let renamed = fs_engine.rename("docs/note.md", "readme.md").expect("rename");
        assert_eq!(renamed.path(), root.join("docs/readme.md"));
        assert!(!root.join("docs/note.md").exists());
    }

    #[test]
    fn test_delete_modes() {
        let (_dir, fs_engine) = engine();
        let root = fs_engine.root().to_path_buf();
        fs::write(root.join("soft.txt"), b"soft").expect("write soft");
        fs::write(root.join("hard.txt"), b"hard").expect("write hard");

        let record = fs_engine
            .delete("soft.txt", DeleteMode::Trash)
            .expect("soft delete")
            .expect("soft delete returns a record");
        assert_eq!(record.original_path, root.join("soft.txt"));

        let none = fs_engine
            .delete("hard.txt", DeleteMode::Permanent)
            .expect("permanent delete");
        assert!(none.is_none());
        assert_eq!(fs_engine.list_trash().expect("list trash").len(), 1);

        let restored = fs_engine.restore(&record.id).expect("restore");
        assert_eq!(fs::read(restored.path()).expect("read restored"), b"soft");
    }

    #[test]
    fn test_batch_copy_preserves_order_and_isolates_failures() {
        let (_dir, fs_engine) = engine();
        let root = fs_engine.root().to_path_buf();
        fs::create_dir(root.join("dest")).expect("create dest");
        fs::write(root.join("one.txt"), b"1").expect("write one");
        fs::write(root.join("two.txt"), b"2").expect("write two");

        let targets = vec![
            "one.txt".to_string(),
            "missing.txt".to_string(),
            "two.txt".to_string(),
        ];
        let result = fs_engine.batch_copy(&targets, "dest", false);

        let kinds: Vec<_> = result.outcomes.iter().map(|o| o.failure_kind()).collect();
        assert_eq!(kinds, vec![None, Some(FsErrorKind::NotFound), None]);
        assert!(root.join("dest/one.txt").exists());
        assert!(root.join("dest/two.txt").exists());

        let result = fs_engine.batch_move(&targets, "nowhere", false);
        assert_eq!(result.len(), 3);
        assert_eq!(result.succeeded(), 0);
        assert!(root.join("one.txt").exists());
    }

    #[test]
    fn test_download_ticket() {
        let (_dir, fs_engine) = engine();
        let root = fs_engine.root().to_path_buf();
        fs::write(root.join("page.html"), b"<script></script>").expect("write html");
        fs::write(root.join("tool.exe"), b"MZ").expect("write exe");

        let html = fs_engine.prepare_download("page.html").expect("ticket for html");
        assert!(html.inline);
        assert_eq!(html.content_type, "text/plain; charset=utf-8");

        fs::write(root.join("x.svg"), b"<svg><script>alert(1)</script></svg>").expect("write svg");
        let svg = fs_engine.prepare_download("x.svg").expect("ticket for svg");
        assert_eq!(svg.class, PreviewClass::Text);
        assert_eq!(svg.content_type, "text/plain; charset=utf-8");

        let exe = fs_engine.prepare_download("tool.exe").expect("ticket for exe");
        assert!(!exe.inline);
        assert_eq!(exe.class, PreviewClass::Blocked);

        let err = fs_engine.prepare_download("app").expect_err("directory download");
        assert_eq!(err.kind(), FsErrorKind::IsADirectory);
    }
}
