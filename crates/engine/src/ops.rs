//! 底层文件系统原语：递归复制、删除、带跨设备回退的移动。
//!
//! 这些函数不做任何保护检查，调用方必须先完成解析与校验。

use std::fs;
use std::io;
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

/// 递归复制文件或目录。符号链接在 unix 上按链接复制。
pub fn copy_recursive(src: &Path, dest: &Path) -> io::Result<u64> {
    let meta = fs::symlink_metadata(src)?;
    if !meta.is_dir() {
        return copy_single(src, dest, &meta);
    }

    let mut copied = 0u64;
    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|err| io::Error::other(err.to_string()))?;
        let target = dest.join(relative);
        let meta = entry.path().symlink_metadata()?;
        if meta.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            copied += copy_single(entry.path(), &target, &meta)?;
        }
    }
    Ok(copied)
}

fn copy_single(src: &Path, dest: &Path, meta: &fs::Metadata) -> io::Result<u64> {
    if meta.file_type().is_symlink() {
        return copy_symlink(src, dest);
    }
    fs::copy(src, dest)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<u64> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dest)?;
    Ok(0)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<u64> {
    fs::copy(src, dest)
}

/// 删除文件、链接或整个目录，不跟随符号链接。
pub fn remove_path(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// 暂存目录与备份目录的前缀。
const STAGING_PREFIX: &str = ".filedeck-staging-";

/// 移动结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Renamed,
    CopiedAcrossDevices,
}

/// 原子 rename；跨设备时可回退为 [`copy_then_remove`]。
pub fn move_path(src: &Path, dest: &Path, allow_fallback: bool) -> io::Result<MoveOutcome> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(MoveOutcome::Renamed),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices && allow_fallback => {
            copy_then_remove(src, dest)
        }
        Err(err) => Err(err),
    }
}

/// 复制后删除源。复制失败时删除不完整的目标并保留源，返回复制错误。
pub fn copy_then_remove(src: &Path, dest: &Path) -> io::Result<MoveOutcome> {
    if let Err(copy_err) = copy_recursive(src, dest) {
        if fs::symlink_metadata(dest).is_ok() {
            if let Err(cleanup) = remove_path(dest) {
                warn!(dest = %dest.display(), error = %cleanup, "failed to remove partial copy");
            }
        }
        return Err(copy_err);
    }
    remove_path(src)?;
    Ok(MoveOutcome::CopiedAcrossDevices)
}

/// 先复制到 `dest` 同目录下的暂存区，完整后再放到 `dest`。
///
/// `replace` 为真时整体替换已有的 `dest`；任何一步失败 `dest` 都保持原样。
pub fn copy_staged(src: &Path, dest: &Path, replace: bool) -> io::Result<u64> {
    if !replace && fs::symlink_metadata(dest).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", dest.display()),
        ));
    }

    let staging = staging_dir(dest)?;
    let staged = staging.path().join("copy");
    let result = copy_recursive(src, &staged)
        .and_then(|copied| replace_path(dest, || fs::rename(&staged, dest)).map(|()| copied));
    if let Err(cleanup) = staging.close() {
        warn!(dest = %dest.display(), error = %cleanup, "failed to remove copy staging dir");
    }
    result
}

/// 在 `dest` 上执行 `op`。`dest` 已存在时先移到同目录的备份位置：
/// `op` 成功则删除备份，失败则放回原处。
pub fn replace_path<T>(dest: &Path, op: impl FnOnce() -> io::Result<T>) -> io::Result<T> {
    if fs::symlink_metadata(dest).is_err() {
        return op();
    }

    let backup_dir = staging_dir(dest)?;
    let backup = backup_dir.path().join("previous");
    fs::rename(dest, &backup)?;

    match op() {
        Ok(value) => {
            if let Err(cleanup) = backup_dir.close() {
                warn!(dest = %dest.display(), error = %cleanup, "failed to remove replaced destination");
            }
            Ok(value)
        }
        Err(err) => {
            if let Err(restore) = fs::rename(&backup, dest) {
                let kept = backup_dir.keep();
                warn!(
                    dest = %dest.display(),
                    backup = %kept.display(),
                    error = %restore,
                    "failed to restore replaced destination"
                );
            }
            Err(err)
        }
    }
}

fn staging_dir(dest: &Path) -> io::Result<tempfile::TempDir> {
    let parent = dest
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"))?;
    tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir_in(parent)
}
