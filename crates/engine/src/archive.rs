//! zip 压缩与解压。
//!
//! 解压把压缩包当作不可信输入：写入任何内容之前先校验全部条目路径与声明大小，
//! 解压时再按实际字节数复核上限，并先解压到暂存目录，全部成功后才移入目标目录。

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::ArchiveLimits;
use crate::error::{FsError, Result};
use crate::ops;
use crate::resolver::ResolvedPath;

const SYMLINK_MODE: u32 = 0o120000;
const FILE_TYPE_MASK: u32 = 0o170000;

/// 压缩或解压的结果摘要。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    /// 条目数量（含目录）。
    pub entries: usize,
    /// 未压缩的总字节数。
    pub bytes: u64,
    /// 顶层条目：压缩时为包内名称，解压时为落盘后的绝对路径。
    pub top_level: Vec<PathBuf>,
}

struct SourceItem {
    source: PathBuf,
    name: String,
    is_dir: bool,
}

/// 把 `sources` 打包为 `destination`。
///
/// 单个源以自身名称作为顶层条目；多个源统一放在以压缩包文件名（去扩展名）命名的目录下。
pub fn create_archive(sources: &[ResolvedPath], destination: &ResolvedPath) -> Result<ArchiveSummary> {
    destination.ensure_mutable()?;
    if destination.exists_on_disk() {
        return Err(FsError::DestinationExists(destination.path().to_path_buf()));
    }
    if sources.is_empty() {
        return Err(FsError::InvalidPath("没有需要压缩的源".to_string()));
    }
    let parent = destination
        .path()
        .parent()
        .ok_or_else(|| FsError::InvalidPath(destination.path().display().to_string()))?;
    if !parent.is_dir() {
        return Err(FsError::NotFound(parent.to_path_buf()));
    }

    let prefix = if sources.len() > 1 {
        let stem = destination
            .path()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "archive".to_string());
        Some(stem)
    } else {
        None
    };

    let items = collect_sources(sources, prefix.as_deref())?;
    let top_level: Vec<PathBuf> = match &prefix {
        Some(stem) => vec![PathBuf::from(stem)],
        None => sources.iter().map(|s| PathBuf::from(s.name())).collect(),
    };

    let tmp = tempfile::Builder::new()
        .prefix(".filedeck-")
        .suffix(".zip.partial")
        .tempfile_in(parent)
        .map_err(|err| FsError::from_io(err, parent))?;

    let mut writer = ZipWriter::new(tmp.as_file());
    let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut bytes = 0u64;

    if let Some(stem) = &prefix {
        writer
            .add_directory(format!("{stem}/"), base)
            .map_err(zip_write_error)?;
    }
    for item in &items {
        if item.is_dir {
            writer
                .add_directory(format!("{}/", item.name), base)
                .map_err(zip_write_error)?;
            continue;
        }
        let mut src = File::open(&item.source).map_err(|err| FsError::from_io(err, &item.source))?;
        let len = src.metadata().map(|m| m.len()).unwrap_or(0);
        let options = base.large_file(len >= u64::from(u32::MAX));
        writer
            .start_file(item.name.clone(), options)
            .map_err(zip_write_error)?;
        bytes += io::copy(&mut src, &mut writer).map_err(|err| FsError::from_io(err, &item.source))?;
    }
    writer.finish().map_err(zip_write_error)?;

    tmp.persist_noclobber(destination.path()).map_err(|err| {
        if err.error.kind() == io::ErrorKind::AlreadyExists {
            FsError::DestinationExists(destination.path().to_path_buf())
        } else {
            FsError::from_io(err.error, destination.path())
        }
    })?;

    let summary = ArchiveSummary {
        entries: items.len() + usize::from(prefix.is_some()),
        bytes,
        top_level,
    };
    info!(
        archive = %destination.path().display(),
        entries = summary.entries,
        bytes = summary.bytes,
        "created archive"
    );
    Ok(summary)
}

fn collect_sources(sources: &[ResolvedPath], prefix: Option<&str>) -> Result<Vec<SourceItem>> {
    let mut names = BTreeSet::new();
    let mut items = Vec::new();

    for source in sources {
        source.ensure_exists()?;
        let name = source.name();
        if name.is_empty() || !names.insert(name.clone()) {
            return Err(FsError::InvalidPath(format!("重复或无效的源名称: {name:?}")));
        }
        let anchor = source.path().parent().unwrap_or(source.path());

        for entry in WalkDir::new(source.path()).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|err| FsError::Io(io::Error::from(err)))?;
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                debug!(path = %entry.path().display(), "skipping symlink while archiving");
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(anchor)
                .map_err(|_| FsError::InvalidPath(entry.path().display().to_string()))?;
            let mut name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            if let Some(prefix) = prefix {
                name = format!("{prefix}/{name}");
            }
            items.push(SourceItem {
                source: entry.path().to_path_buf(),
                name,
                is_dir: file_type.is_dir(),
            });
        }
    }
    Ok(items)
}

struct PlannedEntry {
    index: usize,
    relative: PathBuf,
    is_dir: bool,
}

/// 把 `archive` 解压到 `destination` 目录，全部成功或不留痕迹。
pub fn extract_archive(
    archive: &ResolvedPath,
    destination: &ResolvedPath,
    limits: &ArchiveLimits,
) -> Result<ArchiveSummary> {
    destination.ensure_mutable()?;
    destination.ensure_exists()?;
    if !destination.is_dir() {
        return Err(FsError::NotADirectory(destination.path().to_path_buf()));
    }
    archive.ensure_exists()?;
    if archive.is_dir() {
        return Err(FsError::IsADirectory(archive.path().to_path_buf()));
    }

    let file = File::open(archive.path()).map_err(|err| FsError::from_io(err, archive.path()))?;
    let mut zip = ZipArchive::new(file).map_err(zip_read_error)?;

    if zip.len() > limits.max_entries {
        return Err(FsError::TooLarge(format!(
            "条目数 {} 超过上限 {}",
            zip.len(),
            limits.max_entries
        )));
    }

    let plan = plan_extraction(&mut zip, limits)?;

    let top_level: BTreeSet<PathBuf> = plan
        .iter()
        .filter_map(|p| p.relative.components().next())
        .map(|c| PathBuf::from(c.as_os_str()))
        .collect();
    for name in &top_level {
        let target = destination.path().join(name);
        if fs::symlink_metadata(&target).is_ok() {
            return Err(FsError::DestinationExists(target));
        }
    }

    let staging = tempfile::Builder::new()
        .prefix(".filedeck-extract-")
        .tempdir_in(destination.path())
        .map_err(|err| FsError::from_io(err, destination.path()))?;

    let bytes = inflate_all(&mut zip, &plan, staging.path(), limits)?;
    let moved = commit_staged(staging.path(), destination.path(), &top_level)?;

    let summary = ArchiveSummary {
        entries: plan.len(),
        bytes,
        top_level: moved,
    };
    info!(
        archive = %archive.path().display(),
        destination = %destination.path().display(),
        entries = summary.entries,
        bytes = summary.bytes,
        "extracted archive"
    );
    Ok(summary)
}

/// 校验全部条目的路径、类型与声明大小，不写磁盘。
fn plan_extraction(zip: &mut ZipArchive<File>, limits: &ArchiveLimits) -> Result<Vec<PlannedEntry>> {
    let mut plan = Vec::with_capacity(zip.len());
    let mut declared_total = 0u64;

    for index in 0..zip.len() {
        let entry = zip.by_index_raw(index).map_err(zip_read_error)?;
        let name = entry.name().to_string();

        if entry
            .unix_mode()
            .is_some_and(|mode| mode & FILE_TYPE_MASK == SYMLINK_MODE)
        {
            return Err(FsError::PathTraversal(format!("符号链接条目: {name}")));
        }

        let Some(relative) = sanitize_entry_path(&name)? else {
            continue;
        };

        let size = entry.size();
        if size > limits.max_entry_size {
            return Err(FsError::TooLarge(format!(
                "条目 {name} 大小 {size} 超过上限 {}",
                limits.max_entry_size
            )));
        }
        declared_total = declared_total.saturating_add(size);
        if declared_total > limits.max_total_size {
            return Err(FsError::TooLarge(format!(
                "解压总大小超过上限 {}",
                limits.max_total_size
            )));
        }

        plan.push(PlannedEntry {
            index,
            relative,
            is_dir: entry.is_dir(),
        });
    }
    Ok(plan)
}

/// 条目路径只允许普通组件；`..`、绝对路径与盘符前缀视为越界。
/// 清理后为空（如 `./`）的条目返回 `None`。
fn sanitize_entry_path(name: &str) -> Result<Option<PathBuf>> {
    let normalized = name.replace('\\', "/");
    let mut clean = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FsError::PathTraversal(name.to_string()));
            }
        }
    }
    Ok((!clean.as_os_str().is_empty()).then_some(clean))
}

fn inflate_all(
    zip: &mut ZipArchive<File>,
    plan: &[PlannedEntry],
    staging: &Path,
    limits: &ArchiveLimits,
) -> Result<u64> {
    let mut written_total = 0u64;

    for planned in plan {
        let target = staging.join(&planned.relative);
        if planned.is_dir {
            fs::create_dir_all(&target).map_err(|err| FsError::from_io(err, &target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| FsError::from_io(err, parent))?;
        }

        let mut entry = zip.by_index(planned.index).map_err(zip_read_error)?;
        let mut out = File::create_new(&target).map_err(|err| {
            if err.kind() == io::ErrorKind::AlreadyExists {
                FsError::MalformedArchive(format!("重复条目: {}", entry.name()))
            } else {
                FsError::from_io(err, &target)
            }
        })?;

        let allowance = limits
            .max_entry_size
            .min(limits.max_total_size.saturating_sub(written_total));
        let mut limited = (&mut entry).take(allowance.saturating_add(1));
        let written = io::copy(&mut limited, &mut out).map_err(|err| {
            if err.kind() == io::ErrorKind::InvalidData {
                FsError::MalformedArchive(err.to_string())
            } else {
                FsError::from_io(err, &target)
            }
        })?;
        if written > allowance {
            return Err(FsError::TooLarge(format!(
                "条目 {} 实际解压大小超过上限",
                planned.relative.display()
            )));
        }
        written_total += written;
    }
    Ok(written_total)
}

/// 把暂存的顶层条目逐个 rename 到目标目录；中途失败则撤回已移动的条目。
fn commit_staged(staging: &Path, destination: &Path, top_level: &BTreeSet<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut moved: Vec<PathBuf> = Vec::with_capacity(top_level.len());

    for name in top_level {
        let target = destination.join(name);
        let result = if fs::symlink_metadata(&target).is_ok() {
            Err(FsError::DestinationExists(target.clone()))
        } else {
            fs::rename(staging.join(name), &target).map_err(|err| FsError::from_io(err, &target))
        };

        if let Err(err) = result {
            for done in &moved {
                if let Err(cleanup) = ops::remove_path(done) {
                    warn!(path = %done.display(), error = %cleanup, "failed to roll back extracted entry");
                }
            }
            return Err(err);
        }
        moved.push(target);
    }
    Ok(moved)
}

fn zip_read_error(err: ZipError) -> FsError {
    match err {
        ZipError::Io(err) if err.kind() == io::ErrorKind::PermissionDenied => FsError::from(err),
        other => FsError::MalformedArchive(other.to_string()),
    }
}

fn zip_write_error(err: ZipError) -> FsError {
    match err {
        ZipError::Io(err) => FsError::Io(err),
        other => FsError::Io(io::Error::other(other.to_string())),
    }
}
