//! 回收站管理。
//!
//! 存储布局：`<trash>/files/<slot>` 保存被删除的条目，`<trash>/index.json`
//! 保存槽位到原始路径的映射。同一实例上的所有变更通过互斥锁串行执行。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{FsError, Result};
use crate::ops::{self, MoveOutcome};
use crate::resolver::ResolvedPath;

const FILES_DIR: &str = "files";
const INDEX_FILE: &str = "index.json";

/// 一条回收站记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashRecord {
    /// 槽位名，在回收站内唯一。
    pub id: String,
    /// 删除前的绝对路径。
    pub original_path: PathBuf,
    /// 相对回收站目录的存储路径。
    pub stored_path: PathBuf,
    pub deleted_at: DateTime<Utc>,
    pub is_dir: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrashIndex {
    records: Vec<TrashRecord>,
}

#[derive(Debug)]
pub struct TrashManager {
    root: PathBuf,
    files_dir: PathBuf,
    index_path: PathBuf,
    cross_device_fallback: bool,
    lock: Mutex<()>,
}

impl TrashManager {
    /// 打开（必要时创建）回收站目录。
    pub fn open(root: impl AsRef<Path>, cross_device_fallback: bool) -> Result<Self> {
        let root = root.as_ref();
        let files_dir = root.join(FILES_DIR);
        fs::create_dir_all(&files_dir).map_err(|err| FsError::from_io(err, &files_dir))?;
        let root = fs::canonicalize(root).map_err(|err| FsError::from_io(err, root))?;

        info!(trash = %root.display(), "trash store ready");
        Ok(Self {
            files_dir: root.join(FILES_DIR),
            index_path: root.join(INDEX_FILE),
            root,
            cross_device_fallback,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 将条目移入回收站。
    pub fn soft_delete(&self, target: &ResolvedPath) -> Result<TrashRecord> {
        target.ensure_mutable()?;
        if target.path().starts_with(&self.root) {
            return Err(FsError::Protected(target.path().to_path_buf()));
        }
        target.ensure_exists()?;

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut index = self.load_index()?;

        let id = self.free_slot(&target.name(), &index);
        let slot = self.files_dir.join(&id);
        let is_dir = fs::symlink_metadata(target.path())
            .map(|m| m.is_dir())
            .map_err(|err| FsError::from_io(err, target.path()))?;

        self.move_item(target.path(), &slot)?;

        let record = TrashRecord {
            stored_path: Path::new(FILES_DIR).join(&id),
            id,
            original_path: target.path().to_path_buf(),
            deleted_at: Utc::now(),
            is_dir,
        };
        index.records.push(record.clone());

        if let Err(err) = self.save_index(&index) {
            // 索引写失败时把条目放回原处。
            if let Err(rollback) = ops::move_path(&slot, target.path(), self.cross_device_fallback) {
                warn!(slot = %slot.display(), error = %rollback, "failed to roll back trashed item");
            }
            return Err(err);
        }

        info!(
            original = %record.original_path.display(),
            slot = %record.id,
            "moved to trash"
        );
        Ok(record)
    }

    /// 当前记录，按删除时间排序。
    pub fn records(&self) -> Result<Vec<TrashRecord>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.load_index()?.records;
        records.sort_by(|a, b| a.deleted_at.cmp(&b.deleted_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    pub fn find(&self, id: &str) -> Result<TrashRecord> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_index()?
            .records
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| FsError::NotFound(self.files_dir.join(id)))
    }

    /// 把记录 `id` 恢复到 `destination`（通常是重新解析后的原始路径）。
    pub fn restore(&self, id: &str, destination: &ResolvedPath) -> Result<TrashRecord> {
        destination.ensure_mutable()?;

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut index = self.load_index()?;
        let position = index
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| FsError::NotFound(self.files_dir.join(id)))?;

        if fs::symlink_metadata(destination.path()).is_ok() {
            return Err(FsError::DestinationExists(destination.path().to_path_buf()));
        }
        if let Some(parent) = destination.path().parent() {
            fs::create_dir_all(parent).map_err(|err| FsError::from_io(err, parent))?;
        }

        let record = index.records.remove(position);
        let slot = self.root.join(&record.stored_path);
        self.move_item(&slot, destination.path())?;
        self.save_index(&index)?;

        info!(
            restored = %destination.path().display(),
            slot = %record.id,
            "restored from trash"
        );
        Ok(record)
    }

    /// 永久删除回收站中的一切，返回清除的记录数。
    pub fn purge(&self) -> Result<usize> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let index = self.load_index()?;
        let count = index.records.len();

        let read = fs::read_dir(&self.files_dir).map_err(|err| FsError::from_io(err, &self.files_dir))?;
        for entry in read {
            let entry = entry?;
            ops::remove_path(&entry.path()).map_err(|err| FsError::from_io(err, entry.path()))?;
        }
        self.save_index(&TrashIndex::default())?;

        info!(count, "purged trash");
        Ok(count)
    }

    /// 原名可用时直接使用，否则追加递增后缀 `.1`、`.2`……
    fn free_slot(&self, name: &str, index: &TrashIndex) -> String {
        let taken = |candidate: &str| {
            fs::symlink_metadata(self.files_dir.join(candidate)).is_ok()
                || index.records.iter().any(|r| r.id == candidate)
        };

        let base = if name.is_empty() { "item" } else { name };
        if !taken(base) {
            return base.to_string();
        }
        (1u64..)
            .map(|n| format!("{base}.{n}"))
            .find(|candidate| !taken(candidate.as_str()))
            .unwrap_or_else(|| base.to_string())
    }

    fn move_item(&self, from: &Path, to: &Path) -> Result<()> {
        match ops::move_path(from, to, self.cross_device_fallback) {
            Ok(MoveOutcome::Renamed) => Ok(()),
            Ok(MoveOutcome::CopiedAcrossDevices) => {
                info!(from = %from.display(), to = %to.display(), "moved across devices by copy");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                Err(FsError::CrossDeviceUnsupported(from.to_path_buf()))
            }
            Err(err) => Err(FsError::from_io(err, from)),
        }
    }

    fn load_index(&self) -> Result<TrashIndex> {
        match fs::read_to_string(&self.index_path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|err| {
                FsError::Io(io::Error::new(io::ErrorKind::InvalidData, err))
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(TrashIndex::default()),
            Err(err) => Err(FsError::from_io(err, &self.index_path)),
        }
    }

    fn save_index(&self, index: &TrashIndex) -> Result<()> {
        let raw = serde_json::to_vec_pretty(index)
            .map_err(|err| FsError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))?;
        let tmp = self.index_path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.index_path)?;
        Ok(())
    }
}
