//! Filedeck Engine - 文件系统动作引擎。
//!
//! 所有来自前端的路径都先经过 [`PathResolver`] 解析与保护检查，
//! 再交给列表、回收站、压缩与批量操作组件执行。

pub mod archive;
pub mod batch;
pub mod capabilities;
pub mod command;
pub mod config;
pub mod error;
pub mod listing;
pub mod mime;
pub mod ops;
pub mod resolver;
pub mod trash;

pub use archive::ArchiveSummary;
pub use batch::{BatchOutcome, BatchResult};
pub use capabilities::{DEFAULT_RECENT_LIMIT, DeleteMode, DownloadTicket, FileSystemCapabilities};
pub use command::{Command, CommandOutput};
pub use config::{ArchiveLimits, EngineConfig};
pub use error::{FsError, FsErrorKind, Result};
pub use listing::{
    Breadcrumb, DirectoryEntry, DirectoryListing, DiskUsageStats, EntryKind, ListOptions,
    SearchOptions, SearchResult,
};
pub use mime::{FileCategory, PreviewClass};
pub use resolver::{PathResolver, ProtectedPathSet, ProtectionScope, ResolvedPath};
pub use trash::{TrashManager, TrashRecord};
