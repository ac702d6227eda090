//! 动作分发。
//!
//! 前端以 JSON 形式提交 [`Command`]，[`FileSystemCapabilities::execute`] 负责路由到具体操作。

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::archive::ArchiveSummary;
use crate::batch::BatchResult;
use crate::capabilities::{DeleteMode, FileSystemCapabilities};
use crate::config::ArchiveLimits;
use crate::error::Result;
use crate::listing::{DirectoryListing, ListOptions};
use crate::resolver::ResolvedPath;
use crate::trash::TrashRecord;

/// 可执行的文件动作。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    List {
        path: String,
        #[serde(default)]
        options: Option<ListOptions>,
    },
    Copy {
        source: String,
        destination: String,
        #[serde(default)]
        overwrite: bool,
    },
    Move {
        source: String,
        destination: String,
        #[serde(default)]
        overwrite: bool,
    },
    Rename {
        path: String,
        new_name: String,
    },
    CreateFolder {
        parent: String,
        name: String,
    },
    CreateFile {
        parent: String,
        name: String,
    },
    Delete {
        path: String,
        #[serde(default)]
        permanent: bool,
    },
    BatchDelete {
        paths: Vec<String>,
        #[serde(default)]
        permanent: bool,
    },
    BatchCopy {
        paths: Vec<String>,
        destination: String,
        #[serde(default)]
        overwrite: bool,
    },
    BatchMove {
        paths: Vec<String>,
        destination: String,
        #[serde(default)]
        overwrite: bool,
    },
    CreateArchive {
        sources: Vec<String>,
        destination: String,
    },
    ExtractArchive {
        archive: String,
        destination: String,
        #[serde(default)]
        limits: Option<ArchiveLimits>,
    },
    ListTrash,
    RestoreTrash {
        id: String,
    },
    PurgeTrash,
}

impl Command {
    /// 命令名，用于日志。
    pub fn name(&self) -> &'static str {
        match self {
            Self::List { .. } => "list",
            Self::Copy { .. } => "copy",
            Self::Move { .. } => "move",
            Self::Rename { .. } => "rename",
            Self::CreateFolder { .. } => "create_folder",
            Self::CreateFile { .. } => "create_file",
            Self::Delete { .. } => "delete",
            Self::BatchDelete { .. } => "batch_delete",
            Self::BatchCopy { .. } => "batch_copy",
            Self::BatchMove { .. } => "batch_move",
            Self::CreateArchive { .. } => "create_archive",
            Self::ExtractArchive { .. } => "extract_archive",
            Self::ListTrash => "list_trash",
            Self::RestoreTrash { .. } => "restore_trash",
            Self::PurgeTrash => "purge_trash",
        }
    }
}

/// 命令执行结果。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CommandOutput {
    Listing(DirectoryListing),
    /// 操作产生或改变的路径。
    Path(String),
    Batch(BatchResult),
    Trashed(TrashRecord),
    TrashRecords(Vec<TrashRecord>),
    Purged { count: usize },
    Archive(ArchiveSummary),
    Done,
}

impl FileSystemCapabilities {
    /// 执行一条命令。批量命令总是返回 `Ok`，单项失败记录在结果中。
    pub fn execute(&self, command: Command) -> Result<CommandOutput> {
        debug!(command = command.name(), "executing command");
        let path_output = |resolved: ResolvedPath| {
            CommandOutput::Path(resolved.path().display().to_string())
        };

        let output = match command {
            Command::List { path, options } => {
                let options = options.unwrap_or_else(|| self.default_list_options());
                CommandOutput::Listing(self.list_directory(&path, &options)?)
            }
            Command::Copy { source, destination, overwrite } => {
                path_output(self.copy(&source, &destination, overwrite)?)
            }
            Command::Move { source, destination, overwrite } => {
                path_output(self.move_item(&source, &destination, overwrite)?)
            }
            Command::Rename { path, new_name } => path_output(self.rename(&path, &new_name)?),
            Command::CreateFolder { parent, name } => {
                path_output(self.create_folder(&parent, &name)?)
            }
            Command::CreateFile { parent, name } => path_output(self.create_file(&parent, &name)?),
            Command::Delete { path, permanent } => {
                match self.delete(&path, DeleteMode::from_permanent(permanent))? {
                    Some(record) => CommandOutput::Trashed(record),
                    None => CommandOutput::Done,
                }
            }
            Command::BatchDelete { paths, permanent } => {
                CommandOutput::Batch(self.batch_delete(&paths, DeleteMode::from_permanent(permanent)))
            }
            Command::BatchCopy { paths, destination, overwrite } => {
                CommandOutput::Batch(self.batch_copy(&paths, &destination, overwrite))
            }
            Command::BatchMove { paths, destination, overwrite } => {
                CommandOutput::Batch(self.batch_move(&paths, &destination, overwrite))
            }
            Command::CreateArchive { sources, destination } => {
                CommandOutput::Archive(self.create_archive(&sources, &destination)?)
            }
            Command::ExtractArchive { archive, destination, limits } => {
                CommandOutput::Archive(self.extract_archive(&archive, &destination, limits)?)
            }
            Command::ListTrash => CommandOutput::TrashRecords(self.list_trash()?),
            Command::RestoreTrash { id } => path_output(self.restore(&id)?),
            Command::PurgeTrash => CommandOutput::Purged {
                count: self.purge_trash()?,
            },
        };
        Ok(output)
    }
}
