use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 文件系统动作引擎的错误类型。
///
/// 每个变体对应一个对外可见的错误种类，由 [`FsError::kind`] 给出。
#[derive(Debug, Error)]
pub enum FsError {
    #[error("非法路径: {0}")]
    InvalidPath(String),

    #[error("受保护的路径: {}", .0.display())]
    Protected(PathBuf),

    #[error("路径不存在: {}", .0.display())]
    NotFound(PathBuf),

    #[error("路径不是目录: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("路径是目录: {}", .0.display())]
    IsADirectory(PathBuf),

    #[error("目标已存在: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("不支持跨文件系统移动: {}", .0.display())]
    CrossDeviceUnsupported(PathBuf),

    #[error("权限不足: {0}")]
    PermissionDenied(String),

    #[error("压缩包格式错误: {0}")]
    MalformedArchive(String),

    #[error("压缩包条目越界: {0}")]
    PathTraversal(String),

    #[error("压缩包超出限制: {0}")]
    TooLarge(String),

    #[error("IO 错误: {0}")]
    Io(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// 对外暴露的错误种类，供请求层映射为状态码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FsErrorKind {
    InvalidPath,
    Protected,
    NotFound,
    NotADirectory,
    IsADirectory,
    DestinationExists,
    CrossDeviceUnsupported,
    PermissionDenied,
    MalformedArchive,
    PathTraversal,
    TooLarge,
    #[serde(rename = "IO_FAILURE")]
    IoFailure,
}

impl FsErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidPath => "INVALID_PATH",
            Self::Protected => "PROTECTED",
            Self::NotFound => "NOT_FOUND",
            Self::NotADirectory => "NOT_A_DIRECTORY",
            Self::IsADirectory => "IS_A_DIRECTORY",
            Self::DestinationExists => "DESTINATION_EXISTS",
            Self::CrossDeviceUnsupported => "CROSS_DEVICE_UNSUPPORTED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::MalformedArchive => "MALFORMED_ARCHIVE",
            Self::PathTraversal => "PATH_TRAVERSAL",
            Self::TooLarge => "TOO_LARGE",
            Self::IoFailure => "IO_FAILURE",
        }
    }
}

impl FsError {
    pub fn kind(&self) -> FsErrorKind {
        match self {
            Self::InvalidPath(_) => FsErrorKind::InvalidPath,
            Self::Protected(_) => FsErrorKind::Protected,
            Self::NotFound(_) => FsErrorKind::NotFound,
            Self::NotADirectory(_) => FsErrorKind::NotADirectory,
            Self::IsADirectory(_) => FsErrorKind::IsADirectory,
            Self::DestinationExists(_) => FsErrorKind::DestinationExists,
            Self::CrossDeviceUnsupported(_) => FsErrorKind::CrossDeviceUnsupported,
            Self::PermissionDenied(_) => FsErrorKind::PermissionDenied,
            Self::MalformedArchive(_) => FsErrorKind::MalformedArchive,
            Self::PathTraversal(_) => FsErrorKind::PathTraversal,
            Self::TooLarge(_) => FsErrorKind::TooLarge,
            Self::Io(_) => FsErrorKind::IoFailure,
        }
    }

    /// 把底层 IO 错误映射到具体种类，`path` 用于错误描述。
    pub fn from_io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.display().to_string()),
            io::ErrorKind::AlreadyExists => Self::DestinationExists(path),
            io::ErrorKind::NotADirectory => Self::NotADirectory(path),
            _ => Self::Io(err),
        }
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            _ => Self::Io(err),
        }
    }
}
