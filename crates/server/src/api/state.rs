//! 统一的应用状态。

use filedeck_engine::FileSystemCapabilities;

/// 统一的应用状态，包含所有服务共享的数据。
#[derive(Clone)]
pub struct AppState {
    /// 文件系统能力。
    pub filesystem: FileSystemCapabilities,
}

impl AppState {
    /// 创建新的应用状态。
    pub fn new(filesystem: FileSystemCapabilities) -> Self {
        Self { filesystem }
    }
}
