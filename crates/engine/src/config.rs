//! 引擎配置，从 TOML 加载。

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
type Result<T> = anyhow::Result<T>;

/// 未配置 `trash_dir` 时，主目录下的回收站目录名。
pub const TRASH_DIR_NAME: &str = ".filedeck-trash";

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// 可访问的根目录，所有路径都必须位于其中。
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// 回收站目录，支持 `~` 前缀。
    #[serde(default)]
    pub trash_dir: Option<PathBuf>,
    /// 程序安装目录，默认为可执行文件所在目录。
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
    /// 静态资源目录，默认为 `install_dir/templates`。
    #[serde(default)]
    pub asset_dir: Option<PathBuf>,
    #[serde(default = "default_show_hidden")]
    pub show_hidden: bool,
    /// 跨设备移动时是否回退为复制后删除。
    #[serde(default = "default_cross_device_fallback")]
    pub cross_device_fallback: bool,
    #[serde(default)]
    pub archive: ArchiveLimits,
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("failed to deserialize engine config")
    }

    /// 以 `root` 为根、其余字段取默认值的配置。
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn trash_dir(&self) -> PathBuf {
        match &self.trash_dir {
            Some(dir) => expand_home(dir),
            None => dirs::home_dir()
                .unwrap_or_else(|| self.root.clone())
                .join(TRASH_DIR_NAME),
        }
    }

    pub fn install_dir(&self) -> PathBuf {
        match &self.install_dir {
            Some(dir) => expand_home(dir),
            None => std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    pub fn asset_dir(&self) -> PathBuf {
        match &self.asset_dir {
            Some(dir) => expand_home(dir),
            None => self.install_dir().join("templates"),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            trash_dir: None,
            install_dir: None,
            asset_dir: None,
            show_hidden: default_show_hidden(),
            cross_device_fallback: default_cross_device_fallback(),
            archive: ArchiveLimits::default(),
        }
    }
}

/// 解压时的上限。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLimits {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_max_total_size")]
    pub max_total_size: u64,
    #[serde(default = "default_max_entry_size")]
    pub max_entry_size: u64,
}

impl ArchiveLimits {
    /// 逐项取较小值：调用方只能收紧，不能放宽。
    pub fn tightened_by(self, other: Option<ArchiveLimits>) -> Self {
        match other {
            Some(other) => Self {
                max_entries: self.max_entries.min(other.max_entries),
                max_total_size: self.max_total_size.min(other.max_total_size),
                max_entry_size: self.max_entry_size.min(other.max_entry_size),
            },
            None => self,
        }
    }
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_total_size: default_max_total_size(),
            max_entry_size: default_max_entry_size(),
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_show_hidden() -> bool {
    true
}

fn default_cross_device_fallback() -> bool {
    true
}

fn default_max_entries() -> usize {
    10_000
}

fn default_max_total_size() -> u64 {
    1024 * 1024 * 1024
}

fn default_max_entry_size() -> u64 {
    512 * 1024 * 1024
}
