//! 路径解析与保护模块。
//!
//! 所有外部传入的原始路径都必须经过 [`PathResolver::resolve`]，其余组件只接受
//! 已解析的 [`ResolvedPath`]。

use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{FsError, Result};

/// 原始路径的最大字节长度。
pub const MAX_PATH_LEN: usize = 4096;

/// 解析到默认目录（主目录或根目录）的输入。
const DEFAULT_SENTINELS: &[&str] = &["", "~", "undefined"];

/// 经过规范化与包含性检查的绝对路径。
///
/// 只能由 [`PathResolver`] 构造，构造后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
    path: PathBuf,
    is_protected: bool,
    exists_on_disk: bool,
}

impl ResolvedPath {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_protected(&self) -> bool {
        self.is_protected
    }

    pub fn exists_on_disk(&self) -> bool {
        self.exists_on_disk
    }

    /// 文件名，根路径返回空字符串。
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// 变更操作前的保护检查。
    pub fn ensure_mutable(&self) -> Result<()> {
        if self.is_protected {
            Err(FsError::Protected(self.path.clone()))
        } else {
            Ok(())
        }
    }

    pub fn ensure_exists(&self) -> Result<()> {
        if self.exists_on_disk {
            Ok(())
        } else {
            Err(FsError::NotFound(self.path.clone()))
        }
    }

    pub fn is_dir(&self) -> bool {
        self.path.is_dir()
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// 保护范围。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionScope {
    /// 仅精确匹配。
    Exact,
    /// 精确匹配、祖先或后代。
    Subtree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProtectedEntry {
    path: PathBuf,
    scope: ProtectionScope,
}

/// 进程级只读的受保护路径集合，启动时构造一次。
#[derive(Debug, Clone, Default)]
pub struct ProtectedPathSet {
    entries: Vec<ProtectedEntry>,
}

impl ProtectedPathSet {
    pub fn builder() -> ProtectedPathSetBuilder {
        ProtectedPathSetBuilder::default()
    }

    /// 判断路径是否与任一受保护条目重叠。
    pub fn is_protected(&self, path: &Path) -> bool {
        self.entries.iter().any(|entry| match entry.scope {
            ProtectionScope::Exact => path == entry.path,
            ProtectionScope::Subtree => path.starts_with(&entry.path) || entry.path.starts_with(path),
        })
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|entry| entry.path.as_path())
    }
}

#[derive(Debug, Default)]
pub struct ProtectedPathSetBuilder {
    entries: Vec<ProtectedEntry>,
}

impl ProtectedPathSetBuilder {
    pub fn exact(mut self, path: impl AsRef<Path>) -> Self {
        self.push(path.as_ref(), ProtectionScope::Exact);
        self
    }

    pub fn subtree(mut self, path: impl AsRef<Path>) -> Self {
        self.push(path.as_ref(), ProtectionScope::Subtree);
        self
    }

    pub fn build(self) -> ProtectedPathSet {
        ProtectedPathSet {
            entries: self.entries,
        }
    }

    fn push(&mut self, path: &Path, scope: ProtectionScope) {
        // 不存在的条目保留词法规范化结果，之后创建时仍能匹配。
        let path = fs::canonicalize(path).unwrap_or_else(|_| normalize_lexically(path));
        let entry = ProtectedEntry { path, scope };
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }
}

/// 单一的路径校验入口。
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    protected: ProtectedPathSet,
}

impl PathResolver {
    /// `root` 必须存在，会被规范化。
    pub fn new(root: impl AsRef<Path>, protected: ProtectedPathSet) -> Result<Self> {
        let root = root.as_ref();
        let root = fs::canonicalize(root).map_err(|err| FsError::from_io(err, root))?;
        if !root.is_dir() {
            return Err(FsError::NotADirectory(root));
        }
        Ok(Self { root, protected })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn protected(&self) -> &ProtectedPathSet {
        &self.protected
    }

    /// 解析不可信的原始路径。
    ///
    /// 相对路径基于根目录；结果离开根目录子树时返回 `InvalidPath`。
    pub fn resolve(&self, raw: &str) -> Result<ResolvedPath> {
        if raw.contains('\0') {
            return Err(FsError::InvalidPath("路径包含空字节".to_string()));
        }
        if raw.len() > MAX_PATH_LEN {
            return Err(FsError::InvalidPath(format!(
                "路径长度超过 {MAX_PATH_LEN} 字节"
            )));
        }

        if DEFAULT_SENTINELS.contains(&raw) {
            return self.resolve_default();
        }

        let candidate = Path::new(raw);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };
        self.resolve_absolute(&normalize_lexically(&joined), raw)
    }

    /// 解析 `parent` 目录下的单个名称。
    pub fn resolve_child(&self, parent: &ResolvedPath, name: &str) -> Result<ResolvedPath> {
        validate_name(name)?;
        self.resolve_absolute(&parent.path.join(name), name)
    }

    /// 对已是绝对路径的值重新解析，例如回收站记录里的原始路径。
    pub fn resolve_path(&self, path: &Path) -> Result<ResolvedPath> {
        if !path.is_absolute() {
            return Err(FsError::InvalidPath(path.display().to_string()));
        }
        self.resolve_absolute(&normalize_lexically(path), &path.display().to_string())
    }

    fn resolve_default(&self) -> Result<ResolvedPath> {
        if let Some(home) = dirs::home_dir().filter(|home| home.is_dir()) {
            match self.resolve_absolute(&home, "~") {
                Ok(resolved) => return Ok(resolved),
                Err(err) => debug!(home = %home.display(), error = %err, "home outside root, using root"),
            }
        }
        self.resolve_absolute(&self.root.clone(), "")
    }

    fn resolve_absolute(&self, normalized: &Path, raw: &str) -> Result<ResolvedPath> {
        let path = match (normalized.parent(), normalized.file_name()) {
            (Some(parent), Some(name)) => {
                let parent = canonicalize_existing_prefix(parent)
                    .map_err(|_| FsError::InvalidPath(raw.to_string()))?;
                parent.join(name)
            }
            _ => fs::canonicalize(normalized).map_err(|_| FsError::InvalidPath(raw.to_string()))?,
        };

        if !path.starts_with(&self.root) {
            return Err(FsError::InvalidPath(raw.to_string()));
        }

        let metadata = fs::symlink_metadata(&path).ok();
        let mut is_protected = self.protected.is_protected(&path);
        if metadata.as_ref().is_some_and(|m| m.file_type().is_symlink()) {
            // 悬空链接作用于链接本身；可解析的目标必须仍在根目录内，
            // 且指向受保护路径的链接同样受保护。
            if let Ok(target) = fs::canonicalize(&path) {
                if !target.starts_with(&self.root) {
                    return Err(FsError::InvalidPath(raw.to_string()));
                }
                is_protected = is_protected || self.protected.is_protected(&target);
            }
        }

        Ok(ResolvedPath {
            is_protected,
            exists_on_disk: metadata.is_some(),
            path,
        })
    }
}

/// 校验单个文件名：非空、不含分隔符、不是 `.` 或 `..`。
pub fn validate_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None)
            if part == name && !name.contains('\0') && !name.contains(['/', '\\']) =>
        {
            Ok(())
        }
        _ => Err(FsError::InvalidPath(format!("非法名称: {name:?}"))),
    }
}

/// 纯词法地消除 `.` 与 `..`，不访问磁盘。
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// 规范化最长的已存在前缀，再拼回其余（已词法规范化的）部分。
fn canonicalize_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<OsString> = Vec::new();
    while fs::symlink_metadata(&existing).is_err() {
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                existing.pop();
            }
            None => break,
        }
    }

    // 中间的悬空链接会在这里失败。
    let mut canonical = fs::canonicalize(&existing)?;
    for part in tail.into_iter().rev() {
        canonical.push(part);
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::*;
    use crate::error::FsErrorKind;

    fn resolver_for(root: &Path) -> PathResolver {
        let protected = ProtectedPathSet::builder()
            .exact(root)
            .subtree(root.join(".trash"))
            .build();
        PathResolver::new(root, protected).expect("resolver should build")
    }

    #[test]
    fn test_relative_and_absolute_inputs_resolve_inside_root() {
        let dir = tempdir().expect("create tempdir");
        fs::create_dir(dir.path().join("docs")).expect("create docs");
        let resolver = resolver_for(dir.path());

        let relative = resolver.resolve("docs").expect("relative path resolves");
        assert_eq!(relative.path(), resolver.root().join("docs"));
        assert!(relative.exists_on_disk());
        assert!(!relative.is_protected());

        let absolute = resolver
            .resolve(&resolver.root().join("docs/./new.txt").display().to_string())
            .expect("absolute path resolves");
        assert_eq!(absolute.path(), resolver.root().join("docs/new.txt"));
        assert!(!absolute.exists_on_disk());
    }

    #[test]
    fn test_traversal_outside_root_is_rejected() {
        let dir = tempdir().expect("create tempdir");
        let root = dir.path().join("root");
        fs::create_dir(&root).expect("create root");
        let resolver = resolver_for(&root);

        for raw in ["..", "../outside", "docs/../../outside", "/etc/passwd"] {
            let err = resolver.resolve(raw).expect_err("escape should fail");
            assert_eq!(err.kind(), FsErrorKind::InvalidPath, "input {raw:?}");
        }

        let inside = resolver.resolve("a/../b").expect("inner dotdot is fine");
        assert_eq!(inside.path(), resolver.root().join("b"));
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        let dir = tempdir().expect("create tempdir");
        let resolver = resolver_for(dir.path());

        let err = resolver.resolve("bad\0name").expect_err("null byte should fail");
        assert_eq!(err.kind(), FsErrorKind::InvalidPath);

        let long = "a".repeat(MAX_PATH_LEN + 1);
        let err = resolver.resolve(&long).expect_err("long input should fail");
        assert_eq!(err.kind(), FsErrorKind::InvalidPath);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_root_is_rejected() {
        let dir = tempdir().expect("create tempdir");
        let root = dir.path().join("root");
        let outside = dir.path().join("outside");
        fs::create_dir(&root).expect("create root");
        fs::create_dir(&outside).expect("create outside");
        std::os::unix::fs::symlink(&outside, root.join("escape")).expect("create symlink");
        let resolver = resolver_for(&root);

        let err = resolver.resolve("escape").expect_err("link target outside root");
        assert_eq!(err.kind(), FsErrorKind::InvalidPath);

        let err = resolver
            .resolve("escape/file.txt")
            .expect_err("path through link outside root");
        assert_eq!(err.kind(), FsErrorKind::InvalidPath);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_protected_directory_is_protected() {
        let dir = tempdir().expect("create tempdir");
        fs::create_dir_all(dir.path().join(".trash/files")).expect("create trash");
        fs::create_dir(dir.path().join("plain")).expect("create plain");
        std::os::unix::fs::symlink(dir.path().join(".trash/files"), dir.path().join("shortcut"))
            .expect("create symlink");
        std::os::unix::fs::symlink(dir.path().join("plain"), dir.path().join("alias"))
            .expect("create symlink");
        let resolver = resolver_for(dir.path());

        let link = resolver.resolve("shortcut").expect("link resolves");
        assert!(link.is_protected());
        assert_eq!(link.ensure_mutable().expect_err("link is protected").kind(), FsErrorKind::Protected);
        assert!(resolver.resolve("shortcut/x").expect("through link").is_protected());
        assert!(!resolver.resolve("alias").expect("plain link").is_protected());
    }

    #[test]
    fn test_protected_classification() {
        let dir = tempdir().expect("create tempdir");
        fs::create_dir_all(dir.path().join(".trash/files")).expect("create trash");
        let resolver = resolver_for(dir.path());

        assert!(resolver.resolve("").is_ok());
        assert!(resolver.resolve(".").expect("root").is_protected());
        assert!(resolver.resolve(".trash").expect("trash").is_protected());
        assert!(resolver.resolve(".trash/files/x").expect("inside trash").is_protected());
        assert!(!resolver.resolve("regular").expect("regular").is_protected());
    }

    #[test]
    fn test_default_sentinels_resolve_inside_root() {
        let dir = tempdir().expect("create tempdir");
        let resolver = resolver_for(dir.path());

        for raw in ["", "~", "undefined"] {
            let resolved = resolver.resolve(raw).expect("sentinel resolves");
            assert!(resolved.path().starts_with(resolver.root()));
        }
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("report.txt").is_ok());
        for bad in ["", ".", "..", "a/b", "/abs", "a\\b"] {
            assert!(validate_name(bad).is_err(), "name {bad:?}");
        }
    }
}
