//! MIME 分类。
//!
//! 下载与预览前必须先调用 [`classify_preview`]，`Blocked` 的文件不允许内联输出。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, Result};
use crate::resolver::ResolvedPath;

/// 按纯文本预览的源码扩展名。
const TEXT_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "html", "css", "json", "md", "txt", "sh", "toml", "yaml", "yml", "rs",
];

/// 浏览器会执行其中脚本的类型，只能按纯文本预览。
const SCRIPTABLE_MIMES: &[&str] = &["image/svg+xml", "application/xhtml+xml"];

const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "tgz", "zst"];

/// 列表展示用的粗粒度文件分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Image,
    Video,
    Audio,
    Pdf,
    Archive,
    Code,
    File,
}

/// 预览/下载边界上的分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewClass {
    Text,
    Pdf,
    Image,
    OtherWhitelisted,
    Blocked,
}

impl PreviewClass {
    pub fn is_inline(self) -> bool {
        !matches!(self, Self::Blocked)
    }
}

/// 猜测 MIME 类型，未知时为 `application/octet-stream`。
pub fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

pub fn categorize(path: &Path) -> FileCategory {
    let mime = guess_mime(path);
    let ext = extension(path).unwrap_or_default();

    if mime.starts_with("image/") {
        FileCategory::Image
    } else if mime.starts_with("video/") {
        FileCategory::Video
    } else if mime.starts_with("audio/") {
        FileCategory::Audio
    } else if ext == "pdf" {
        FileCategory::Pdf
    } else if ARCHIVE_EXTENSIONS.contains(&ext.as_str()) {
        FileCategory::Archive
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        FileCategory::Code
    } else {
        FileCategory::File
    }
}

/// 按路径名分类，不读取内容。目录直接拒绝。
pub fn classify_preview(path: &ResolvedPath) -> Result<PreviewClass> {
    path.ensure_exists()?;
    if path.is_dir() {
        return Err(FsError::IsADirectory(path.path().to_path_buf()));
    }
    Ok(classify_name(path.path()))
}

fn classify_name(path: &Path) -> PreviewClass {
    let mime = guess_mime(path);
    let ext = extension(path).unwrap_or_default();

    if SCRIPTABLE_MIMES.contains(&mime.as_str()) {
        PreviewClass::Text
    } else if mime.starts_with("image/") {
        PreviewClass::Image
    } else if mime == "application/pdf" {
        PreviewClass::Pdf
    } else if mime.starts_with("text/") || TEXT_EXTENSIONS.contains(&ext.as_str()) {
        PreviewClass::Text
    } else if mime.starts_with("audio/") || mime.starts_with("video/") {
        PreviewClass::OtherWhitelisted
    } else {
        PreviewClass::Blocked
    }
}

/// 内联输出时使用的 Content-Type。文本一律降级为 `text/plain`，避免浏览器渲染 HTML。
pub fn inline_content_type(path: &Path, class: PreviewClass) -> String {
    match class {
        PreviewClass::Text => "text/plain; charset=utf-8".to_string(),
        PreviewClass::Blocked => "application/octet-stream".to_string(),
        _ => guess_mime(path),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_classify_by_name() {
        assert_eq!(classify_name(Path::new("a.png")), PreviewClass::Image);
        assert_eq!(classify_name(Path::new("a.pdf")), PreviewClass::Pdf);
        assert_eq!(classify_name(Path::new("notes.txt")), PreviewClass::Text);
        assert_eq!(classify_name(Path::new("script.py")), PreviewClass::Text);
        assert_eq!(classify_name(Path::new("song.mp3")), PreviewClass::OtherWhitelisted);
        assert_eq!(classify_name(Path::new("tool.exe")), PreviewClass::Blocked);
        assert_eq!(classify_name(Path::new("no_extension")), PreviewClass::Blocked);
    }

    #[test]
    fn test_html_is_served_as_plain_text() {
        let class = classify_name(Path::new("index.html"));
        assert_eq!(class, PreviewClass::Text);
        assert_eq!(
            inline_content_type(Path::new("index.html"), class),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_svg_is_never_served_as_image() {
        for name in ["logo.svg", "LOGO.SVG", "page.xhtml"] {
            let class = classify_name(Path::new(name));
            assert_eq!(class, PreviewClass::Text, "{name}");
            assert_eq!(
                inline_content_type(Path::new(name), class),
                "text/plain; charset=utf-8"
            );
        }
    }

    #[test]
    fn test_categorize() {
        assert_eq!(categorize(Path::new("photo.JPG")), FileCategory::Image);
        assert_eq!(categorize(Path::new("bundle.zip")), FileCategory::Archive);
        assert_eq!(categorize(Path::new("main.rs")), FileCategory::Code);
        assert_eq!(categorize(Path::new("data.bin")), FileCategory::File);
    }
}
