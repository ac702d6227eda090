//! 文件系统 API 路由。
//!
//! 所有引擎调用都是同步的，统一放到 `spawn_blocking` 中执行。

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use filedeck_api_types::{
    HomeResponse, ListQuery, PathQuery, PreviewBlockedResponse, RecentQuery, SearchQuery,
};
use filedeck_engine::{
    Command, CommandOutput, DirectoryEntry, DirectoryListing, DownloadTicket,
    FileSystemCapabilities, ListOptions, SearchOptions, SearchResult, TrashRecord,
};
use tokio_util::io::ReaderStream;
use tracing::info;

use super::error::ApiError;
use super::state::AppState;

/// 创建文件系统 API 路由。
pub fn create_filesystem_router() -> Router<Arc<AppState>> {
    Router::new()
        // 列出目录内容
        .route("/api/fs/list", get(list_directory))
        // 获取主目录
        .route("/api/fs/home", get(get_home_directory))
        // 获取常见目录
        .route("/api/fs/common", get(get_common_directories))
        // 最近修改的文件
        .route("/api/fs/recent", get(get_recent_files))
        // 搜索文件
        .route("/api/fs/search", get(search_files))
        // 回收站记录
        .route("/api/fs/trash", get(list_trash))
        // 内联预览
        .route("/api/fs/preview", get(preview_file))
        // 附件下载
        .route("/api/fs/download", get(download_file))
        // 执行文件动作
        .route("/api/fs/command", post(execute_command))
}

/// 在阻塞线程池上运行引擎调用。
async fn run_blocking<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&FileSystemCapabilities) -> filedeck_engine::Result<T> + Send + 'static,
{
    let filesystem = state.filesystem.clone();
    let result = tokio::task::spawn_blocking(move || op(&filesystem)).await?;
    Ok(result?)
}

/// 列出目录内容。
async fn list_directory(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<DirectoryListing>, ApiError> {
    let defaults = state.filesystem.default_list_options();
    let options = ListOptions {
        show_hidden: query.show_hidden.unwrap_or(defaults.show_hidden),
        search: query.search.filter(|s| !s.is_empty()),
    };
    let listing = run_blocking(&state, move |fs| fs.list_directory(&query.path, &options)).await?;
    Ok(Json(listing))
}

/// 获取用户主目录。
async fn get_home_directory(State(state): State<Arc<AppState>>) -> Json<HomeResponse> {
    Json(HomeResponse {
        path: state.filesystem.home_directory(),
    })
}

/// 获取常见目录列表。
async fn get_common_directories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DirectoryEntry>>, ApiError> {
    let entries = run_blocking(&state, |fs| Ok(fs.common_directories())).await?;
    Ok(Json(entries))
}

async fn get_recent_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<DirectoryEntry>>, ApiError> {
    let entries = run_blocking(&state, move |fs| Ok(fs.recent_files(query.limit))).await?;
    Ok(Json(entries))
}

/// 搜索文件。
async fn search_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResult>, ApiError> {
    let options = search_options(&query);
    let result = run_blocking(&state, move |fs| fs.search_files(&query.base_path, &options)).await?;
    Ok(Json(result))
}

/// 查询参数只能在引擎上限以内收紧搜索范围。
fn search_options(query: &SearchQuery) -> SearchOptions {
    SearchOptions {
        pattern: query.pattern.clone(),
        recursive: query.recursive,
        include_hidden: query.include_hidden,
        max_depth: query.max_depth,
        max_results: query.max_results,
    }
    .bounded()
}

async fn list_trash(State(state): State<Arc<AppState>>) -> Result<Json<Vec<TrashRecord>>, ApiError> {
    let records = run_blocking(&state, |fs| fs.list_trash()).await?;
    Ok(Json(records))
}

/// 执行前端提交的文件动作。
async fn execute_command(
    State(state): State<Arc<AppState>>,
    Json(command): Json<Command>,
) -> Result<Json<CommandOutput>, ApiError> {
    let name = command.name();
    let output = run_blocking(&state, move |fs| fs.execute(command)).await?;
    info!(command = name, "command executed");
    Ok(Json(output))
}

/// 内联预览。`Blocked` 的文件只返回元数据。
async fn preview_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Response, ApiError> {
    let raw = query.path.clone();
    let ticket = run_blocking(&state, move |fs| fs.prepare_download(&raw)).await?;

    if !ticket.inline {
        let body = PreviewBlockedResponse {
            name: ticket.file_name,
            size: ticket.size,
            content_type: ticket.content_type,
            download_url: format!("/api/fs/download?path={}", encode_query(&query.path)),
        };
        return Ok((StatusCode::UNSUPPORTED_MEDIA_TYPE, Json(body)).into_response());
    }

    stream_file(ticket, "inline").await
}

/// 以附件形式下载。
async fn download_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Response, ApiError> {
    let ticket = run_blocking(&state, move |fs| fs.prepare_download(&query.path)).await?;
    stream_file(ticket, "attachment").await
}

async fn stream_file(ticket: DownloadTicket, disposition: &str) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(&ticket.path).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let safe_filename: String = ticket
        .file_name
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, ticket.content_type),
            (header::CONTENT_LENGTH, ticket.size.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("{disposition}; filename=\"{safe_filename}\""),
            ),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        body,
    )
        .into_response())
}

/// 查询参数的百分号编码，保留 unreserved 字符。
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
