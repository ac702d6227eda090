//! API 错误类型。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use filedeck_api_types::ErrorResponse;
use filedeck_engine::{FsError, FsErrorKind};
use tokio::task::JoinError;
use tracing::{error, warn};

/// API 错误类型。
#[derive(Debug)]
pub struct ApiError {
    message: String,
    code: String,
    status: StatusCode,
}

/// 错误种类到 HTTP 状态码的映射。
fn status_for(kind: FsErrorKind) -> StatusCode {
    match kind {
        FsErrorKind::InvalidPath => StatusCode::BAD_REQUEST,
        FsErrorKind::Protected => StatusCode::FORBIDDEN,
        FsErrorKind::NotFound => StatusCode::NOT_FOUND,
        FsErrorKind::NotADirectory | FsErrorKind::IsADirectory => StatusCode::BAD_REQUEST,
        FsErrorKind::DestinationExists => StatusCode::CONFLICT,
        FsErrorKind::CrossDeviceUnsupported => StatusCode::UNPROCESSABLE_ENTITY,
        FsErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        FsErrorKind::MalformedArchive => StatusCode::UNPROCESSABLE_ENTITY,
        FsErrorKind::PathTraversal => StatusCode::BAD_REQUEST,
        FsErrorKind::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        FsErrorKind::IoFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<FsError> for ApiError {
    fn from(err: FsError) -> Self {
        let kind = err.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            error!(error = %err, "filesystem operation failed");
        } else {
            warn!(error = %err, code = kind.as_str(), "filesystem request rejected");
        }
        ApiError {
            message: err.to_string(),
            code: kind.as_str().to_string(),
            status,
        }
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        error!(error = %err, "blocking filesystem task failed");
        ApiError {
            message: format!("Internal task failure: {err}"),
            code: "INTERNAL_ERROR".to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::from(FsError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            code: self.code,
        });
        (self.status, body).into_response()
    }
}
