//! HTTP エラー - PipelineError をステータスコードと JSON エンベロープに変換する

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use heicflow_core::domain::{ErrorKind, PipelineError, ValidationError};

pub const CONVERSION_FAILED: &str = "Failed to convert image. Please ensure it's a valid HEIC file.";
pub const DOWNLOAD_FAILED: &str = "Download failed";
pub const ROUTE_NOT_FOUND: &str = "Route not found";
pub const INTERNAL_ERROR: &str = "Internal server error";
pub const NO_FILE_UPLOADED: &str = "No file uploaded.";
pub const NOT_HEIC: &str = "Please upload a HEIC file.";
pub const FILE_TOO_LARGE: &str = "File too large.";

/// どのエンドポイントで失敗したか
///
/// 同じ StorageError でも、アップロード中なら 400、ダウンロード中なら 500 になる。
/// 保存済みオブジェクトが見つからない場合だけは参照系で 404。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Processed,
    Download,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl AppError {
    /// `expose` が false なら想定外エラーの詳細は隠す
    pub fn from_pipeline(stage: Stage, err: &PipelineError, expose: bool) -> Self {
        match err {
            PipelineError::Validation(v) => AppError::BadRequest(validation_message(v).to_string()),
            PipelineError::JobNotFound(_) => AppError::NotFound(image_not_found(stage)),
            _ if err.kind() == ErrorKind::NotFound && stage != Stage::Upload => {
                AppError::NotFound(image_not_found(stage))
            }
            _ if err.kind() == ErrorKind::Credential => AppError::Internal(detail(err, expose)),
            _ => match stage {
                Stage::Upload => AppError::BadRequest(CONVERSION_FAILED.to_string()),
                Stage::Download => AppError::Internal(DOWNLOAD_FAILED.to_string()),
                Stage::Processed => AppError::Internal(detail(err, expose)),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::BadRequest(msg) | AppError::NotFound(msg) | AppError::Internal(msg) => msg,
        }
    }
}

fn image_not_found(stage: Stage) -> String {
    match stage {
        Stage::Processed => "Image not found.".to_string(),
        _ => "Image not found".to_string(),
    }
}

fn validation_message(err: &ValidationError) -> &'static str {
    match err {
        ValidationError::MissingFile => NO_FILE_UPLOADED,
        ValidationError::NotHeic { .. } => NOT_HEIC,
        ValidationError::TooLarge { .. } => FILE_TOO_LARGE,
    }
}

fn detail(err: &PipelineError, expose: bool) -> String {
    if expose {
        err.to_string()
    } else {
        INTERNAL_ERROR.to_string()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "success": false, "error": self.message() });
        (self.status(), Json(body)).into_response()
    }
}
