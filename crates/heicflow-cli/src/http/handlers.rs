use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use heicflow_core::domain::{
    ProcessedView, UploadReceipt, UploadRequest, ValidationError, has_heic_extension,
};
use serde::Serialize;

use super::AppState;
use super::error::{AppError, FILE_TOO_LARGE, NO_FILE_UPLOADED, ROUTE_NOT_FOUND, Stage};

/// アップロードフォームのフィールド名
pub const UPLOAD_FIELD: &str = "image";

const INDEX_HTML: &str = include_str!("../../assets/index.html");

/// 成功時のエンベロープ `{success: true, ...}`
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

impl<T> Success<T> {
    fn new(body: T) -> Json<Self> {
        Json(Self {
            success: true,
            body,
        })
    }
}

pub async fn index() -> Html<&'static str> {
    tracing::debug!("serving upload page");
    Html(INDEX_HTML)
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Success<UploadReceipt>>, AppError> {
    let request = read_upload(&state, multipart).await?;

    let receipt = state
        .orchestrator
        .handle_upload(request)
        .await
        .map_err(|e| state.reject(Stage::Upload, e))?;
    Ok(Success::new(receipt))
}

pub async fn processed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Success<ProcessedView>>, AppError> {
    tracing::info!(job_id = %id, "checking status");
    let view = state
        .orchestrator
        .processed(&id)
        .map_err(|e| state.reject(Stage::Processed, e))?;
    Ok(Success::new(view))
}

/// `GET /download/{id}.png`
pub async fn download(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, AppError> {
    let Some(id) = file.strip_suffix(".png") else {
        return Err(AppError::NotFound(ROUTE_NOT_FOUND.to_string()));
    };
    tracing::info!(job_id = %id, "download requested");

    let bytes = state
        .orchestrator
        .download(id)
        .await
        .map_err(|e| state.reject(Stage::Download, e))?;

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}

pub async fn not_found() -> AppError {
    AppError::NotFound(ROUTE_NOT_FOUND.to_string())
}

/// multipart から `image` フィールドを取り出す
///
/// 拡張子はボディを読む前に確かめるので、HEIC 以外はサイズに関係なく拡張子エラーになる。
async fn read_upload(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadRequest, AppError> {
    let reject = |err: ValidationError| state.reject(Stage::Upload, err.into());

    // multipart でないリクエストは「ファイルなし」と同じ扱い
    let Ok(mut multipart) = multipart else {
        return Err(reject(ValidationError::MissingFile));
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        // filename の無いパートはファイルではない
        let Some(file_name) = field.file_name().map(str::to_string) else {
            return Err(reject(ValidationError::MissingFile));
        };
        if !has_heic_extension(&file_name) {
            return Err(reject(ValidationError::NotHeic { file_name }));
        }
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok(UploadRequest::new(file_name, bytes));
    }
    Err(reject(ValidationError::MissingFile))
}

/// ボディ上限を超えた場合はサイズ超過、それ以外の破損はファイルなしとして扱う
fn multipart_error(err: MultipartError) -> AppError {
    tracing::warn!(status = %err.status(), error = %err.body_text(), "failed to read multipart body");
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::BadRequest(FILE_TOO_LARGE.to_string())
    } else {
        AppError::BadRequest(NO_FILE_UPLOADED.to_string())
    }
}
