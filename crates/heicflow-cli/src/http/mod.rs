//! HTTP 層 - ルーティング、共有状態、エラーマッピング
//!
//! # ルート
//! - `GET  /`                  アップロードページ
//! - `GET  /health`            ヘルスチェック
//! - `POST /upload`            multipart の `image` フィールドを変換
//! - `GET  /processed/:id`     変換済み画像の URL と CID
//! - `GET  /download/:id.png`  変換済み PNG のバイト列

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Method, header};
use axum::routing::{get, post};
use heicflow_core::app::UploadOrchestrator;
use heicflow_core::domain::{ErrorKind, PipelineError};
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use self::error::{AppError, Stage};

/// multipart の境界やヘッダ分として、ファイル上限に足す余白
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// ハンドラ間で共有する状態
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<UploadOrchestrator>,
    /// false なら想定外エラーの詳細をレスポンスに出さない
    pub expose_errors: bool,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    /// 受信側は CredentialError を検知したときに true を受け取る
    pub fn new(
        orchestrator: Arc<UploadOrchestrator>,
        expose_errors: bool,
    ) -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        let state = Self {
            orchestrator,
            expose_errors,
            shutdown: Arc::new(tx),
        };
        (state, rx)
    }

    /// 失敗をログに残して AppError に変換する
    ///
    /// 署名鍵の不備はこれ以上アップロードを受け付けられないので、シャットダウンを要求する。
    pub(crate) fn reject(&self, stage: Stage, err: PipelineError) -> AppError {
        match err.kind() {
            ErrorKind::Credential => {
                error!(stage = ?stage, error = %err, "credential failure, requesting shutdown");
                self.shutdown.send_replace(true);
            }
            ErrorKind::Validation | ErrorKind::NotFound => {
                warn!(stage = ?stage, error = %err, "request rejected");
            }
            ErrorKind::Conversion | ErrorKind::Storage => {
                error!(stage = ?stage, error = %err, "request failed");
            }
        }
        AppError::from_pipeline(stage, &err, self.expose_errors)
    }
}

/// Router を組み立てる
pub fn router(state: AppState) -> Router {
    let body_limit = state
        .orchestrator
        .max_upload_bytes()
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/upload", post(handlers::upload))
        .route("/processed/:id", get(handlers::processed))
        .route("/download/:file", get(handlers::download))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors()),
        )
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
}
