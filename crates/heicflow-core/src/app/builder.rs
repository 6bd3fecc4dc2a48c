//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;
use std::time::Duration;

use super::orchestrator::UploadOrchestrator;
use super::registry::JobRegistry;
use crate::ports::{Clock, IdGenerator, ImageConverter, SystemClock, UlidGenerator};
use crate::storage::StorageGateway;

/// アップロードサイズの既定上限（10 MiB）
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .gateway(gateway)
///     .converter(CommandConverter::new("heif-dec"))
///     .job_ttl(Some(Duration::from_secs(86_400)))
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - gateway と converter は必須
/// - build() 時に不足をまとめて BuildError で返す
pub struct AppBuilder {
    gateway: Option<Arc<StorageGateway>>,
    converter: Option<Arc<dyn ImageConverter>>,
    clock: Arc<dyn Clock>,
    id_gen: Option<Arc<dyn IdGenerator>>,
    job_ttl: Option<Duration>,
    max_upload_bytes: usize,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These must be provided before build().")]
    MissingComponents(Vec<&'static str>),

    #[error("max_upload_bytes must be greater than zero")]
    ZeroUploadLimit,
}

impl AppBuilder {
    /// 新しい AppBuilder を作成
    pub fn new() -> Self {
        Self {
            gateway: None,
            converter: None,
            clock: Arc::new(SystemClock),
            id_gen: None,
            job_ttl: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn gateway(mut self, gateway: Arc<StorageGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn converter(mut self, converter: impl ImageConverter + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    /// 登録時刻と期限判定に使う時計（既定: SystemClock）
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 未指定なら clock を使う UlidGenerator
    pub fn id_generator(mut self, id_gen: Arc<dyn IdGenerator>) -> Self {
        self.id_gen = Some(id_gen);
        self
    }

    /// ジョブの保持期間（None なら無期限）
    pub fn job_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.job_ttl = ttl;
        self
    }

    pub fn max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }

    /// AppBuilder を構築して App を生成
    ///
    /// # 検証
    /// - gateway / converter が揃っているか
    /// - max_upload_bytes が 0 でないか
    pub fn build(self) -> Result<App, BuildError> {
        let mut missing = Vec::new();
        if self.gateway.is_none() {
            missing.push("gateway");
        }
        if self.converter.is_none() {
            missing.push("converter");
        }
        let (Some(gateway), Some(converter)) = (self.gateway, self.converter) else {
            return Err(BuildError::MissingComponents(missing));
        };
        if self.max_upload_bytes == 0 {
            return Err(BuildError::ZeroUploadLimit);
        }

        let id_gen = self
            .id_gen
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(self.clock.clone())));
        let registry = Arc::new(JobRegistry::new(self.clock, self.job_ttl));
        let orchestrator = Arc::new(UploadOrchestrator::new(
            gateway,
            converter,
            registry.clone(),
            id_gen,
            self.max_upload_bytes,
        ));

        Ok(App {
            orchestrator,
            registry,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// App は組み上がったアプリケーション
///
/// HTTP 層は `orchestrator` を共有し、GC ループは `registry` を共有する。
pub struct App {
    pub orchestrator: Arc<UploadOrchestrator>,
    pub registry: Arc<JobRegistry>,
}
