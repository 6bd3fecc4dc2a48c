//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **UploadOrchestrator**: アップロード → 変換 → 保存 → 登録のパイプライン
//! - **JobRegistry**: job id → CID の in-memory インデックス
//! - **GcLoop**: 期限切れ Job の掃除

pub mod builder;
pub mod gc_loop;
pub mod orchestrator;
pub mod registry;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError, DEFAULT_MAX_UPLOAD_BYTES};
pub use self::gc_loop::GcLoop;
pub use self::orchestrator::UploadOrchestrator;
pub use self::registry::JobRegistry;
