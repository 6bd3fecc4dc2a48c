//! ImageConverter port - HEIC → PNG 変換
//!
//! 変換アルゴリズム自体は外部コーデックに委譲します。
//!
//! # 実装
//! - `impls::libheif`: libheif によるプロセス内デコード（feature `libheif`）
//! - `impls::command`: 外部コマンド `heif-dec` の呼び出し

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::ConversionError;

/// ImageConverter は HEIC のバイト列を PNG のバイト列に変換する
///
/// # 契約
/// - 入力に画像が複数ある場合は 1 枚目（primary）だけを使う
/// - 画像が 0 枚、または HEIC でない場合は `ConversionError`
/// - コーデック処理は async executor をブロックしない
#[async_trait]
pub trait ImageConverter: Send + Sync {
    async fn convert(&self, heic: Bytes) -> Result<Bytes, ConversionError>;
}
