//! ObjectStore port - コンテンツアドレス型ストレージネットワーク
//!
//! ObjectStore はバイト列を bucket に保存し、CID を返します。
//! StorageConnector は署名鍵を使ってネットワークに接続（認証 + 残高/bucket 確認）し、
//! 接続済みの ObjectStore を返します。
//!
//! # 実装
//! - `impls::inmem_store`: 開発・テスト用（blake3 でアドレッシング）
//! - `impls::signed_http`: 署名付き HTTP のストレージノード

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::credentials::Signer;
use crate::domain::{BucketId, Cid, StorageError, StoredObject};

/// ObjectStore は接続済みのストレージクライアント
///
/// # 設計原則
/// - 内部でリトライしない（失敗はそのまま呼び出し元へ）
/// - 一度作ったクライアントはプロセスの寿命の間有効とみなす
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `bytes` を `bucket` に保存して CID を返す
    async fn store(&self, bucket: BucketId, bytes: Bytes) -> Result<StoredObject, StorageError>;

    /// 保存済みのバイト列を取得する
    ///
    /// 存在しない場合は `StorageError::NotFound`。
    async fn read(&self, bucket: BucketId, cid: &Cid) -> Result<Bytes, StorageError>;
}

/// StorageConnector はネットワークへの接続（ハンドシェイク）を行う
///
/// ハンドシェイクは高コストなので、呼び出し側（StorageGateway）が single-flight で 1 回だけ呼ぶ。
#[async_trait]
pub trait StorageConnector: Send + Sync {
    async fn connect(
        &self,
        signer: Signer,
        bucket: BucketId,
    ) -> Result<Arc<dyn ObjectStore>, StorageError>;
}
