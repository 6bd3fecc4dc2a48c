//! StorageGateway - 署名鍵ベースの遅延初期化クライアント
//!
//! # 学習ポイント
//! - `tokio::sync::OnceCell::get_or_try_init` による single-flight 初期化
//!   （同時に初回アクセスが来ても、ハンドシェイクは 1 回だけ）
//! - 復号（scrypt）は `spawn_blocking` で executor の外に逃がす
//! - CredentialError は記憶しておき、以後は再試行せずに即失敗させる

use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::credentials::WalletCredentials;
use crate::domain::{BucketId, Cid, CredentialError, StorageError, StoredObject};
use crate::ports::{ObjectStore, StorageConnector};

/// StorageGateway はストレージネットワークへの唯一の入り口
///
/// # 初期化
/// 最初の `upload_object` / `read_object` 呼び出しで以下を行う:
/// 1. ウォレットをパスフレーズで復号して Signer を作る
/// 2. StorageConnector でハンドシェイク（認証 + 残高 / bucket 確認）
///
/// 明示的な warm-up はなく、初期化の遅延は最初のリクエストに乗る。
/// 作ったクライアントはプロセスの寿命の間有効とみなし、再認証はしない。
pub struct StorageGateway {
    connector: Arc<dyn StorageConnector>,
    wallet: WalletCredentials,
    passphrase: String,
    bucket_id: BucketId,
    gateway_url: String,
    client: OnceCell<Arc<dyn ObjectStore>>,
    fatal: OnceLock<CredentialError>,
}

impl StorageGateway {
    pub fn new(
        connector: Arc<dyn StorageConnector>,
        wallet: WalletCredentials,
        passphrase: impl Into<String>,
        bucket_id: BucketId,
        gateway_url: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            wallet,
            passphrase: passphrase.into(),
            bucket_id,
            gateway_url: gateway_url.into(),
            client: OnceCell::new(),
            fatal: OnceLock::new(),
        }
    }

    /// アップロード先の bucket
    pub fn bucket_id(&self) -> BucketId {
        self.bucket_id
    }

    /// 初期化済みかどうか
    pub fn is_initialized(&self) -> bool {
        self.client.initialized()
    }

    /// 接続済みクライアントを返す（初回のみハンドシェイク）
    pub async fn initialize(&self) -> Result<Arc<dyn ObjectStore>, StorageError> {
        if let Some(err) = self.fatal.get() {
            return Err(StorageError::Credential(err.clone()));
        }

        let client = self
            .client
            .get_or_try_init(|| async {
                // 待機中に先行者が CredentialError で失敗していたら、やり直さない
                if let Some(err) = self.fatal.get() {
                    return Err(StorageError::Credential(err.clone()));
                }
                match self.connect().await {
                    Err(StorageError::Credential(err)) => {
                        error!(error = %err, "storage client initialization failed");
                        let _ = self.fatal.set(err.clone());
                        Err(StorageError::Credential(err))
                    }
                    other => other,
                }
            })
            .await?;

        Ok(Arc::clone(client))
    }

    async fn connect(&self) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let wallet = self.wallet.clone();
        let passphrase = self.passphrase.clone();
        let signer = tokio::task::spawn_blocking(move || wallet.decode(&passphrase))
            .await
            .map_err(|e| StorageError::Internal(format!("wallet decode task failed: {e}")))??;
        info!(public_key = %signer.public_key_hex(), "signer initialized");

        let client = self.connector.connect(signer, self.bucket_id).await?;
        info!(bucket_id = %self.bucket_id, "storage client initialized");
        Ok(client)
    }

    /// `bytes` を `bucket` に保存する（内部リトライなし）
    pub async fn upload_object(
        &self,
        bytes: Bytes,
        bucket: BucketId,
    ) -> Result<StoredObject, StorageError> {
        let client = self.initialize().await?;
        let size = bytes.len();
        let stored = client.store(bucket, bytes).await?;
        debug!(cid = %stored.cid, bucket_id = %bucket, size, "object stored");
        Ok(stored)
    }

    /// 保存済みのオブジェクトを取得する
    pub async fn read_object(&self, cid: &Cid, bucket: BucketId) -> Result<Bytes, StorageError> {
        let client = self.initialize().await?;
        client.read(bucket, cid).await
    }

    /// 取得用 URL を組み立てる（I/O なし）
    pub fn url_for_object(&self, bucket: BucketId, cid: &Cid) -> String {
        url_for_object(&self.gateway_url, bucket, cid)
    }
}

/// `base/bucket/cid` を組み立てる純関数
///
/// 空の要素は捨て、base 末尾の `/` は 1 つにまとめる。
pub fn url_for_object(base: &str, bucket: BucketId, cid: &Cid) -> String {
    let bucket = bucket.to_string();
    [base.trim_end_matches('/'), bucket.as_str(), cid.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
