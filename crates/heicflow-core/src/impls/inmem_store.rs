//! InMemoryObjectStore - 開発用のコンテンツアドレス型ストア
//!
//! # 学習ポイント
//! - blake3 ダイジェストを CID にする（同じバイト列 → 同じ CID）
//! - Mutex はロックを await 跨ぎで保持しない（ロック区間は同期処理のみ）
//! - ハンドシェイク回数を数えて single-flight をテストできるようにする

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::credentials::Signer;
use crate::domain::{BucketId, Cid, CredentialError, StorageError, StoredObject};
use crate::ports::{ObjectStore, StorageConnector};

/// InMemoryObjectStore はプロセス内の HashMap にオブジェクトを保存する
///
/// `with_store_quota(n)` を指定すると、n 回成功した後の store は失敗する
/// （途中でストレージが落ちるケースの再現用）。
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<(BucketId, Cid), Bytes>>,
    stores: AtomicUsize,
    quota: Option<usize>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// store の成功回数に上限を設ける
    pub fn with_store_quota(mut self, quota: usize) -> Self {
        self.quota = Some(quota);
        self
    }

    /// 保存済みオブジェクト数
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 成功した store の回数
    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    /// blake3 ベースの CID
    pub fn cid_for(bytes: &[u8]) -> Cid {
        Cid::new(format!("b3{}", blake3::hash(bytes).to_hex()))
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn store(&self, bucket: BucketId, bytes: Bytes) -> Result<StoredObject, StorageError> {
        if let Some(quota) = self.quota
            && self.stores.load(Ordering::SeqCst) >= quota
        {
            return Err(StorageError::Request("store quota exhausted".into()));
        }

        let cid = Self::cid_for(&bytes);
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((bucket, cid.clone()), bytes);
        self.stores.fetch_add(1, Ordering::SeqCst);

        Ok(StoredObject {
            cid,
            bucket_id: bucket,
        })
    }

    async fn read(&self, bucket: BucketId, cid: &Cid) -> Result<Bytes, StorageError> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(bucket, cid.clone()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound { cid: cid.clone() })
    }
}

/// InMemoryConnector は InMemoryObjectStore を返すだけのコネクタ
pub struct InMemoryConnector {
    store: Arc<InMemoryObjectStore>,
    handshakes: AtomicUsize,
    delay: Duration,
    reject: Option<String>,
}

impl InMemoryConnector {
    pub fn new(store: Arc<InMemoryObjectStore>) -> Self {
        Self {
            store,
            handshakes: AtomicUsize::new(0),
            delay: Duration::ZERO,
            reject: None,
        }
    }

    /// ハンドシェイクに遅延を入れる（同時初回アクセスの再現用）
    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// すべてのハンドシェイクを CredentialError::Rejected にする
    pub fn rejecting(mut self, reason: impl Into<String>) -> Self {
        self.reject = Some(reason.into());
        self
    }

    /// 実行されたハンドシェイクの回数
    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageConnector for InMemoryConnector {
    async fn connect(
        &self,
        signer: Signer,
        bucket: BucketId,
    ) -> Result<Arc<dyn ObjectStore>, StorageError> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(reason) = &self.reject {
            return Err(CredentialError::Rejected(reason.clone()).into());
        }
        tracing::debug!(public_key = %signer.public_key_hex(), bucket_id = %bucket, "in-memory handshake");
        Ok(self.store.clone() as Arc<dyn ObjectStore>)
    }
}
