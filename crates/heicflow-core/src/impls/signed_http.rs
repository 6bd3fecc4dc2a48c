//! SignedHttpStore - 署名付き HTTP でオブジェクトを預けるストレージノードのアダプタ
//!
//! 自前で運用するノード（またはゲートウェイの前段）向けの汎用プロトコルです。
//! 特定のストレージネットワークのクライアントプロトコルは話しません。
//!
//! すべてのリクエストに ed25519 署名を付けます:
//! ```text
//! X-Storage-Public-Key: <hex>
//! X-Storage-Timestamp:  <unix ms>
//! X-Storage-Signature:  sign("METHOD\nPATH\nTIMESTAMP\nblake3(body)")
//! X-Storage-Network:    <label>   (設定時のみ)
//! ```
//!
//! # エンドポイント
//! - `GET  /api/v1/accounts/{pk}/balance`          ハンドシェイク（残高確認）
//! - `GET  /api/v1/buckets/{bucket}`               ハンドシェイク（bucket 確認）
//! - `PUT  /api/v1/buckets/{bucket}/pieces`        保存 → `{"cid": "..."}`
//! - `GET  /api/v1/buckets/{bucket}/pieces/{cid}`  取得

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::credentials::Signer;
use crate::domain::{BucketId, Cid, CredentialError, StorageError, StoredObject};
use crate::ports::{ObjectStore, StorageConnector};

pub const HEADER_PUBLIC_KEY: &str = "X-Storage-Public-Key";
pub const HEADER_TIMESTAMP: &str = "X-Storage-Timestamp";
pub const HEADER_SIGNATURE: &str = "X-Storage-Signature";
pub const HEADER_NETWORK: &str = "X-Storage-Network";

/// 署名対象のメッセージを組み立てる
pub fn signing_message(method: &str, path: &str, timestamp_ms: i64, body: &[u8]) -> String {
    format!(
        "{method}\n{path}\n{timestamp_ms}\n{}",
        blake3::hash(body).to_hex()
    )
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: String,
}

#[derive(Debug, Deserialize)]
struct StoreResponse {
    cid: String,
}

/// SignedHttpConnector はストレージノードへハンドシェイクする
#[derive(Clone)]
pub struct SignedHttpConnector {
    http: Client,
    node_url: String,
    network: Option<String>,
}

impl SignedHttpConnector {
    pub fn new(node_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            node_url: node_url.into().trim_end_matches('/').to_string(),
            network: None,
        }
    }

    /// ノードが複数のデプロイを束ねている場合の宛先ラベル
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }
}

#[async_trait]
impl StorageConnector for SignedHttpConnector {
    async fn connect(
        &self,
        signer: Signer,
        bucket: BucketId,
    ) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let store = SignedHttpStore {
            http: self.http.clone(),
            node_url: self.node_url.clone(),
            network: self.network.clone(),
            signer,
        };

        let balance = store.balance().await?;
        info!(
            network = self.network.as_deref().unwrap_or("-"),
            public_key = %store.signer.public_key_hex(),
            balance = %balance,
            "account balance"
        );
        store.check_bucket(bucket).await?;

        Ok(Arc::new(store))
    }
}

/// SignedHttpStore は接続済みのクライアント
pub struct SignedHttpStore {
    http: Client,
    node_url: String,
    network: Option<String>,
    signer: Signer,
}

impl SignedHttpStore {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Bytes,
    ) -> Result<reqwest::Response, StorageError> {
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        let message = signing_message(method.as_str(), path, timestamp_ms, &body);
        let signature = self.signer.sign_hex(message.as_bytes());

        let mut request = self
            .http
            .request(method, format!("{}{}", self.node_url, path))
            .header(HEADER_PUBLIC_KEY, self.signer.public_key_hex())
            .header(HEADER_TIMESTAMP, timestamp_ms.to_string())
            .header(HEADER_SIGNATURE, signature);
        if let Some(network) = &self.network {
            request = request.header(HEADER_NETWORK, network);
        }
        if !body.is_empty() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(body);
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))
    }

    async fn balance(&self) -> Result<String, StorageError> {
        let path = format!("/api/v1/accounts/{}/balance", self.signer.public_key_hex());
        let response = self.send(Method::GET, &path, Bytes::new()).await?;
        reject_credentials(&response)?;
        ensure_success(&response)?;

        let body: BalanceResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Request(format!("balance response: {e}")))?;
        Ok(body.balance)
    }

    async fn check_bucket(&self, bucket: BucketId) -> Result<(), StorageError> {
        let path = format!("/api/v1/buckets/{bucket}");
        let response = self.send(Method::GET, &path, Bytes::new()).await?;
        reject_credentials(&response)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::BucketNotFound(bucket));
        }
        ensure_success(&response)
    }
}

#[async_trait]
impl ObjectStore for SignedHttpStore {
    async fn store(&self, bucket: BucketId, bytes: Bytes) -> Result<StoredObject, StorageError> {
        let path = format!("/api/v1/buckets/{bucket}/pieces");
        let size = bytes.len();
        let response = self.send(Method::PUT, &path, bytes).await?;
        reject_credentials(&response)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::BucketNotFound(bucket));
        }
        ensure_success(&response)?;

        let body: StoreResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Request(format!("store response: {e}")))?;
        debug!(cid = %body.cid, bucket_id = %bucket, size, "piece stored");

        Ok(StoredObject {
            cid: Cid::new(body.cid),
            bucket_id: bucket,
        })
    }

    async fn read(&self, bucket: BucketId, cid: &Cid) -> Result<Bytes, StorageError> {
        let path = format!("/api/v1/buckets/{bucket}/pieces/{cid}");
        let response = self.send(Method::GET, &path, Bytes::new()).await?;
        reject_credentials(&response)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound { cid: cid.clone() });
        }
        ensure_success(&response)?;

        response
            .bytes()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))
    }
}

fn reject_credentials(response: &reqwest::Response) -> Result<(), StorageError> {
    match response.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CredentialError::Rejected(
            format!("storage node answered {}", response.status()),
        )
        .into()),
        _ => Ok(()),
    }
}

fn ensure_success(response: &reqwest::Response) -> Result<(), StorageError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(StorageError::UnexpectedStatus {
            status: status.as_u16(),
        })
    }
}
