//! Errors - エラー型と分類
//!
//! パイプラインの各ステージは専用のエラー型を返し、
//! `PipelineError` がそれらを束ねて `ErrorKind`（運用分類）を提供します。
//! HTTP 層は `ErrorKind` だけを見てステータスコードを決めます。

use thiserror::Error;

use super::object::{BucketId, Cid};

/// ErrorKind は失敗の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 入力ファイルの不備（欠落、拡張子違い、サイズ超過）
    Validation,
    /// コーデックの失敗
    Conversion,
    /// ストレージネットワーク / クライアントの失敗
    Storage,
    /// 未知の job id、または存在しないオブジェクト
    NotFound,
    /// 署名鍵の設定不備。以後アップロードを受け付けてはいけない
    Credential,
}

/// ValidationError はアップロード入力の検証エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no file uploaded")]
    MissingFile,

    #[error("not a HEIC file: {file_name}")]
    NotHeic { file_name: String },

    #[error("file too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },
}

/// ConversionError は HEIC → PNG 変換エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("input is not a HEIC container")]
    NotHeic,

    #[error("HEIC container holds no images")]
    NoImages,

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("PNG encode failed: {0}")]
    Encode(String),

    #[error("codec unavailable: {0}")]
    Codec(String),
}

/// CredentialError は署名鍵の復号・認証エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("malformed wallet: {0}")]
    MalformedWallet(String),

    #[error("unsupported wallet encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("wrong passphrase")]
    WrongPassphrase,

    #[error("decoded key does not match the wallet public key")]
    KeyMismatch,

    #[error("storage network rejected the signing key: {0}")]
    Rejected(String),
}

/// StorageError はストレージネットワークへのアクセスエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("object not found: {cid}")]
    NotFound { cid: Cid },

    #[error("bucket not found: {0}")]
    BucketNotFound(BucketId),

    #[error("storage client unavailable: {0}")]
    Credential(#[from] CredentialError),

    #[error("storage request failed: {0}")]
    Request(String),

    #[error("unexpected response from storage node: {status}")]
    UnexpectedStatus { status: u16 },

    #[error("storage error: {0}")]
    Internal(String),
}

/// PipelineError はオーケストレーター全体の統合エラー型
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("job not found: {0}")]
    JobNotFound(String),
}

impl PipelineError {
    /// 運用分類を返す
    ///
    /// StorageError の中に NotFound / Credential が入っている場合はそちらを優先する。
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Conversion(_) => ErrorKind::Conversion,
            PipelineError::Storage(StorageError::NotFound { .. }) => ErrorKind::NotFound,
            PipelineError::Storage(StorageError::Credential(_)) => ErrorKind::Credential,
            PipelineError::Storage(_) => ErrorKind::Storage,
            PipelineError::Credential(_) => ErrorKind::Credential,
            PipelineError::JobNotFound(_) => ErrorKind::NotFound,
        }
    }
}
