//! Upload request - 受け付けたアップロードの入力

use bytes::Bytes;

use super::errors::ValidationError;

/// UploadRequest は HTTP 層から渡されるアップロード 1 件
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// クライアントが付けたファイル名（multipart の filename）
    pub file_name: String,
    pub bytes: Bytes,
}

impl UploadRequest {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// ストレージやコーデックに触る前の検証
    ///
    /// - ファイル名は `.heic` で終わること（大文字小文字は問わない）
    /// - サイズは `max_bytes` 以下
    pub fn validate(&self, max_bytes: usize) -> Result<(), ValidationError> {
        if !has_heic_extension(&self.file_name) {
            return Err(ValidationError::NotHeic {
                file_name: self.file_name.clone(),
            });
        }
        if self.bytes.len() > max_bytes {
            return Err(ValidationError::TooLarge {
                size: self.bytes.len(),
                max: max_bytes,
            });
        }
        Ok(())
    }
}

/// ファイル名が `.heic` で終わるか（case-insensitive）
pub fn has_heic_extension(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".heic")
}
