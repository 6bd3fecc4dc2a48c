//! Job record - アップロード 1 件と 2 つの CID の対応
//!
//! Job は registry に「完成形」でしか書き込まれません。
//! original / processed の両方の CID が揃ってから `JobRecord` を作るので、
//! 片方だけ埋まった Job を読み手が観測することはありません。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::object::Cid;

/// Job record: tracks the original and converted objects of one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub original_cid: Cid,
    pub processed_cid: Cid,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(job_id: JobId, original_cid: Cid, processed_cid: Cid, created_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            original_cid,
            processed_cid,
            created_at,
        }
    }

    /// `ttl` を過ぎているか
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.created_at >= ttl
    }
}

/// Upload result for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub id: JobId,
    pub original_url: String,
    pub processed_url: String,
}

/// Processed object lookup for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedView {
    pub url: String,
    pub cid: Cid,
}
