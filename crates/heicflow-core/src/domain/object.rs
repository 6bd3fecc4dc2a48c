//! Stored objects - ストレージネットワーク上のオブジェクト識別子
//!
//! オブジェクトのバイト列はストレージネットワークが所有します。
//! このクレートは識別子（bucket と CID）を受け渡すだけで、中身を解釈しません。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bucket はストレージネットワーク上の名前空間
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(u64);

impl BucketId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BucketId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// CID はストレージネットワークが返すコンテンツ識別子
///
/// 形式はネットワーク依存なので opaque な文字列として扱う。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cid(String);

impl Cid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// StoredObject は store 成功時にネットワークから返る参照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub cid: Cid,
    pub bucket_id: BucketId,
}
