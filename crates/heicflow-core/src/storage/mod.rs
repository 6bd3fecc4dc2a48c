//! Storage - ストレージネットワークへのゲートウェイ
//!
//! `StorageGateway` は接続済みクライアントを single-flight でメモ化し、
//! upload / read / URL 生成の 3 操作を提供します。

pub mod gateway;

pub use self::gateway::{StorageGateway, url_for_object};
