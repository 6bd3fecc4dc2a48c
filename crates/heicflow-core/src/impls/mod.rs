//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryObjectStore / InMemoryConnector**: 開発・テスト用のストレージ
//! - **SignedHttpConnector / SignedHttpStore**: 署名付き HTTP のストレージノード
//! - **CommandConverter**: 外部コマンド `heif-dec` による変換
//! - **LibHeifConverter**: libheif によるプロセス内変換（feature `libheif`）

pub mod command;
pub mod inmem_store;
#[cfg(feature = "libheif")]
pub mod libheif;
pub mod signed_http;

pub use self::command::CommandConverter;
pub use self::inmem_store::{InMemoryConnector, InMemoryObjectStore};
#[cfg(feature = "libheif")]
pub use self::libheif::LibHeifConverter;
pub use self::signed_http::{SignedHttpConnector, SignedHttpStore};
