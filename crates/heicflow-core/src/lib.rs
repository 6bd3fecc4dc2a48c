//! heicflow-core
//!
//! HEIC → PNG 変換サービスのコア部品。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, object, job, upload, format, errors）
//! - **ports**: 抽象化レイヤー（ObjectStore, StorageConnector, ImageConverter, Clock, IdGenerator）
//! - **credentials**: ウォレットの復号と署名鍵
//! - **storage**: StorageGateway（遅延初期化クライアント + URL 組み立て）
//! - **impls**: 実装（署名付き HTTP ストレージノード、in-memory ストア、コンバータ）
//! - **app**: アプリケーションロジック（builder, orchestrator, registry, gc_loop）

pub mod app;
pub mod credentials;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod storage;
