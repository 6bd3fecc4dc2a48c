//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（ストレージネットワーク、画像コーデック、時計、乱数）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod converter;
pub mod id_generator;
pub mod object_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::converter::ImageConverter;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::object_store::{ObjectStore, StorageConnector};
