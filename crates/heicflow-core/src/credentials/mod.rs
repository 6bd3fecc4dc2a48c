//! Credentials - 署名鍵の復号と署名
//!
//! ウォレット JSON（keyring 形式）とパスフレーズから ed25519 の署名鍵を取り出し、
//! ストレージネットワークへのリクエスト署名に使う `Signer` を作ります。

pub mod signer;
pub mod wallet;

pub use self::signer::{Signer, verify_hex};
pub use self::wallet::{ScryptParams, WalletCredentials, WalletEncoding};
