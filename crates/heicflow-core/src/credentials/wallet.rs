//! Wallet - keyring 形式のウォレット JSON
//!
//! # フォーマット
//! ```text
//! encoded = base64( salt(32) | N(u32le) | p(u32le) | r(u32le) | nonce(24) | secretbox )
//! secretbox 平文 = PKCS8_HEADER(16) | secret(64) | DIVIDER(5) | public(32)
//! ed25519 の secret = seed(32) | public(32)
//! ```
//! パスフレーズは scrypt で 64 byte に伸長し、先頭 32 byte を XSalsa20-Poly1305 の鍵にします。
//!
//! # 学習ポイント
//! - scrypt は CPU バウンドなので、async から呼ぶ場合は `spawn_blocking` で包む（呼び出し側の責務）
//! - 復号失敗（MAC 不一致）はパスフレーズ違いとして扱う

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use xsalsa20poly1305::aead::{Aead, KeyInit};
use xsalsa20poly1305::{Key, Nonce, XSalsa20Poly1305};

use super::Signer;
use crate::domain::CredentialError;

const PKCS8_HEADER: [u8; 16] = [48, 83, 2, 1, 1, 48, 5, 6, 3, 43, 101, 112, 4, 34, 4, 32];
const PKCS8_DIVIDER: [u8; 5] = [161, 35, 3, 33, 0];
const SALT_LEN: usize = 32;
const SCRYPT_LEN: usize = SALT_LEN + 12;
const NONCE_LEN: usize = 24;
const SECRET_LEN: usize = 64;
const PUBLIC_LEN: usize = 32;
const PLAINTEXT_LEN: usize = PKCS8_HEADER.len() + SECRET_LEN + PKCS8_DIVIDER.len() + PUBLIC_LEN;
const WALLET_VERSION: &str = "3";

/// ScryptParams は scrypt のコストパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScryptParams {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for ScryptParams {
    /// keyring のデフォルト（N = 2^15, r = 8, p = 1）
    fn default() -> Self {
        Self {
            log_n: 15,
            r: 8,
            p: 1,
        }
    }
}

/// WalletEncoding は `encoding` フィールド
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletEncoding {
    pub content: Vec<String>,
    #[serde(rename = "type", deserialize_with = "one_or_many")]
    pub kind: Vec<String>,
    pub version: String,
}

/// WalletCredentials はウォレット JSON そのもの
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletCredentials {
    pub encoded: String,
    pub encoding: WalletEncoding,
    pub address: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl WalletCredentials {
    /// JSON 文字列から読み込む
    pub fn from_json(json: &str) -> Result<Self, CredentialError> {
        serde_json::from_str(json).map_err(|e| CredentialError::MalformedWallet(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, CredentialError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CredentialError::MalformedWallet(e.to_string()))
    }

    /// パスフレーズで復号して Signer を取り出す
    pub fn decode(&self, passphrase: &str) -> Result<Signer, CredentialError> {
        self.check_encoding()?;

        let raw = STANDARD
            .decode(self.encoded.trim())
            .map_err(|e| CredentialError::MalformedWallet(format!("base64: {e}")))?;
        if raw.len() < SCRYPT_LEN + NONCE_LEN {
            return Err(CredentialError::MalformedWallet(format!(
                "encoded payload too short ({} bytes)",
                raw.len()
            )));
        }

        let (salt, params) = split_scrypt_header(&raw[..SCRYPT_LEN])?;
        let key = derive_key(passphrase, salt, params)?;

        let nonce = &raw[SCRYPT_LEN..SCRYPT_LEN + NONCE_LEN];
        let ciphertext = &raw[SCRYPT_LEN + NONCE_LEN..];
        let cipher = XSalsa20Poly1305::new(Key::from_slice(&key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CredentialError::WrongPassphrase)?;

        let signer = decode_pkcs8(&plaintext)?;

        if let Some(hex_address) = self.address.strip_prefix("0x")
            && !hex_address.eq_ignore_ascii_case(&signer.public_key_hex())
        {
            return Err(CredentialError::KeyMismatch);
        }

        Ok(signer)
    }

    /// Signer をパスフレーズで暗号化してウォレットを作る
    pub fn encrypt(
        signer: &Signer,
        passphrase: &str,
        params: ScryptParams,
    ) -> Result<Self, CredentialError> {
        let salt: [u8; SALT_LEN] = rand::random();
        let nonce: [u8; NONCE_LEN] = rand::random();
        let key = derive_key(passphrase, &salt, params)?;

        let mut plaintext = Vec::with_capacity(PLAINTEXT_LEN);
        plaintext.extend_from_slice(&PKCS8_HEADER);
        plaintext.extend_from_slice(&signer.seed());
        plaintext.extend_from_slice(&signer.public_key());
        plaintext.extend_from_slice(&PKCS8_DIVIDER);
        plaintext.extend_from_slice(&signer.public_key());

        let cipher = XSalsa20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| CredentialError::MalformedWallet(format!("encrypt: {e}")))?;

        let mut raw = Vec::with_capacity(SCRYPT_LEN + NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&salt);
        raw.extend_from_slice(&(1u32 << params.log_n).to_le_bytes());
        raw.extend_from_slice(&params.p.to_le_bytes());
        raw.extend_from_slice(&params.r.to_le_bytes());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&ciphertext);

        Ok(Self {
            encoded: STANDARD.encode(raw),
            encoding: WalletEncoding {
                content: vec!["pkcs8".into(), "ed25519".into()],
                kind: vec!["scrypt".into(), "xsalsa20-poly1305".into()],
                version: WALLET_VERSION.into(),
            },
            address: format!("0x{}", signer.public_key_hex()),
            meta: serde_json::json!({}),
        })
    }

    fn check_encoding(&self) -> Result<(), CredentialError> {
        let enc = &self.encoding;
        if enc.version != WALLET_VERSION {
            return Err(CredentialError::UnsupportedEncoding(format!(
                "version {}",
                enc.version
            )));
        }
        if !has(&enc.content, "pkcs8") || !has(&enc.content, "ed25519") {
            return Err(CredentialError::UnsupportedEncoding(format!(
                "content {:?}",
                enc.content
            )));
        }
        if !has(&enc.kind, "scrypt") || !has(&enc.kind, "xsalsa20-poly1305") {
            return Err(CredentialError::UnsupportedEncoding(format!(
                "type {:?}",
                enc.kind
            )));
        }
        Ok(())
    }
}

fn has(list: &[String], item: &str) -> bool {
    list.iter().any(|s| s == item)
}

fn split_scrypt_header(header: &[u8]) -> Result<(&[u8], ScryptParams), CredentialError> {
    let read_u32 = |at: usize| {
        u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]])
    };
    let n = read_u32(SALT_LEN);
    let p = read_u32(SALT_LEN + 4);
    let r = read_u32(SALT_LEN + 8);

    if !n.is_power_of_two() || n < 2 {
        return Err(CredentialError::MalformedWallet(format!(
            "scrypt N must be a power of two, got {n}"
        )));
    }
    let params = ScryptParams {
        log_n: n.trailing_zeros() as u8,
        r,
        p,
    };
    Ok((&header[..SALT_LEN], params))
}

fn derive_key(
    passphrase: &str,
    salt: &[u8],
    params: ScryptParams,
) -> Result<[u8; 32], CredentialError> {
    let scrypt_params = scrypt::Params::new(params.log_n, params.r, params.p, 64)
        .map_err(|e| CredentialError::MalformedWallet(format!("scrypt params: {e}")))?;
    let mut derived = [0u8; 64];
    scrypt::scrypt(passphrase.as_bytes(), salt, &scrypt_params, &mut derived)
        .map_err(|e| CredentialError::MalformedWallet(format!("scrypt: {e}")))?;

    let mut key = [0u8; 32];
    key.copy_from_slice(&derived[..32]);
    Ok(key)
}

fn decode_pkcs8(plaintext: &[u8]) -> Result<Signer, CredentialError> {
    if plaintext.len() < PLAINTEXT_LEN || !plaintext.starts_with(&PKCS8_HEADER) {
        return Err(CredentialError::MalformedWallet("invalid pkcs8 header".into()));
    }
    let secret_start = PKCS8_HEADER.len();
    let divider_start = secret_start + SECRET_LEN;
    let public_start = divider_start + PKCS8_DIVIDER.len();

    if plaintext[divider_start..public_start] != PKCS8_DIVIDER {
        return Err(CredentialError::MalformedWallet("invalid pkcs8 divider".into()));
    }

    let mut seed = [0u8; 32];
    seed.copy_from_slice(&plaintext[secret_start..secret_start + 32]);
    let signer = Signer::from_seed(&seed);

    let embedded_public = &plaintext[secret_start + 32..divider_start];
    let stored_public = &plaintext[public_start..public_start + PUBLIC_LEN];
    if embedded_public != signer.public_key() || stored_public != signer.public_key() {
        return Err(CredentialError::KeyMismatch);
    }
    Ok(signer)
}

/// `"type": "scrypt"` と `"type": ["scrypt", ...]` の両方を受け付ける
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}
