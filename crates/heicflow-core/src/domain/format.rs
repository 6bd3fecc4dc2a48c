//! Format sniffing - HEIC コンテナの判定
//!
//! コーデックに渡す前に ISO-BMFF の `ftyp` box を見て、HEIF 系の brand かどうかを判定します。
//! 中身のデコード可否まではわからないので、あくまで早期リジェクト用です。

use super::errors::ConversionError;

/// HEIF / HEIC を示す major / compatible brand
const HEIF_BRANDS: [&[u8; 4]; 10] = [
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"hevm", b"hevs", b"mif1", b"msf1",
];

/// PNG シグネチャ
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// 入力が HEIF コンテナに見えるか判定する
///
/// `ftyp` box の major brand と compatible brands のどれかが HEIF 系なら OK。
pub fn sniff_heic(bytes: &[u8]) -> Result<(), ConversionError> {
    if bytes.len() < 16 || &bytes[4..8] != b"ftyp" {
        return Err(ConversionError::NotHeic);
    }

    let box_size = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    // box_size < 16 は major brand + minor version すら入らない
    if box_size < 16 || box_size > bytes.len() {
        return Err(ConversionError::NotHeic);
    }

    let major = &bytes[8..12];
    let compatible = bytes[16..box_size].chunks_exact(4);
    let is_heif = std::iter::once(major)
        .chain(compatible)
        .any(|brand| HEIF_BRANDS.iter().any(|known| brand == &known[..]));

    if is_heif {
        Ok(())
    } else {
        Err(ConversionError::NotHeic)
    }
}

/// バイト列が PNG シグネチャで始まるか
pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE)
}

/// テスト用の最小 `ftyp` box を作る
#[cfg(test)]
pub(crate) fn ftyp_box(major: &[u8; 4], compatible: &[&[u8; 4]]) -> Vec<u8> {
    let size = 16 + 4 * compatible.len();
    let mut buf = Vec::with_capacity(size);
    buf.extend_from_slice(&(size as u32).to_be_bytes());
    buf.extend_from_slice(b"ftyp");
    buf.extend_from_slice(major);
    buf.extend_from_slice(&0u32.to_be_bytes());
    for brand in compatible {
        buf.extend_from_slice(&brand[..]);
    }
    buf
}
