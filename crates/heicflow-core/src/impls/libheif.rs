//! LibHeifConverter - libheif によるプロセス内変換
//!
//! primary image を RGBA でデコードし、`image` クレートで PNG にエンコードします。
//! デコードは CPU バウンドなので `spawn_blocking` で実行します。

use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbaImage};
use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

use crate::domain::{ConversionError, sniff_heic};
use crate::ports::ImageConverter;

/// LibHeifConverter は libheif でデコードする
#[derive(Debug, Clone, Copy, Default)]
pub struct LibHeifConverter;

impl LibHeifConverter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ImageConverter for LibHeifConverter {
    async fn convert(&self, heic: Bytes) -> Result<Bytes, ConversionError> {
        sniff_heic(&heic)?;
        tokio::task::spawn_blocking(move || decode_to_png(&heic))
            .await
            .map_err(|e| ConversionError::Codec(format!("decode task failed: {e}")))?
    }
}

fn decode_to_png(bytes: &[u8]) -> Result<Bytes, ConversionError> {
    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(bytes)
        .map_err(|e| ConversionError::Decode(e.to_string()))?;
    if ctx.number_of_top_level_images() == 0 {
        return Err(ConversionError::NoImages);
    }

    // 2 枚目以降は無視する
    let handle = ctx
        .primary_image_handle()
        .map_err(|e| ConversionError::Decode(e.to_string()))?;
    let image = lib_heif
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgba), None)
        .map_err(|e| ConversionError::Decode(e.to_string()))?;

    let planes = image.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| ConversionError::Decode("no interleaved RGBA plane".into()))?;

    let row_len = plane.width as usize * 4;
    let mut rgba = Vec::with_capacity(row_len * plane.height as usize);
    for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
        rgba.extend_from_slice(&row[..row_len]);
    }
    let buffer = RgbaImage::from_raw(plane.width, plane.height, rgba)
        .ok_or_else(|| ConversionError::Decode("decoded plane has unexpected size".into()))?;

    encode_png(&DynamicImage::ImageRgba8(buffer))
}

fn encode_png(img: &DynamicImage) -> Result<Bytes, ConversionError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| ConversionError::Encode(e.to_string()))?;
    Ok(Bytes::from(buf.into_inner()))
}
