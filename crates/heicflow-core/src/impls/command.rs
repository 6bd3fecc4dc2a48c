//! CommandConverter - 外部コマンドによる HEIC → PNG 変換
//!
//! libheif に付属する `heif-dec <input> <output.png>` を子プロセスとして呼び出します。
//! 入出力は一時ディレクトリ経由で受け渡し、ディレクトリは変換後に自動で削除されます。
//!
//! トップレベル画像が複数ある HEIC では `heif-dec` は `output-1.png`, `output-2.png`, ...
//! を書き出すので、そのときは 1 枚目だけを採用します。

use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use image::ImageFormat;
use tokio::process::Command;
use tracing::debug;

use crate::domain::{ConversionError, sniff_heic};
use crate::ports::ImageConverter;

/// 複数画像のときに書き出される 1 枚目
const FIRST_OF_MANY: &str = "output-1.png";

/// CommandConverter は `program [args...] <input> <output>` を実行する
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// 入出力パスの前に付ける引数
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl ImageConverter for CommandConverter {
    async fn convert(&self, heic: Bytes) -> Result<Bytes, ConversionError> {
        sniff_heic(&heic)?;

        let workdir = tempfile::tempdir()
            .map_err(|e| ConversionError::Codec(format!("temp dir: {e}")))?;
        let input = workdir.path().join("input.heic");
        let output = workdir.path().join("output.png");

        tokio::fs::write(&input, &heic)
            .await
            .map_err(|e| ConversionError::Codec(format!("write input: {e}")))?;

        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(&input)
            .arg(&output)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ConversionError::Codec(format!("failed to run {}: {e}", self.program.display()))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ConversionError::Decode(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                stderr.trim()
            )));
        }

        let png = match tokio::fs::read(&output).await {
            Ok(png) => png,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::read(workdir.path().join(FIRST_OF_MANY))
                    .await
                    .map_err(|e| ConversionError::Decode(format!("no output image: {e}")))?
            }
            Err(e) => return Err(ConversionError::Decode(format!("no output image: {e}"))),
        };
        if !matches!(image::guess_format(&png), Ok(ImageFormat::Png)) {
            return Err(ConversionError::Encode("converter output is not a PNG".into()));
        }

        debug!(input_size = heic.len(), output_size = png.len(), "converted with external codec");
        Ok(Bytes::from(png))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::format::ftyp_box;
    use image::{DynamicImage, ImageFormat};
    use std::io::Cursor;

    fn heic_like() -> Bytes {
        let mut bytes = ftyp_box(b"heic", &[b"mif1", b"heic"]);
        bytes.extend_from_slice(&[0u8; 64]);
        Bytes::from(bytes)
    }

    fn png_file(dir: &std::path::Path, name: &str, side: u32) -> PathBuf {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(side, side)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        let path = dir.join(name);
        std::fs::write(&path, buf.into_inner()).unwrap();
        path
    }

    fn png_fixture(dir: &std::path::Path) -> PathBuf {
        png_file(dir, "fixture.png", 4)
    }

    /// `sh -c <script> sh <input> <output>` として実行するコンバータ
    fn shell(script: String) -> CommandConverter {
        CommandConverter::new("sh").with_args(["-c".to_string(), script, "sh".to_string()])
    }

    #[tokio::test]
    async fn reads_back_png_written_by_codec() {
        let fixtures = tempfile::tempdir().unwrap();
        let png = png_fixture(fixtures.path());
        let converter = shell(format!("cp '{}' \"$2\"", png.display()));

        let out = converter.convert(heic_like()).await.unwrap();
        assert_eq!(out.as_ref(), std::fs::read(&png).unwrap().as_slice());
    }

    #[tokio::test]
    async fn multi_image_output_takes_the_first() {
        let fixtures = tempfile::tempdir().unwrap();
        let first = png_file(fixtures.path(), "first.png", 4);
        let second = png_file(fixtures.path(), "second.png", 2);
        let converter = shell(format!(
            "cp '{}' \"${{2%.png}}-1.png\"; cp '{}' \"${{2%.png}}-2.png\"",
            first.display(),
            second.display()
        ));

        let out = converter.convert(heic_like()).await.unwrap();
        assert_eq!(out.as_ref(), std::fs::read(&first).unwrap().as_slice());
    }

    #[tokio::test]
    async fn codec_without_output_is_decode_error() {
        let converter = shell("true".to_string());
        let err = converter.convert(heic_like()).await.unwrap_err();
        assert!(matches!(err, ConversionError::Decode(msg) if msg.starts_with("no output image")));
    }

    #[tokio::test]
    async fn non_heic_input_never_reaches_codec() {
        // 実行されたら失敗するプログラムを指定しておく
        let converter = CommandConverter::new("/nonexistent/heif-dec");
        let err = converter
            .convert(Bytes::from_static(b"plain text"))
            .await
            .unwrap_err();
        assert_eq!(err, ConversionError::NotHeic);
    }

    #[tokio::test]
    async fn missing_program_is_codec_error() {
        let converter = CommandConverter::new("/nonexistent/heif-dec");
        let err = converter.convert(heic_like()).await.unwrap_err();
        assert!(matches!(err, ConversionError::Codec(_)));
    }

    #[tokio::test]
    async fn failing_codec_is_decode_error() {
        let converter = shell("echo 'no image in file' >&2; exit 1".to_string());
        let err = converter.convert(heic_like()).await.unwrap_err();
        match err {
            ConversionError::Decode(msg) => assert!(msg.contains("no image in file")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_png_output_is_rejected() {
        let converter = shell("printf 'GIF89a' > \"$2\"".to_string());
        let err = converter.convert(heic_like()).await.unwrap_err();
        assert!(matches!(err, ConversionError::Encode(_)));
    }
}
