//! # 加载与解码模块
//!
//! ## 设计思路
//!
//! 统一处理不同来源（文件选择 / Data URL / 拖放字节）的原始字节加载，
//! 并在“尽可能早”的阶段执行输入校验。目标是尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! 1. 文件：存在性 + metadata 体积限制 + 读取。
//! 2. Base64：格式解析 + 解码前体积估算 + 解码后体积限制。
//! 3. 文件签名（magic bytes）校验，拒绝非图片内容。
//! 4. 读取 header 尺寸，按像素与内存上限快速拒绝，再完整解码为 RGBA。

use base64::{Engine as _, engine::general_purpose};
use image::{GenericImageView, RgbaImage};
use std::io::Cursor;
use std::path::Path;

use super::source::{ImageInput, RawImageData};
use super::{AvatarConfig, AvatarError};

/// 图片加载器，持有一次会话的配置快照。
pub(crate) struct ImageLoader<'a> {
    config: &'a AvatarConfig,
}

impl<'a> ImageLoader<'a> {
    pub(crate) fn new(config: &'a AvatarConfig) -> Self {
        Self { config }
    }

    /// 加载并解码为 RGBA 像素。
    pub(crate) fn load_rgba(&self, input: ImageInput) -> Result<RgbaImage, AvatarError> {
        let raw = self.load(input)?;
        self.decode(raw)
    }

    pub(crate) fn load(&self, input: ImageInput) -> Result<RawImageData, AvatarError> {
        match input {
            ImageInput::FilePath(path) => self.load_from_file(&path),
            ImageInput::Base64(data) => self.load_from_base64(&data),
            ImageInput::Bytes(bytes) => self.load_from_bytes(bytes),
        }
    }

    fn load_from_file(&self, path: &str) -> Result<RawImageData, AvatarError> {
        log::info!("📁 开始读取本地图片 - 路径: {}", path);

        let file_path = Path::new(path);
        if !file_path.exists() {
            return Err(AvatarError::FileSystem(format!("文件不存在：{}", path)));
        }

        let metadata = std::fs::metadata(file_path)
            .map_err(|e| AvatarError::FileSystem(format!("无法读取文件信息：{}", e)))?;

        if metadata.len() > self.config.max_file_size {
            return Err(AvatarError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                self.config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = std::fs::read(file_path)
            .map_err(|e| AvatarError::FileSystem(format!("无法读取图片文件：{}", e)))?;
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "file",
        })
    }

    fn load_from_base64(&self, data: &str) -> Result<RawImageData, AvatarError> {
        log::info!("📝 开始处理 base64 图片");

        let bytes = Self::parse_base64_with_limit(data, self.config.max_file_size)?;

        if bytes.len() as u64 > self.config.max_file_size {
            return Err(AvatarError::ResourceLimit(format!(
                "Base64 解码后体积过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                self.config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "base64",
        })
    }

    fn load_from_bytes(&self, bytes: Vec<u8>) -> Result<RawImageData, AvatarError> {
        if bytes.len() as u64 > self.config.max_file_size {
            return Err(AvatarError::ResourceLimit(format!(
                "图片体积过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                self.config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "bytes",
        })
    }

    /// 解码原始字节：先读 header 尺寸做限制检查，再完整解码。
    pub(crate) fn decode(&self, raw: RawImageData) -> Result<RgbaImage, AvatarError> {
        let (header_width, header_height) = Self::inspect_dimensions_from_memory(&raw.bytes)?;
        self.validate_pixel_limits(header_width, header_height)?;

        let decoded = image::load_from_memory(&raw.bytes)
            .map_err(|e| AvatarError::Decode(format!("图片解码失败：{}", e)))?;

        let (width, height) = decoded.dimensions();
        self.validate_pixel_limits(width, height)?;

        log::info!(
            "✅ 图片解码成功 - 来源: {} 尺寸: {}x{}",
            raw.source_hint,
            width,
            height
        );

        Ok(decoded.to_rgba8())
    }

    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), AvatarError> {
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| AvatarError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

        reader
            .into_dimensions()
            .map_err(|e| AvatarError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
    }

    /// 校验像素数量与预计解码内存是否超过配置上限。
    fn validate_pixel_limits(&self, width: u32, height: u32) -> Result<(), AvatarError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| AvatarError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > self.config.max_decoded_pixels {
            return Err(AvatarError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, self.config.max_decoded_pixels
            )));
        }

        let estimated = pixels
            .checked_mul(4)
            .ok_or_else(|| AvatarError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > self.config.max_decoded_bytes {
            return Err(AvatarError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                self.config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, AvatarError> {
        let len = base64_data.trim().len() as u64;
        let groups = len
            .checked_add(3)
            .ok_or_else(|| AvatarError::ResourceLimit("Base64 输入长度溢出".to_string()))?
            / 4;

        groups
            .checked_mul(3)
            .ok_or_else(|| AvatarError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
    }

    /// 解析 Base64 输入（支持 `data:image/...;base64,` 与纯 Base64）。
    fn parse_base64_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, AvatarError> {
        let normalized = data.trim();

        let payload = if normalized.starts_with("data:") {
            if !normalized.starts_with("data:image/") {
                return Err(AvatarError::InvalidFormat("Data URL 不是图片类型".to_string()));
            }
            let base64_start = normalized
                .find(";base64,")
                .ok_or_else(|| AvatarError::InvalidFormat("缺少 base64 标记".to_string()))?;
            &normalized[base64_start + 8..]
        } else {
            normalized
        };

        let estimated_len = Self::estimate_base64_decoded_upper_bound_len(payload)?;
        if estimated_len > max_file_size {
            return Err(AvatarError::ResourceLimit(format!(
                "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated_len as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| AvatarError::Decode(format!("Base64 解码失败：{}", e)))
    }

    /// 通过文件签名（magic bytes）校验输入是否为图片。
    fn validate_image_signature(bytes: &[u8]) -> Result<(), AvatarError> {
        if bytes.is_empty() {
            return Err(AvatarError::InvalidFormat("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| AvatarError::InvalidFormat("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(AvatarError::InvalidFormat(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Write;

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn load_from_base64_rejects_non_image_payload() {
        let config = AvatarConfig::default();
        let loader = ImageLoader::new(&config);

        let result = loader.load(ImageInput::Base64("SGVsbG8=".to_string()));

        assert!(matches!(result, Err(AvatarError::InvalidFormat(_))));
    }

    #[test]
    fn load_accepts_data_url_from_file_reader() {
        let config = AvatarConfig::default();
        let loader = ImageLoader::new(&config);
        let data_url = format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(create_png_bytes(32, 16))
        );

        let image = loader
            .load_rgba(ImageInput::Base64(data_url))
            .expect("data url should decode");

        assert_eq!(image.dimensions(), (32, 16));
    }

    #[test]
    fn data_url_with_non_image_mime_is_rejected() {
        let result = ImageLoader::parse_base64_with_limit("data:text/plain;base64,SGVsbG8=", u64::MAX);
        assert!(matches!(result, Err(AvatarError::InvalidFormat(_))));
    }

    #[test]
    fn parse_base64_with_limit_rejects_large_payload_before_decode() {
        let huge = "A".repeat(1024 * 1024);
        let result = ImageLoader::parse_base64_with_limit(&huge, 32);

        assert!(matches!(result, Err(AvatarError::ResourceLimit(_))));
    }

    #[test]
    fn decode_rejects_too_many_pixels() {
        let mut config = AvatarConfig::default();
        config.max_decoded_pixels = 10_000;
        let loader = ImageLoader::new(&config);

        let result = loader.load_rgba(ImageInput::Bytes(create_png_bytes(200, 200)));

        assert!(matches!(result, Err(AvatarError::ResourceLimit(_))));
    }

    #[test]
    fn load_from_file_reads_and_checks_size() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        file.write_all(&create_png_bytes(8, 8)).expect("write temp png");
        let path = file.path().to_string_lossy().to_string();

        let config = AvatarConfig::default();
        let image = ImageLoader::new(&config)
            .load_rgba(ImageInput::FilePath(path.clone()))
            .expect("file should load");
        assert_eq!(image.dimensions(), (8, 8));

        let mut tiny = AvatarConfig::default();
        tiny.max_file_size = 4;
        let result = ImageLoader::new(&tiny).load(ImageInput::FilePath(path));
        assert!(matches!(result, Err(AvatarError::ResourceLimit(_))));
    }

    #[test]
    fn load_from_missing_file_is_file_system_error() {
        let config = AvatarConfig::default();
        let result = ImageLoader::new(&config).load(ImageInput::FilePath("/definitely/not/here.png".to_string()));
        assert!(matches!(result, Err(AvatarError::FileSystem(_))));
    }
}
