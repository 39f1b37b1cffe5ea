//! # 资源编码模块
//!
//! ## 设计思路
//!
//! 把栅格化结果编码为无损 PNG。编码是 CPU 密集操作，放到阻塞线程执行，
//! 避免阻塞 async 运行时；同步版本供导出（下载）使用。
//! PNG 为无损格式，不存在“质量”参数。

use std::io::Write;
use std::path::Path;

use bytes::Bytes;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use super::preview::{PreviewHandle, PreviewRegistry};
use super::raster::RasterBuffer;
use super::AvatarError;

pub const PNG_MIME: &str = "image/png";
pub const PNG_FILE_NAME: &str = "avatar.png";

/// 编码后的图片资源。
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAsset {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
}

impl EncodedAsset {
    pub fn mime(&self) -> &'static str {
        PNG_MIME
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// PNG 编码器 + 预览句柄工厂。
#[derive(Debug, Clone, Default)]
pub struct AssetEncoder {
    previews: PreviewRegistry,
}

impl AssetEncoder {
    pub fn new(previews: PreviewRegistry) -> Self {
        Self { previews }
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// 异步编码：在阻塞线程池中执行。
    pub async fn encode(&self, buffer: &RasterBuffer) -> Result<EncodedAsset, AvatarError> {
        let image = buffer.image().clone();
        tokio::task::spawn_blocking(move || encode_png(&image))
            .await
            .map_err(|e| AvatarError::Encode(format!("编码任务异常终止：{}", e)))?
    }

    /// 同步编码。
    pub fn encode_blocking(&self, buffer: &RasterBuffer) -> Result<EncodedAsset, AvatarError> {
        encode_png(buffer.image())
    }

    /// 为编码结果创建临时预览句柄；调用方用完应立即 `release`。
    pub fn preview(&self, asset: &EncodedAsset) -> PreviewHandle {
        self.previews.create(asset.bytes.clone())
    }

    /// 导出为本地 PNG 文件（对应“下载”按钮）。
    pub fn export(&self, buffer: &RasterBuffer, path: &Path) -> Result<EncodedAsset, AvatarError> {
        let asset = self.encode_blocking(buffer)?;

        let mut file = std::fs::File::create(path)
            .map_err(|e| AvatarError::FileSystem(format!("无法创建导出文件：{}", e)))?;
        file.write_all(&asset.bytes)
            .map_err(|e| AvatarError::FileSystem(format!("写入导出文件失败：{}", e)))?;

        log::info!(
            "💾 裁剪结果已导出 - 路径: {} 尺寸: {}x{} 大小: {}KB",
            path.display(),
            asset.width,
            asset.height,
            asset.len() / 1024
        );

        Ok(asset)
    }
}

fn encode_png(image: &RgbaImage) -> Result<EncodedAsset, AvatarError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(AvatarError::Encode("栅格缓冲为空，无法编码".to_string()));
    }

    let mut out = Vec::with_capacity((width as usize * height as usize) / 2);
    PngEncoder::new_with_quality(&mut out, CompressionType::Best, PngFilterType::Adaptive)
        .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
        .map_err(|e| AvatarError::Encode(format!("PNG 编码失败：{}", e)))?;

    log::debug!("📦 PNG 编码完成 - {}x{} {} bytes", width, height, out.len());

    Ok(EncodedAsset {
        bytes: Bytes::from(out),
        width,
        height,
    })
}
