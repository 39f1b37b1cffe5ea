//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `ImageInput` 表示外部来源语义（文件选择 / 拖放 / Data URL）
//! - `RawImageData` 表示已加载但未解码的字节
//! - `ImageSource` 表示已解码图片及其固有尺寸与显示尺寸

use image::RgbaImage;

use super::AvatarError;
use super::geometry::{PixelSize, ScaleFactors};

/// 图片输入来源。
pub enum ImageInput {
    /// 本地文件路径来源。
    FilePath(String),
    /// Base64（支持 Data URL 与纯 Base64 字符串）。
    Base64(String),
    /// 已在内存中的原始字节（例如拖放读取结果）。
    Bytes(Vec<u8>),
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 已解码图片：像素数据 + 固有尺寸 + 显示尺寸。
///
/// 创建后只读；显示尺寸变化时通过 [`ImageSource::with_displayed`] 生成新值。
#[derive(Debug, Clone)]
pub struct ImageSource {
    image: RgbaImage,
    displayed: PixelSize,
}

impl ImageSource {
    /// 以指定显示尺寸构建；显示尺寸任一边为 0 视为无效。
    pub fn new(image: RgbaImage, displayed: PixelSize) -> Result<Self, AvatarError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(AvatarError::InvalidFormat("图片固有尺寸为 0".to_string()));
        }
        if !displayed.is_drawable() {
            return Err(AvatarError::InvalidFormat(format!(
                "图片显示尺寸无效：{}x{}",
                displayed.width, displayed.height
            )));
        }

        Ok(Self { image, displayed })
    }

    /// 以固有尺寸作为显示尺寸构建（1:1 显示）。
    pub fn at_natural_size(image: RgbaImage) -> Result<Self, AvatarError> {
        let displayed = PixelSize::new(image.width() as f64, image.height() as f64);
        Self::new(image, displayed)
    }

    /// 更新显示尺寸（例如窗口布局变化）。
    pub fn with_displayed(self, displayed: PixelSize) -> Result<Self, AvatarError> {
        Self::new(self.image, displayed)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn natural(&self) -> PixelSize {
        PixelSize::new(self.image.width() as f64, self.image.height() as f64)
    }

    pub fn displayed(&self) -> PixelSize {
        self.displayed
    }

    pub fn scale_factors(&self) -> ScaleFactors {
        ScaleFactors::between(self.natural(), self.displayed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_displayed_dimensions() {
        let image = RgbaImage::new(10, 10);
        let result = ImageSource::new(image, PixelSize::new(0.0, 10.0));
        assert!(matches!(result, Err(AvatarError::InvalidFormat(_))));
    }

    #[test]
    fn scale_factors_follow_displayed_size() {
        let image = RgbaImage::new(600, 300);
        let source = ImageSource::new(image, PixelSize::new(300.0, 150.0)).expect("valid source");
        let scale = source.scale_factors();

        assert_eq!(scale.x, 2.0);
        assert_eq!(scale.y, 2.0);
    }
}
