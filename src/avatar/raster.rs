//! # 栅格化模块
//!
//! ## 设计思路
//!
//! 模拟画布的 `setTransform + drawImage` 语义：每次裁剪变化都重建目标缓冲
//! （相当于重设画布宽高导致的隐式清空），不做增量更新。
//! 同一裁剪框重复绘制结果完全一致。
//!
//! ## 实现思路
//!
//! 1. 由几何模块得到 `RasterPlan`，为空则直接返回（空操作）。
//! 2. 按目标尺寸重建缓冲，变换重置为 `(pr, 0, 0, pr, 0, 0)`，平滑质量设为配置值。
//! 3. 源矩形超出图片部分被裁掉，目标区域按比例收缩，未覆盖像素保持透明。
//! 4. 整数对齐且 1:1 的区域直接拷贝像素；否则用 `fast_image_resize` 重采样，
//!    失败时回退 `image::imageops::resize`。

use fast_image_resize as fr;
use image::{ImageBuffer, Rgba, RgbaImage, imageops};

use super::config::SmoothingQuality;
use super::geometry::{CropRegion, PixelSize, RasterPlan, plan_raster};
use super::source::ImageSource;
use super::AvatarError;

/// 二维仿射变换 `(a, b, c, d, e, f)`，语义同画布 `setTransform`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Transform {
    pub fn identity() -> Self {
        Self::scale(1.0)
    }

    pub fn scale(factor: f64) -> Self {
        Self {
            a: factor,
            b: 0.0,
            c: 0.0,
            d: factor,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }
}

/// 离屏 RGBA 缓冲，保存裁剪结果。
#[derive(Debug, Clone)]
pub struct RasterBuffer {
    image: RgbaImage,
    transform: Transform,
    smoothing: SmoothingQuality,
}

impl RasterBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            transform: Transform::identity(),
            smoothing: SmoothingQuality::Low,
        }
    }

    /// 重设尺寸：像素清空、变换复位。
    fn reset(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
        self.transform = Transform::identity();
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn smoothing(&self) -> SmoothingQuality {
        self.smoothing
    }
}

impl Default for RasterBuffer {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// 目标缓冲上的整数像素区域。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DestRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

/// 栅格化器：把裁剪区域绘制到缓冲，并记录实际绘制次数。
#[derive(Debug)]
pub struct Rasterizer {
    quality: SmoothingQuality,
    max_pixels: u64,
    renders: u64,
}

impl Rasterizer {
    pub fn new(quality: SmoothingQuality) -> Self {
        Self {
            quality,
            max_pixels: u64::MAX,
            renders: 0,
        }
    }

    /// 目标缓冲像素上限（`width * height`）。
    pub fn with_pixel_limit(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    /// 绘制计划是否在像素上限之内。
    pub fn fits(&self, plan: &RasterPlan) -> bool {
        plan.pixel_count() <= self.max_pixels
    }

    /// 实际执行过的绘制次数（空操作不计入）。
    pub fn render_count(&self) -> u64 {
        self.renders
    }

    /// 绘制裁剪区域；任一输入缺失或裁剪框无面积时为空操作，返回 `None`。
    pub fn draw(
        &mut self,
        source: Option<&ImageSource>,
        buffer: Option<&mut RasterBuffer>,
        crop: Option<&CropRegion>,
        pixel_ratio: f64,
    ) -> Option<RasterPlan> {
        let (Some(source), Some(buffer), Some(crop)) = (source, buffer, crop) else {
            return None;
        };

        let plan = plan_raster(source.natural(), source.displayed(), pixel_ratio, crop)?;
        if !self.fits(&plan) {
            log::warn!(
                "⚠️ 目标缓冲 {}x{} 超出像素上限 {}，跳过绘制",
                plan.target_width,
                plan.target_height,
                self.max_pixels
            );
            return None;
        }

        buffer.reset(plan.target_width, plan.target_height);
        buffer.transform = Transform::scale(plan.pixel_ratio);
        buffer.smoothing = self.quality;

        if let Some(dest) = Self::clipped_destination(&plan, source.natural(), buffer) {
            let clipped = Self::clip_source(&plan, source.natural());
            let patch = self.sample(source.image(), clipped, dest);
            imageops::replace(&mut buffer.image, &patch, dest.x as i64, dest.y as i64);
        }

        self.renders += 1;
        log::debug!(
            "🖼️ 裁剪预览已重绘 - 目标尺寸: {}x{} scale=({:.3}, {:.3}) pr={}",
            plan.target_width,
            plan.target_height,
            plan.scale.x,
            plan.scale.y,
            plan.pixel_ratio
        );

        Some(plan)
    }

    /// 源矩形与图片边界求交：`(x0, y0, x1, y1)`。
    fn clip_source(plan: &RasterPlan, natural: PixelSize) -> (f64, f64, f64, f64) {
        let src = plan.source;
        (
            src.x.max(0.0),
            src.y.max(0.0),
            (src.x + src.width).min(natural.width),
            (src.y + src.height).min(natural.height),
        )
    }

    /// 把裁剪后的源区域映射到目标缓冲（经过变换）的整数区域。
    fn clipped_destination(
        plan: &RasterPlan,
        natural: PixelSize,
        buffer: &RasterBuffer,
    ) -> Option<DestRect> {
        let (x0, y0, x1, y1) = Self::clip_source(plan, natural);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        let src = plan.source;
        let logical = plan.logical_destination();
        let kx = logical.width / src.width;
        let ky = logical.height / src.height;

        let (dx0, dy0) = buffer.transform.apply((x0 - src.x) * kx, (y0 - src.y) * ky);
        let (dx1, dy1) = buffer.transform.apply((x1 - src.x) * kx, (y1 - src.y) * ky);

        let left = (dx0.round().max(0.0) as u32).min(buffer.width());
        let top = (dy0.round().max(0.0) as u32).min(buffer.height());
        let right = (dx1.round().max(0.0) as u32).min(buffer.width());
        let bottom = (dy1.round().max(0.0) as u32).min(buffer.height());

        if right <= left || bottom <= top {
            return None;
        }

        Some(DestRect {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }

    fn sample(
        &self,
        image: &RgbaImage,
        (x0, y0, x1, y1): (f64, f64, f64, f64),
        dest: DestRect,
    ) -> RgbaImage {
        let aligned = [x0, y0, x1, y1].iter().all(|v| v.fract() == 0.0);
        if aligned && (x1 - x0) as u32 == dest.width && (y1 - y0) as u32 == dest.height {
            return imageops::crop_imm(image, x0 as u32, y0 as u32, dest.width, dest.height).to_image();
        }

        match self.resample_with_fast_image_resize(image, (x0, y0, x1 - x0, y1 - y0), dest) {
            Ok(patch) => patch,
            Err(err) => {
                log::warn!("⚠️ fast_image_resize 重采样失败，回退 image::resize：{}", err);
                let left = x0.floor() as u32;
                let top = y0.floor() as u32;
                let width = ((x1.ceil() as u32).saturating_sub(left)).max(1);
                let height = ((y1.ceil() as u32).saturating_sub(top)).max(1);
                let region = imageops::crop_imm(image, left, top, width, height).to_image();
                imageops::resize(&region, dest.width, dest.height, self.quality.filter())
            }
        }
    }

    fn resample_with_fast_image_resize(
        &self,
        image: &RgbaImage,
        (left, top, width, height): (f64, f64, f64, f64),
        dest: DestRect,
    ) -> Result<RgbaImage, AvatarError> {
        let src_image = fr::images::ImageRef::new(
            image.width(),
            image.height(),
            image.as_raw(),
            fr::PixelType::U8x4,
        )
        .map_err(|e| AvatarError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

        let mut dst_image = fr::images::Image::new(dest.width, dest.height, fr::PixelType::U8x4);

        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new()
            .resize_alg(self.resize_alg())
            .crop(left, top, width, height);

        resizer
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| AvatarError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

        ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(dest.width, dest.height, dst_image.into_vec())
            .ok_or_else(|| AvatarError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
    }

    fn resize_alg(&self) -> fr::ResizeAlg {
        match self.quality {
            SmoothingQuality::Low => fr::ResizeAlg::Nearest,
            SmoothingQuality::Medium => fr::ResizeAlg::Convolution(fr::FilterType::Bilinear),
            SmoothingQuality::High => fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3),
        }
    }
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new(SmoothingQuality::High)
    }
}
