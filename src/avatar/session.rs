//! # 编辑会话模块
//!
//! ## 设计思路
//!
//! 一个会话对应一次“选择图片 → 调整裁剪框 → 确认/下载/关闭”的交互：
//! 持有源图、当前裁剪框、设备像素比与预览缓冲。每次裁剪变化都完整重绘预览。
//!
//! 无面积的裁剪框不会触发重绘，但会被记为当前裁剪框，此时无法确认上传或导出，
//! 避免把旧的预览内容当作新结果提交。关闭后所有操作返回 `SessionClosed`。
//!
//! 设备像素比限制在 `(0, 16]`；结果缓冲超过 `max_raster_pixels` 的变更直接拒绝，
//! 会话保持变更前的状态。

use std::path::Path;

use super::encoder::{AssetEncoder, EncodedAsset};
use super::geometry::{CropRegion, PixelSize, RasterPlan, plan_raster};
use super::loader::ImageLoader;
use super::raster::{RasterBuffer, Rasterizer};
use super::source::{ImageInput, ImageSource};
use super::{AvatarConfig, AvatarError};

/// 允许的最大设备像素比。
pub const MAX_PIXEL_RATIO: f64 = 16.0;

pub struct EditSession {
    source: Option<ImageSource>,
    crop: Option<CropRegion>,
    pixel_ratio: f64,
    rasterizer: Rasterizer,
    preview: Option<RasterBuffer>,
    encoder: AssetEncoder,
}

impl EditSession {
    /// 加载并解码图片，按初始裁剪框渲染第一帧预览。
    ///
    /// `displayed` 为 `None` 时按固有尺寸 1:1 显示。
    pub fn open(
        input: ImageInput,
        displayed: Option<PixelSize>,
        pixel_ratio: f64,
        config: &AvatarConfig,
        encoder: AssetEncoder,
    ) -> Result<Self, AvatarError> {
        let image = ImageLoader::new(config).load_rgba(input)?;
        let source = match displayed {
            Some(size) => ImageSource::new(image, size)?,
            None => ImageSource::at_natural_size(image)?,
        };
        Self::new(source, pixel_ratio, config, encoder)
    }

    pub fn new(
        source: ImageSource,
        pixel_ratio: f64,
        config: &AvatarConfig,
        encoder: AssetEncoder,
    ) -> Result<Self, AvatarError> {
        validate_pixel_ratio(pixel_ratio)?;

        let crop = CropRegion::initial(source.displayed(), config.initial_crop_size, config.initial_crop_aspect);
        let rasterizer = Rasterizer::new(config.smoothing).with_pixel_limit(config.max_raster_pixels);
        check_raster_limit(&rasterizer, source.natural(), source.displayed(), pixel_ratio, &crop)?;

        let mut session = Self {
            source: Some(source),
            crop: Some(crop),
            pixel_ratio,
            rasterizer,
            preview: Some(RasterBuffer::default()),
            encoder,
        };
        session.redraw();

        Ok(session)
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<&ImageSource> {
        self.source.as_ref()
    }

    pub fn crop(&self) -> Option<&CropRegion> {
        self.crop.as_ref()
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    pub fn preview(&self) -> Option<&RasterBuffer> {
        self.preview.as_ref()
    }

    pub fn render_count(&self) -> u64 {
        self.rasterizer.render_count()
    }

    /// 裁剪框变化（拖拽结束）；越界部分会被限制在显示区域内。
    ///
    /// 返回本次绘制参数；无面积时为 `None` 且预览不变。
    pub fn set_crop(&mut self, crop: CropRegion) -> Result<Option<RasterPlan>, AvatarError> {
        let source = self.open_source()?;
        let clamped = crop.clamped_to(source.displayed());
        check_raster_limit(&self.rasterizer, source.natural(), source.displayed(), self.pixel_ratio, &clamped)?;
        self.crop = Some(clamped);
        Ok(self.redraw())
    }

    /// 设备像素比变化（例如窗口移动到另一块屏幕）。
    pub fn set_pixel_ratio(&mut self, pixel_ratio: f64) -> Result<Option<RasterPlan>, AvatarError> {
        let source = self.open_source()?;
        validate_pixel_ratio(pixel_ratio)?;
        if let Some(crop) = &self.crop {
            check_raster_limit(&self.rasterizer, source.natural(), source.displayed(), pixel_ratio, crop)?;
        }
        self.pixel_ratio = pixel_ratio;
        Ok(self.redraw())
    }

    /// 显示尺寸变化；保持裁剪框的显示坐标不变，必要时收缩到新区域内。
    pub fn set_displayed_size(&mut self, displayed: PixelSize) -> Result<Option<RasterPlan>, AvatarError> {
        if !displayed.is_drawable() {
            return Err(AvatarError::InvalidFormat(format!(
                "图片显示尺寸无效：{}x{}",
                displayed.width, displayed.height
            )));
        }
        let natural = self.open_source()?.natural();
        let crop = self.crop.map(|crop| crop.clamped_to(displayed));
        if let Some(crop) = &crop {
            check_raster_limit(&self.rasterizer, natural, displayed, self.pixel_ratio, crop)?;
        }

        let source = self.source.take().ok_or(AvatarError::SessionClosed)?;
        self.source = Some(source.with_displayed(displayed)?);
        self.crop = crop;
        Ok(self.redraw())
    }

    /// 确认当前预览可以提交。
    pub fn confirmed_preview(&self) -> Result<&RasterBuffer, AvatarError> {
        self.open_source()?;

        let has_area = self.crop.as_ref().is_some_and(CropRegion::has_area);
        match self.preview.as_ref() {
            Some(buffer) if has_area && buffer.width() > 0 && buffer.height() > 0 => Ok(buffer),
            _ => Err(AvatarError::InvalidFormat("裁剪区域为空，无法提交".to_string())),
        }
    }

    /// 下载：把当前预览导出为 PNG 文件。
    pub fn export_png(&self, path: &Path) -> Result<EncodedAsset, AvatarError> {
        let buffer = self.confirmed_preview()?;
        self.encoder.export(buffer, path)
    }

    /// 关闭会话并释放图片与预览。
    pub fn dismiss(&mut self) {
        if self.source.take().is_some() {
            log::debug!("🧹 编辑会话已关闭 - 共绘制 {} 次", self.rasterizer.render_count());
        }
        self.crop = None;
        self.preview = None;
    }

    fn open_source(&self) -> Result<&ImageSource, AvatarError> {
        self.source.as_ref().ok_or(AvatarError::SessionClosed)
    }

    fn redraw(&mut self) -> Option<RasterPlan> {
        self.rasterizer.draw(
            self.source.as_ref(),
            self.preview.as_mut(),
            self.crop.as_ref(),
            self.pixel_ratio,
        )
    }
}

fn validate_pixel_ratio(pixel_ratio: f64) -> Result<(), AvatarError> {
    if pixel_ratio.is_finite() && pixel_ratio > 0.0 && pixel_ratio <= MAX_PIXEL_RATIO {
        Ok(())
    } else {
        Err(AvatarError::InvalidFormat(format!(
            "设备像素比无效：{}（允许范围 0~{}）",
            pixel_ratio, MAX_PIXEL_RATIO
        )))
    }
}

/// 按候选状态预估结果缓冲大小，超出上限时拒绝变更。
fn check_raster_limit(
    rasterizer: &Rasterizer,
    natural: PixelSize,
    displayed: PixelSize,
    pixel_ratio: f64,
    crop: &CropRegion,
) -> Result<(), AvatarError> {
    match plan_raster(natural, displayed, pixel_ratio, crop) {
        Some(plan) if !rasterizer.fits(&plan) => Err(AvatarError::ResourceLimit(format!(
            "裁剪结果 {}x{} 超出像素上限",
            plan.target_width, plan.target_height
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> RgbaImage {
        ImageBuffer::from_fn(width, height, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255]))
    }

    fn session(width: u32, height: u32, displayed: PixelSize, pixel_ratio: f64) -> EditSession {
        let source = ImageSource::new(gradient(width, height), displayed).expect("valid source");
        EditSession::new(source, pixel_ratio, &AvatarConfig::default(), AssetEncoder::default())
            .expect("session should open")
    }

    #[test]
    fn opening_renders_initial_square_crop() {
        let session = session(800, 600, PixelSize::new(400.0, 300.0), 1.0);

        let crop = session.crop().expect("initial crop");
        assert_eq!((crop.width, crop.height), (290.0, 290.0));
        assert_eq!(session.render_count(), 1);

        let preview = session.preview().expect("preview buffer");
        assert_eq!((preview.width(), preview.height()), (580, 580));
    }

    #[test]
    fn zero_area_crop_keeps_preview_but_blocks_confirmation() {
        let mut session = session(100, 100, PixelSize::new(100.0, 100.0), 1.0);
        session.set_crop(CropRegion::px(0.0, 0.0, 40.0, 40.0)).expect("open session");
        let renders = session.render_count();

        let plan = session.set_crop(CropRegion::px(10.0, 10.0, 0.0, 30.0)).expect("open session");

        assert!(plan.is_none());
        assert_eq!(session.render_count(), renders);
        assert_eq!(session.preview().map(RasterBuffer::width), Some(40));
        assert!(matches!(session.confirmed_preview(), Err(AvatarError::InvalidFormat(_))));
    }

    #[test]
    fn crop_outside_display_is_clamped() {
        let mut session = session(100, 100, PixelSize::new(100.0, 100.0), 1.0);
        let plan = session
            .set_crop(CropRegion::px(80.0, 80.0, 50.0, 50.0))
            .expect("open session")
            .expect("clamped crop still has area");

        assert_eq!((plan.target_width, plan.target_height), (20, 20));
    }

    #[test]
    fn pixel_ratio_change_rerenders_at_device_resolution() {
        let mut session = session(200, 200, PixelSize::new(200.0, 200.0), 1.0);
        session.set_crop(CropRegion::px(0.0, 0.0, 50.0, 50.0)).expect("open session");

        session.set_pixel_ratio(3.0).expect("valid ratio");
        assert_eq!(session.preview().map(|b| (b.width(), b.height())), Some((150, 150)));
        assert!(session.set_pixel_ratio(0.0).is_err());
        assert_eq!(session.pixel_ratio(), 3.0);
    }

    #[test]
    fn extreme_pixel_ratio_is_rejected_before_allocation() {
        let source = ImageSource::new(RgbaImage::new(400, 400), PixelSize::new(400.0, 400.0)).expect("valid source");
        let result = EditSession::new(source, 20_000.0, &AvatarConfig::default(), AssetEncoder::default());
        assert!(matches!(result, Err(AvatarError::InvalidFormat(_))));

        let mut session = session(100, 100, PixelSize::new(100.0, 100.0), 1.0);
        assert!(matches!(session.set_pixel_ratio(MAX_PIXEL_RATIO + 1.0), Err(AvatarError::InvalidFormat(_))));
        session.set_pixel_ratio(MAX_PIXEL_RATIO).expect("upper bound is allowed");
    }

    #[test]
    fn oversized_raster_is_rejected_and_state_kept() {
        let mut config = AvatarConfig::default();
        config.max_raster_pixels = 100_000;
        let source = ImageSource::new(gradient(400, 400), PixelSize::new(400.0, 400.0)).expect("valid source");
        let mut session = EditSession::new(source, 1.0, &config, AssetEncoder::default()).expect("290x290 fits");
        let renders = session.render_count();

        assert!(matches!(session.set_pixel_ratio(2.0), Err(AvatarError::ResourceLimit(_))));
        assert!(matches!(
            session.set_displayed_size(PixelSize::new(300.0, 300.0)),
            Err(AvatarError::ResourceLimit(_))
        ));
        assert!(matches!(
            session.set_crop(CropRegion::px(0.0, 0.0, 400.0, 400.0)),
            Err(AvatarError::ResourceLimit(_))
        ));

        assert_eq!(session.pixel_ratio(), 1.0);
        assert_eq!(session.render_count(), renders);
        assert_eq!(session.crop().map(|c| (c.width, c.height)), Some((290.0, 290.0)));
        assert_eq!(session.source().map(ImageSource::displayed), Some(PixelSize::new(400.0, 400.0)));
        assert_eq!(session.preview().map(|b| (b.width(), b.height())), Some((290, 290)));

        config.max_raster_pixels = 10_000;
        let source = ImageSource::new(gradient(400, 400), PixelSize::new(400.0, 400.0)).expect("valid source");
        assert!(matches!(
            EditSession::new(source, 1.0, &config, AssetEncoder::default()),
            Err(AvatarError::ResourceLimit(_))
        ));
    }

    #[test]
    fn displayed_size_change_rescales_source_mapping() {
        let mut session = session(400, 400, PixelSize::new(400.0, 400.0), 1.0);
        session.set_crop(CropRegion::px(0.0, 0.0, 100.0, 100.0)).expect("open session");

        let plan = session
            .set_displayed_size(PixelSize::new(200.0, 200.0))
            .expect("valid size")
            .expect("crop has area");

        assert_eq!(plan.scale.x, 2.0);
        assert_eq!((plan.target_width, plan.target_height), (200, 200));
        assert!(session.set_displayed_size(PixelSize::new(0.0, 10.0)).is_err());
        assert!(session.is_open());
    }

    #[test]
    fn dismissed_session_rejects_all_operations() {
        let mut session = session(100, 100, PixelSize::new(100.0, 100.0), 1.0);
        session.dismiss();

        assert!(!session.is_open());
        assert!(session.preview().is_none());
        assert!(matches!(session.set_crop(CropRegion::px(0.0, 0.0, 10.0, 10.0)), Err(AvatarError::SessionClosed)));
        assert!(matches!(session.set_pixel_ratio(2.0), Err(AvatarError::SessionClosed)));
        assert!(matches!(session.confirmed_preview(), Err(AvatarError::SessionClosed)));
        session.dismiss();
    }

    #[test]
    fn export_writes_current_preview() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("avatar.png");
        let mut session = session(120, 120, PixelSize::new(120.0, 120.0), 1.0);
        session.set_crop(CropRegion::percent(25.0, 25.0, 50.0, 50.0)).expect("open session");

        let asset = session.export_png(&path).expect("export should succeed");

        assert_eq!((asset.width, asset.height), (60, 60));
        assert!(path.exists());
    }

    #[test]
    fn open_decodes_file_input() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("input.png");
        gradient(320, 320).save(&path).expect("write input png");

        let session = EditSession::open(
            ImageInput::FilePath(path.to_string_lossy().to_string()),
            None,
            1.0,
            &AvatarConfig::default(),
            AssetEncoder::default(),
        )
        .expect("open from file");

        assert_eq!(session.source().map(ImageSource::natural), Some(PixelSize::new(320.0, 320.0)));
        assert_eq!(session.preview().map(|b| (b.width(), b.height())), Some((290, 290)));
    }
}
