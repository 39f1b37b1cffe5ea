//! # 裁剪几何模块
//!
//! ## 设计思路
//!
//! 纯函数模块：根据图片固有尺寸、显示尺寸、设备像素比与裁剪框，
//! 计算缩放系数、源图采样矩形与目标缓冲尺寸。不做任何 I/O，便于穷举测试。
//!
//! ## 实现思路
//!
//! - 裁剪框始终先换算为显示像素（`%` 单位按显示尺寸换算）。
//! - `scale = natural / displayed`，源矩形 = 裁剪框 × scale。
//! - 目标尺寸 = `round(crop * pixel_ratio * scale)`。
//! - 面积为 0、非有限值、像素比非正数时返回 `None`（空操作信号，而非错误）。

use serde::{Deserialize, Serialize};

/// 二维尺寸（像素，允许小数以表达 CSS 像素）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: f64,
    pub height: f64,
}

impl PixelSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// 两边均为有限正数。
    pub fn is_drawable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// 固有分辨率与显示尺寸之间的比值。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub x: f64,
    pub y: f64,
}

impl ScaleFactors {
    pub fn between(natural: PixelSize, displayed: PixelSize) -> Self {
        Self {
            x: natural.width / displayed.width,
            y: natural.height / displayed.height,
        }
    }

    fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.x > 0.0 && self.y > 0.0
    }
}

/// 裁剪框单位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CropUnit {
    #[default]
    #[serde(rename = "px")]
    Px,
    #[serde(rename = "%")]
    Percent,
}

/// 用户选择的裁剪框（显示坐标系）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    #[serde(default)]
    pub unit: CropUnit,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub aspect: Option<f64>,
}

impl CropRegion {
    pub fn px(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            unit: CropUnit::Px,
            x,
            y,
            width,
            height,
            aspect: None,
        }
    }

    pub fn percent(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            unit: CropUnit::Percent,
            ..Self::px(x, y, width, height)
        }
    }

    /// 锁定宽高比：以宽度为准重算高度。
    pub fn with_aspect(mut self, aspect: f64) -> Self {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = Some(aspect);
            self.height = self.width / aspect;
        }
        self
    }

    /// 居中的初始裁剪框，边长不超过显示区域。
    ///
    /// # 示例
    /// ```rust
    /// use profile_picture::avatar::{CropRegion, PixelSize};
    ///
    /// let crop = CropRegion::initial(PixelSize::new(400.0, 300.0), 290.0, Some(1.0));
    /// assert_eq!((crop.width, crop.height), (290.0, 290.0));
    /// assert_eq!((crop.x, crop.y), (55.0, 5.0));
    /// ```
    pub fn initial(displayed: PixelSize, size: f64, aspect: Option<f64>) -> Self {
        let aspect = aspect.filter(|a| a.is_finite() && *a > 0.0);
        let (width, height) = match aspect {
            Some(aspect) => {
                let width = size.min(displayed.width).min(displayed.height * aspect).max(0.0);
                (width, width / aspect)
            }
            None => (
                size.min(displayed.width).max(0.0),
                size.min(displayed.height).max(0.0),
            ),
        };

        Self {
            unit: CropUnit::Px,
            x: (displayed.width - width) / 2.0,
            y: (displayed.height - height) / 2.0,
            width,
            height,
            aspect,
        }
    }

    /// 换算为显示像素单位。
    pub fn to_pixels(&self, displayed: PixelSize) -> Self {
        match self.unit {
            CropUnit::Px => *self,
            CropUnit::Percent => Self {
                unit: CropUnit::Px,
                x: self.x * displayed.width / 100.0,
                y: self.y * displayed.height / 100.0,
                width: self.width * displayed.width / 100.0,
                height: self.height * displayed.height / 100.0,
                aspect: self.aspect,
            },
        }
    }

    /// 将裁剪框限制在显示区域内（拖拽越界时使用）。
    pub fn clamped_to(&self, displayed: PixelSize) -> Self {
        let px = self.to_pixels(displayed);
        let x = px.x.clamp(0.0, displayed.width);
        let y = px.y.clamp(0.0, displayed.height);
        let width = px.width.clamp(0.0, displayed.width - x);
        let height = px.height.clamp(0.0, displayed.height - y);

        Self {
            x,
            y,
            width,
            height,
            ..px
        }
    }

    /// 面积为正且数值有限。
    pub fn has_area(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// 源图（固有像素坐标系）中的采样矩形。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// 一次栅格化所需的全部几何参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterPlan {
    pub scale: ScaleFactors,
    pub pixel_ratio: f64,
    /// 已换算为像素单位的裁剪框。
    pub crop: CropRegion,
    pub source: SourceRect,
    /// 目标缓冲宽度（设备像素）。
    pub target_width: u32,
    /// 目标缓冲高度（设备像素）。
    pub target_height: u32,
}

impl RasterPlan {
    /// 逻辑坐标系中的绘制尺寸（变换前）。
    pub fn logical_destination(&self) -> PixelSize {
        PixelSize::new(self.source.width, self.source.height)
    }

    /// 目标缓冲像素数。
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.target_width) * u64::from(self.target_height)
    }
}

/// 计算栅格化参数；返回 `None` 表示本次应跳过绘制。
pub fn plan_raster(
    natural: PixelSize,
    displayed: PixelSize,
    pixel_ratio: f64,
    crop: &CropRegion,
) -> Option<RasterPlan> {
    if !natural.is_drawable() || !displayed.is_drawable() {
        return None;
    }
    if !(pixel_ratio.is_finite() && pixel_ratio > 0.0) {
        return None;
    }

    let crop = crop.to_pixels(displayed);
    if !crop.has_area() {
        return None;
    }

    let scale = ScaleFactors::between(natural, displayed);
    if !scale.is_valid() {
        return None;
    }

    let target_width = target_extent(crop.width, pixel_ratio, scale.x)?;
    let target_height = target_extent(crop.height, pixel_ratio, scale.y)?;

    Some(RasterPlan {
        scale,
        pixel_ratio,
        crop,
        source: SourceRect {
            x: crop.x * scale.x,
            y: crop.y * scale.y,
            width: crop.width * scale.x,
            height: crop.height * scale.y,
        },
        target_width,
        target_height,
    })
}

fn target_extent(length: f64, pixel_ratio: f64, scale: f64) -> Option<u32> {
    let extent = (length * pixel_ratio * scale).round();
    if !extent.is_finite() || extent < 1.0 || extent > u32::MAX as f64 {
        return None;
    }
    Some(extent as u32)
}
