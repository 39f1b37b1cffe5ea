//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `AvatarConfig`，保证运行时行为可观测、可调整、可测试。
//! 其中平滑质量（low / medium / high）作为高层语义，映射到底层重采样滤镜。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的配置（与网页端裁剪弹窗的初始值保持一致）。
//! - `SmoothingQuality` 负责档位字符串解析与反向输出。
//! - `validate` 在服务构建前统一校验取值范围，尽早失败。

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::AvatarError;

/// 头像处理配置。
///
/// 字段覆盖了加载、解码、栅格化与网络上传四个阶段。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AvatarConfig {
    /// 后端服务根地址（不含末尾 `/`）。
    pub backend_url: String,
    /// 单次请求总超时（秒）。
    pub request_timeout: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 裁剪结果缓冲的像素上限（`width * height`，设备像素）。
    pub max_raster_pixels: u64,
    /// 栅格化时的平滑质量。
    pub smoothing: SmoothingQuality,
    /// 初始裁剪框边长（显示像素）。
    pub initial_crop_size: f64,
    /// 初始裁剪框宽高比；`None` 表示自由比例。
    pub initial_crop_aspect: Option<f64>,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:5555".to_string(),
            request_timeout: 30,
            connect_timeout: 8,
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            max_raster_pixels: 40_000_000,
            smoothing: SmoothingQuality::High,
            initial_crop_size: 290.0,
            initial_crop_aspect: Some(1.0),
        }
    }
}

impl AvatarConfig {
    /// 校验配置取值范围。
    pub fn validate(&self) -> Result<(), AvatarError> {
        let url = reqwest::Url::parse(&self.backend_url)
            .map_err(|e| AvatarError::InvalidFormat(format!("backend_url 格式错误：{}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AvatarError::InvalidFormat(format!(
                "backend_url 仅支持 http/https：{}",
                url.scheme()
            )));
        }
        if !(1..=300).contains(&self.request_timeout) {
            return Err(AvatarError::InvalidFormat("request_timeout 必须在 1~300 秒之间".to_string()));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(AvatarError::InvalidFormat("connect_timeout 必须在 1~120 秒之间".to_string()));
        }
        if self.connect_timeout > self.request_timeout {
            return Err(AvatarError::InvalidFormat("connect_timeout 不能大于 request_timeout".to_string()));
        }
        if self.max_file_size == 0 {
            return Err(AvatarError::InvalidFormat("max_file_size 不能为 0".to_string()));
        }
        if self.max_decoded_bytes < 8 * 1024 * 1024 {
            return Err(AvatarError::InvalidFormat("max_decoded_bytes 不能小于 8MB".to_string()));
        }
        if self.max_raster_pixels == 0 {
            return Err(AvatarError::InvalidFormat("max_raster_pixels 不能为 0".to_string()));
        }
        if !(self.initial_crop_size.is_finite() && self.initial_crop_size > 0.0) {
            return Err(AvatarError::InvalidFormat("initial_crop_size 必须为正数".to_string()));
        }
        if let Some(aspect) = self.initial_crop_aspect {
            if !(aspect.is_finite() && aspect > 0.0) {
                return Err(AvatarError::InvalidFormat("initial_crop_aspect 必须为正数".to_string()));
            }
        }

        Ok(())
    }

    /// 拼接后端接口地址。
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.backend_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// 栅格化平滑质量（对应画布的 `imageSmoothingQuality`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingQuality {
    Low,
    Medium,
    High,
}

impl SmoothingQuality {
    /// 从外部字符串解析档位。
    ///
    /// # 示例
    /// ```rust
    /// use profile_picture::avatar::SmoothingQuality;
    ///
    /// let q = SmoothingQuality::from_str("high")?;
    /// assert_eq!(q.as_str(), "high");
    /// # Ok::<(), profile_picture::avatar::AvatarError>(())
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(quality: &str) -> Result<Self, AvatarError> {
        match quality.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(AvatarError::InvalidFormat(format!(
                "未知平滑质量：{}（可选：low / medium / high）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// 映射到底层重采样滤镜。
    pub(crate) fn filter(self) -> FilterType {
        match self {
            Self::Low => FilterType::Nearest,
            Self::Medium => FilterType::Triangle,
            Self::High => FilterType::Lanczos3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        AvatarConfig::default().validate().expect("default config should be valid");
    }

    #[test]
    fn validate_rejects_bad_backend_url() {
        let mut config = AvatarConfig::default();
        config.backend_url = "ftp://example.com".to_string();
        assert!(matches!(config.validate(), Err(AvatarError::InvalidFormat(_))));

        config.backend_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(AvatarError::InvalidFormat(_))));
    }

    #[test]
    fn validate_rejects_connect_timeout_above_request_timeout() {
        let mut config = AvatarConfig::default();
        config.request_timeout = 5;
        config.connect_timeout = 10;
        assert!(matches!(config.validate(), Err(AvatarError::InvalidFormat(_))));
    }

    #[test]
    fn validate_rejects_zero_raster_limit() {
        let mut config = AvatarConfig::default();
        config.max_raster_pixels = 0;
        assert!(matches!(config.validate(), Err(AvatarError::InvalidFormat(_))));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let mut config = AvatarConfig::default();
        config.backend_url = "http://api.local/".to_string();
        assert_eq!(config.endpoint("/upload/image"), "http://api.local/upload/image");
    }

    #[test]
    fn smoothing_quality_parses_case_insensitively() {
        assert_eq!(SmoothingQuality::from_str(" HIGH ").expect("parse"), SmoothingQuality::High);
        assert!(matches!(
            SmoothingQuality::from_str("ultra"),
            Err(AvatarError::InvalidFormat(_))
        ));
    }

    #[test]
    fn config_deserializes_partial_json_with_defaults() {
        let config: AvatarConfig =
            serde_json::from_str(r#"{"backendUrl":"https://api.example.com","smoothing":"medium"}"#)
                .expect("partial config should deserialize");

        assert_eq!(config.backend_url, "https://api.example.com");
        assert_eq!(config.smoothing, SmoothingQuality::Medium);
        assert_eq!(config.request_timeout, 30);
        assert_eq!(config.initial_crop_aspect, Some(1.0));
    }
}
