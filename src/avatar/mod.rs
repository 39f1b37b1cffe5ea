//! # 头像处理模块（avatar）
//!
//! ## 设计思路
//!
//! 该模块将“图片加载 → 裁剪预览 → 编码 → 三步上传协议 → 资料提交”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `service`：承载可注入状态（`AvatarService`）与用户提示
//! - `session`：单次编辑交互（裁剪框、像素比、预览、导出）
//! - `orchestrator`：编排上传协议并维护状态机
//! - `pipeline`：阶段执行器、取消令牌、状态定义
//! - `backend`：三个 HTTP 接口的 trait 与 `reqwest` 实现
//! - `loader/source`：输入加载、安全校验与解码
//! - `geometry/raster`：裁剪几何与栅格化
//! - `encoder/preview`：PNG 编码与短生命周期预览句柄
//! - `store`：当前用户资料状态
//! - `config/error`：配置与错误
//!
//! ## 新同事快速上手
//!
//! 可以按下面顺序理解调用链：
//!
//! ```text
//! main.rs（CLI 参数适配）
//!    ↓
//! service.rs（服务入口 + 提示 + 取消令牌）
//!    ├─ session.rs（加载 → 裁剪 → 预览）
//!    │    ├─ loader.rs（来源加载 + 体积/像素限制）
//!    │    └─ raster.rs（geometry.rs 计算 + 重采样）
//!    ↓
//! orchestrator.rs（pipeline.rs 阶段执行 + 耗时日志）
//!    ├─ encoder.rs（PNG 编码 + 预览句柄）
//!    ├─ backend.rs（上传 → 关联 → 回读）
//!    └─ store.rs（整体替换资料 + 通知订阅者）
//! ```
//!
//! ## 分层职责建议
//!
//! - 裁剪坐标换算问题优先看 `geometry.rs`
//! - 接口地址或响应格式变化优先改 `backend.rs`
//! - 阶段顺序或失败处理变化优先改 `orchestrator.rs`

mod backend;
mod config;
mod encoder;
mod error;
mod geometry;
mod loader;
mod orchestrator;
mod pipeline;
mod preview;
mod raster;
mod service;
mod session;
mod source;
mod store;

pub use backend::{AssetRecord, HttpBackend, ProfileBackend};
pub use config::{AvatarConfig, SmoothingQuality};
pub use encoder::{AssetEncoder, EncodedAsset};
pub use error::{
    AvatarError, FailureKind, GENERIC_FAILURE_MESSAGE, SUCCESS_MESSAGE, StageFailure, UploadStage,
};
pub use geometry::{CropRegion, CropUnit, PixelSize, RasterPlan, ScaleFactors, SourceRect, plan_raster};
pub use orchestrator::UploadOrchestrator;
pub use pipeline::{CancelToken, StageResult, UploadState};
pub use preview::{PreviewHandle, PreviewRegistry};
pub use raster::{RasterBuffer, Rasterizer, Transform};
pub use service::{AvatarService, LogNotifier, Notice, NoticeLevel, Notifier};
pub use session::EditSession;
pub use source::{ImageInput, ImageSource};
pub use store::{ProfileStore, SubscriptionId, UserProfile};
