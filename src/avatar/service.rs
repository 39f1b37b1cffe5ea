//! # 服务层（可注入状态）
//!
//! ## 设计思路
//!
//! `AvatarService` 把配置、后端、用户资料状态与通知出口组合在一起，
//! 由入口统一创建并管理生命周期；测试可注入桩后端与记录型通知器。
//!
//! ## 实现思路
//!
//! 对外仅暴露少量稳定 API：
//! - `open_session`：加载图片并创建编辑会话
//! - `upload`：确认当前裁剪结果并执行完整上传协议
//! - `cancel`：取消某个用户进行中的上传
//! - `set_smoothing` / `smoothing`：切换重采样质量
//!
//! 同一用户的新上传会取消仍在进行中的旧上传：旧上传在下一个阶段边界停止，
//! 不会写入用户资料，也不会再发出通知。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use super::backend::{HttpBackend, ProfileBackend};
use super::encoder::AssetEncoder;
use super::error::{GENERIC_FAILURE_MESSAGE, SUCCESS_MESSAGE};
use super::geometry::PixelSize;
use super::orchestrator::UploadOrchestrator;
use super::pipeline::{CancelToken, StageExt, StageResult};
use super::preview::PreviewRegistry;
use super::raster::RasterBuffer;
use super::session::EditSession;
use super::source::ImageInput;
use super::store::{ProfileStore, UserProfile};
use super::{AvatarConfig, AvatarError, SmoothingQuality, StageFailure, UploadStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// 面向用户的一条提示。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: &'static str,
}

impl Notice {
    pub fn success() -> Self {
        Self {
            level: NoticeLevel::Success,
            message: SUCCESS_MESSAGE,
        }
    }

    pub fn failure() -> Self {
        Self {
            level: NoticeLevel::Error,
            message: GENERIC_FAILURE_MESSAGE,
        }
    }
}

/// 提示出口（例如界面上的 snackbar）。
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// 默认出口：写日志。
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Success => log::info!("✅ {}", notice.message),
            NoticeLevel::Error => log::error!("❌ {}", notice.message),
        }
    }
}

/// 头像服务状态。
pub struct AvatarService<B = HttpBackend> {
    config: RwLock<AvatarConfig>,
    backend: Arc<B>,
    store: Arc<ProfileStore>,
    encoder: AssetEncoder,
    notifier: Arc<dyn Notifier>,
    cancel_tokens: Mutex<HashMap<String, CancelToken>>,
}

impl AvatarService<HttpBackend> {
    /// 使用 HTTP 后端创建服务。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use profile_picture::avatar::{AvatarConfig, AvatarService};
    ///
    /// let mut config = AvatarConfig::default();
    /// config.backend_url = "https://api.example.com".to_string();
    /// let service = AvatarService::new(config)?;
    /// # Ok::<(), profile_picture::avatar::AvatarError>(())
    /// ```
    pub fn new(config: AvatarConfig) -> Result<Self, AvatarError> {
        config.validate()?;
        let backend = HttpBackend::new(&config)?;
        Ok(Self::with_backend(config, backend, Arc::new(ProfileStore::new())))
    }
}

impl<B: ProfileBackend> AvatarService<B> {
    /// 注入自定义后端与资料状态。
    pub fn with_backend(config: AvatarConfig, backend: B, store: Arc<ProfileStore>) -> Self {
        Self {
            config: RwLock::new(config),
            backend: Arc::new(backend),
            store,
            encoder: AssetEncoder::new(PreviewRegistry::new()),
            notifier: Arc::new(LogNotifier),
            cancel_tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn store(&self) -> Arc<ProfileStore> {
        Arc::clone(&self.store)
    }

    pub fn previews(&self) -> &PreviewRegistry {
        self.encoder.previews()
    }

    /// 当前配置快照。
    pub fn config(&self) -> Result<AvatarConfig, AvatarError> {
        self.config
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| AvatarError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 加载图片并打开编辑会话。
    pub fn open_session(
        &self,
        input: ImageInput,
        displayed: Option<PixelSize>,
        pixel_ratio: f64,
    ) -> Result<EditSession, AvatarError> {
        let config = self.config()?;
        EditSession::open(input, displayed, pixel_ratio, &config, self.encoder.clone())
    }

    /// 确认并上传会话中的裁剪结果。
    ///
    /// 成功时关闭会话并提示成功；失败时会话保持打开，只提示通用错误文案。
    /// 被同一用户的新上传取代时不提示。
    pub async fn upload(&self, session: &mut EditSession, user_id: &str) -> StageResult<UserProfile> {
        let result = match session.confirmed_preview() {
            Ok(buffer) => self.upload_buffer(user_id, buffer).await,
            Err(e) => Err(StageFailure::new(UploadStage::Encode, e)),
        };

        match &result {
            Ok(_) => {
                self.notifier.notify(&Notice::success());
                session.dismiss();
            }
            Err(failure) if failure.is_cancelled() => {
                log::info!("🛑 头像上传被取代，不再提示 - user={}", user_id);
            }
            Err(failure) => {
                log::error!(
                    "❌ 头像上传失败 - user={} stage={} kind={:?} code={}",
                    user_id,
                    failure.stage,
                    failure.kind(),
                    failure.cause.code()
                );
                self.notifier.notify(&Notice::failure());
            }
        }

        result
    }

    async fn upload_buffer(&self, user_id: &str, buffer: &RasterBuffer) -> StageResult<UserProfile> {
        let token = self.register(user_id).at_stage(UploadStage::Encode)?;

        let orchestrator = UploadOrchestrator::new(Arc::clone(&self.backend), Arc::clone(&self.store), self.encoder.clone());
        let result = orchestrator.run(user_id, buffer, &token).await;

        self.unregister(user_id, &token);
        result
    }

    /// 取消某个用户进行中的上传；返回是否存在进行中的上传。
    pub fn cancel(&self, user_id: &str) -> Result<bool, AvatarError> {
        let guard = self
            .cancel_tokens
            .lock()
            .map_err(|_| AvatarError::ResourceLimit("上传取消令牌锁已中毒".to_string()))?;

        if let Some(token) = guard.get(user_id) {
            token.cancel();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// 设置重采样质量；只影响之后打开的会话。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use profile_picture::avatar::{AvatarConfig, AvatarService};
    ///
    /// let service = AvatarService::new(AvatarConfig::default())?;
    /// service.set_smoothing("medium")?;
    /// assert_eq!(service.smoothing()?, "medium");
    /// # Ok::<(), profile_picture::avatar::AvatarError>(())
    /// ```
    pub fn set_smoothing(&self, quality: &str) -> Result<(), AvatarError> {
        let quality = SmoothingQuality::from_str(quality)?;
        let mut guard = self
            .config
            .write()
            .map_err(|_| AvatarError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        guard.smoothing = quality;
        log::info!("⚙️ 重采样质量已切换为 {}", quality.as_str());
        Ok(())
    }

    pub fn smoothing(&self) -> Result<&'static str, AvatarError> {
        Ok(self.config()?.smoothing.as_str())
    }

    fn register(&self, user_id: &str) -> Result<CancelToken, AvatarError> {
        let token = CancelToken::new();
        let mut guard = self
            .cancel_tokens
            .lock()
            .map_err(|_| AvatarError::ResourceLimit("上传取消令牌锁已中毒".to_string()))?;

        if let Some(previous) = guard.insert(user_id.to_string(), token.clone()) {
            previous.cancel();
            log::info!("🔁 新的头像上传取代了进行中的上传 - user={}", user_id);
        }
        Ok(token)
    }

    fn unregister(&self, user_id: &str, token: &CancelToken) {
        let Ok(mut guard) = self.cancel_tokens.lock() else {
            log::warn!("⚠️ 上传取消令牌锁已中毒，无法清理 - user={}", user_id);
            return;
        };
        if guard.get(user_id).is_some_and(|current| current.same_as(token)) {
            guard.remove(user_id);
        }
    }
}
