//! # 上传编排模块
//!
//! ## 设计思路
//!
//! 串联“编码 → 上传 → 关联 → 回读 → 提交”五步，保证：
//! - 每个阶段只在前一阶段成功后开始，且最多执行一次；
//! - 任一阶段失败立即停止，用户资料状态保持不变；
//! - 只有回读成功后才整体替换资料（资料中的 `imageId` 来自服务端，而不是本地拼装）。
//!
//! ## 实现思路
//!
//! 一次上传使用一个编排器实例，状态机随实例生灭，避免并发上传互相覆盖状态。
//! 关联阶段返回未确认时视为失败；此时已上传的资源在服务端成为孤儿，只记日志。

use std::sync::Arc;

use super::backend::ProfileBackend;
use super::encoder::AssetEncoder;
use super::pipeline::{CancelToken, StageRunner, StageResult, UploadState, UploadStateMachine};
use super::raster::RasterBuffer;
use super::store::{ProfileStore, UserProfile};
use super::{AvatarError, UploadStage};

/// 单次头像上传编排器。
pub struct UploadOrchestrator<B> {
    backend: B,
    store: Arc<ProfileStore>,
    encoder: AssetEncoder,
    machine: UploadStateMachine,
}

impl<B: ProfileBackend> UploadOrchestrator<B> {
    pub fn new(backend: B, store: Arc<ProfileStore>, encoder: AssetEncoder) -> Self {
        Self {
            backend,
            store,
            encoder,
            machine: UploadStateMachine::new(),
        }
    }

    pub fn state(&self) -> UploadState {
        self.machine.state()
    }

    /// 本次运行的完整状态迁移记录。
    pub fn history(&self) -> Vec<UploadState> {
        self.machine.history()
    }

    /// 执行完整上传协议；成功时返回已提交到状态中的用户资料。
    pub async fn run(
        &self,
        user_id: &str,
        buffer: &RasterBuffer,
        cancel: &CancelToken,
    ) -> StageResult<UserProfile> {
        self.machine.reset();
        let mut runner = StageRunner::new(&self.machine, cancel);

        log::info!(
            "🚀 开始上传头像 - user={} 尺寸: {}x{}",
            user_id,
            buffer.width(),
            buffer.height()
        );

        let asset = runner.run(UploadStage::Encode, || self.encoder.encode(buffer)).await?;

        // 与浏览器一致：创建临时预览后立即释放
        let preview = self.encoder.preview(&asset);
        log::debug!("🔗 临时预览 - {}", preview.url());
        preview.release();

        let record = runner
            .run(UploadStage::Upload, || self.backend.upload_image(&asset))
            .await?;
        log::debug!("📤 图片已上传 - imageId={} {} bytes", record.image_id, asset.len());

        let image_id = record.image_id.as_str();
        runner
            .run(UploadStage::Associate, || async move {
                match self.backend.associate_image(user_id, image_id).await {
                    Ok(true) => Ok(()),
                    Ok(false) => {
                        log::warn!("⚠️ 关联未确认，已上传资源成为孤儿 - imageId={}", image_id);
                        Err(AvatarError::Protocol("服务端未确认头像关联".to_string()))
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;

        let profile = runner
            .run(UploadStage::Refetch, || self.backend.fetch_profile(user_id))
            .await?;

        if profile.image_id.as_deref() != Some(image_id) {
            log::warn!(
                "⚠️ 回读资料的 imageId 与上传结果不一致 - uploaded={} fetched={:?}",
                image_id,
                profile.image_id
            );
        }

        runner.ensure_not_cancelled(UploadStage::Refetch)?;
        runner.commit(UploadStage::Refetch, self.store.set(profile.clone()))?;
        runner.finish();

        Ok(profile)
    }
}
