//! # 阶段流水线模块
//!
//! ## 设计思路
//!
//! 上传协议的各阶段严格串行、前一阶段成功才进入下一阶段。
//! 这里提供一个短路式的阶段执行器：每个阶段返回 `StageResult<T>`，
//! 任一阶段失败即携带阶段标识返回，调用侧用 `?` 串联，不再嵌套回调。
//!
//! ## 实现思路
//!
//! - `UploadStateMachine` 记录当前状态与完整迁移历史（便于诊断与测试）。
//! - `StageRunner::run` 在阶段开始前检查取消令牌、切换状态、计时，
//!   失败时记录阶段名与根因并切到 `Failed(stage)`。
//! - 取消令牌是共享的 `AtomicBool`，只在阶段边界检查。

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{AvatarError, StageFailure, UploadStage};

pub type StageResult<T> = Result<T, StageFailure>;

/// 将模块错误标注为某一阶段的失败。
pub trait StageExt<T> {
    fn at_stage(self, stage: UploadStage) -> StageResult<T>;
}

impl<T> StageExt<T> for Result<T, AvatarError> {
    fn at_stage(self, stage: UploadStage) -> StageResult<T> {
        self.map_err(|cause| StageFailure::new(stage, cause))
    }
}

/// 上传编排状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Encoding,
    Uploading,
    Associating,
    Refetching,
    Done,
    Failed(UploadStage),
    Cancelled(UploadStage),
}

impl UploadState {
    pub fn running(stage: UploadStage) -> Self {
        match stage {
            UploadStage::Encode => Self::Encoding,
            UploadStage::Upload => Self::Uploading,
            UploadStage::Associate => Self::Associating,
            UploadStage::Refetch => Self::Refetching,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed(_) | Self::Cancelled(_))
    }
}

/// 可共享的取消令牌。
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// 状态机：当前状态 + 迁移历史。
#[derive(Debug)]
pub struct UploadStateMachine {
    history: Mutex<Vec<UploadState>>,
}

impl UploadStateMachine {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(vec![UploadState::Idle]),
        }
    }

    pub fn state(&self) -> UploadState {
        self.history
            .lock()
            .ok()
            .and_then(|guard| guard.last().copied())
            .unwrap_or(UploadState::Idle)
    }

    pub fn history(&self) -> Vec<UploadState> {
        self.history.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// 迁移到新状态；终态之后的迁移会被忽略。
    pub(crate) fn transition(&self, next: UploadState) {
        let Ok(mut guard) = self.history.lock() else {
            log::warn!("⚠️ 上传状态锁已中毒，忽略迁移：{:?}", next);
            return;
        };

        let current = guard.last().copied().unwrap_or(UploadState::Idle);
        if current.is_terminal() {
            log::warn!("⚠️ 已处于终态 {:?}，忽略迁移：{:?}", current, next);
            return;
        }
        guard.push(next);
    }

    pub(crate) fn reset(&self) {
        if let Ok(mut guard) = self.history.lock() {
            guard.clear();
            guard.push(UploadState::Idle);
        }
    }
}

impl Default for UploadStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// 串行阶段执行器。
pub(crate) struct StageRunner<'a> {
    machine: &'a UploadStateMachine,
    cancel: &'a CancelToken,
    timings: Vec<(UploadStage, Duration)>,
}

impl<'a> StageRunner<'a> {
    pub(crate) fn new(machine: &'a UploadStateMachine, cancel: &'a CancelToken) -> Self {
        Self {
            machine,
            cancel,
            timings: Vec::with_capacity(4),
        }
    }

    /// 执行单个阶段；失败即短路返回带阶段标识的错误。
    pub(crate) async fn run<T, F, Fut>(&mut self, stage: UploadStage, step: F) -> StageResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AvatarError>>,
    {
        self.ensure_not_cancelled(stage)?;
        self.machine.transition(UploadState::running(stage));

        let start = Instant::now();
        let result = step().await;
        let elapsed = start.elapsed();

        match result {
            Ok(value) => {
                self.timings.push((stage, elapsed));
                Ok(value)
            }
            Err(cause) => {
                log::error!(
                    "❌ 头像上传阶段失败 - stage={} code={} elapsed={}ms cause={}",
                    stage,
                    cause.code(),
                    elapsed.as_millis(),
                    cause
                );
                self.machine.transition(UploadState::Failed(stage));
                Err(StageFailure::new(stage, cause))
            }
        }
    }

    /// 阶段边界的取消检查。
    pub(crate) fn ensure_not_cancelled(&self, stage: UploadStage) -> StageResult<()> {
        if !self.cancel.is_cancelled() {
            return Ok(());
        }

        log::info!("🛑 头像上传已取消 - 停在阶段 {}", stage);
        self.machine.transition(UploadState::Cancelled(stage));
        Err(StageFailure::new(
            stage,
            AvatarError::Cancelled(format!("在 {} 阶段前被新的上传取代", stage)),
        ))
    }

    /// 将同步步骤的失败归到指定阶段。
    pub(crate) fn commit<T>(&self, stage: UploadStage, result: Result<T, AvatarError>) -> StageResult<T> {
        result.at_stage(stage).inspect_err(|failure| {
            log::error!("❌ 头像上传提交失败 - stage={} cause={}", stage, failure.cause);
            self.machine.transition(UploadState::Failed(stage));
        })
    }

    pub(crate) fn finish(self) {
        self.machine.transition(UploadState::Done);

        let summary = self
            .timings
            .iter()
            .map(|(stage, elapsed)| format!("{}={}ms", stage, elapsed.as_millis()))
            .collect::<Vec<_>>()
            .join(" ");
        let total: Duration = self.timings.iter().map(|(_, elapsed)| *elapsed).sum();
        log::info!("✅ 头像上传完成 - {} total={}ms", summary, total.as_millis());
    }
}
