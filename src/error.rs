//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义应用级统一的 `AppError` 枚举，命令行入口的所有分支都返回
//! `Result<T, AppError>`，由入口统一决定日志与退出码。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `AvatarError` / `StageFailure` 提供 `From` 转换，无需手动 map。

use crate::avatar::{AvatarError, StageFailure};

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 图片加载 / 裁剪 / 导出错误
    #[error("{0}")]
    Avatar(#[from] AvatarError),

    /// 上传协议某一阶段失败
    #[error("{0}")]
    Upload(#[from] StageFailure),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 设置文件不可用
    #[error("设置文件错误: {0}")]
    Settings(String),
}

impl AppError {
    /// 面向用户的文案；上传失败一律使用通用提示。
    pub fn user_message(&self) -> String {
        match self {
            Self::Upload(failure) => failure.user_message().to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::UploadStage;

    #[test]
    fn upload_failure_hides_cause_from_user() {
        let err: AppError = StageFailure::new(UploadStage::Refetch, AvatarError::Timeout("30s".to_string())).into();
        assert_eq!(err.user_message(), "Something went wrong");
        assert!(err.to_string().contains("refetch"));
    }

    #[test]
    fn avatar_error_converts_transparently() {
        let err: AppError = AvatarError::SessionClosed.into();
        assert_eq!(err.to_string(), AvatarError::SessionClosed.to_string());
    }
}
