//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载头像链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 上传协议的失败额外携带阶段信息（`StageFailure`），但面向用户的文案统一为
//! [`GENERIC_FAILURE_MESSAGE`]，阶段细节只进入日志。

use std::fmt;

/// 面向用户的统一失败文案。
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong";

/// 面向用户的成功文案。
pub const SUCCESS_MESSAGE: &str = "Profile picture updated";

/// 头像处理统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    #[error("网络错误：{0}")]
    Network(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("编码错误：{0}")]
    Encode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("协议错误：{0}")]
    Protocol(String),

    #[error("已取消：{0}")]
    Cancelled(String),

    #[error("编辑会话已关闭")]
    SessionClosed,
}

impl AvatarError {
    /// 稳定错误码，便于日志检索与上层分支。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::Decode(_) => "E_DECODE",
            Self::Encode(_) => "E_ENCODE",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::FileSystem(_) => "E_FILE_SYSTEM",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::Protocol(_) => "E_PROTOCOL",
            Self::Cancelled(_) => "E_CANCELLED",
            Self::SessionClosed => "E_SESSION_CLOSED",
        }
    }

    /// 面向用户的文案：无论根因如何，一律返回通用提示。
    pub fn user_message(&self) -> &'static str {
        GENERIC_FAILURE_MESSAGE
    }
}

/// 上传协议阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStage {
    Encode,
    Upload,
    Associate,
    Refetch,
}

impl UploadStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Encode => "encode",
            Self::Upload => "upload",
            Self::Associate => "associate",
            Self::Refetch => "refetch",
        }
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 阶段失败分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    EncodeFailed,
    UploadFailed,
    AssociationFailed,
    RefetchFailed,
}

/// 某一阶段的失败：阶段标识 + 底层原因。
#[derive(Debug, thiserror::Error)]
#[error("阶段 {stage} 失败：{cause}")]
pub struct StageFailure {
    pub stage: UploadStage,
    #[source]
    pub cause: AvatarError,
}

impl StageFailure {
    pub fn new(stage: UploadStage, cause: AvatarError) -> Self {
        Self { stage, cause }
    }

    pub fn kind(&self) -> FailureKind {
        match self.stage {
            UploadStage::Encode => FailureKind::EncodeFailed,
            UploadStage::Upload => FailureKind::UploadFailed,
            UploadStage::Associate => FailureKind::AssociationFailed,
            UploadStage::Refetch => FailureKind::RefetchFailed,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, AvatarError::Cancelled(_))
    }

    pub fn user_message(&self) -> &'static str {
        GENERIC_FAILURE_MESSAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_stage_maps_to_its_failure_kind() {
        let cases = [
            (UploadStage::Encode, FailureKind::EncodeFailed),
            (UploadStage::Upload, FailureKind::UploadFailed),
            (UploadStage::Associate, FailureKind::AssociationFailed),
            (UploadStage::Refetch, FailureKind::RefetchFailed),
        ];

        for (stage, kind) in cases {
            let failure = StageFailure::new(stage, AvatarError::Network("boom".to_string()));
            assert_eq!(failure.kind(), kind);
        }
    }

    #[test]
    fn user_message_is_generic_regardless_of_cause() {
        let timeout = StageFailure::new(UploadStage::Upload, AvatarError::Timeout("30s".to_string()));
        let protocol = StageFailure::new(UploadStage::Refetch, AvatarError::Protocol("bad json".to_string()));

        assert_eq!(timeout.user_message(), "Something went wrong");
        assert_eq!(protocol.user_message(), "Something went wrong");
        assert_eq!(AvatarError::SessionClosed.user_message(), "Something went wrong");
    }

    #[test]
    fn stage_failure_display_names_stage() {
        let failure = StageFailure::new(UploadStage::Associate, AvatarError::Protocol("nack".to_string()));
        assert!(failure.to_string().contains("associate"));
    }
}
