//! # 后端接口模块
//!
//! ## 设计思路
//!
//! 上传协议涉及的三个 HTTP 接口被抽象为 `ProfileBackend`，编排器只依赖该 trait，
//! 测试可注入计数/故障桩，生产使用基于 `reqwest` 的 `HttpBackend`。
//!
//! ## 实现思路
//!
//! - `POST upload/image`：multipart 字段 `image`，响应 `{imageId}`。
//! - `PUT users/profile-picture`：JSON `{userId, imageId}`，响应统一归一为布尔确认。
//! - `GET users/user/{userId}`：完整用户资料。
//! - 网络错误统一映射到 `AvatarError`，便于上层按阶段处理。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::encoder::{EncodedAsset, PNG_FILE_NAME, PNG_MIME};
use super::store::UserProfile;
use super::{AvatarConfig, AvatarError};

/// 上传成功后服务端分配的资源记录。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetRecord {
    #[serde(rename = "imageId")]
    pub image_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssociateRequest<'a> {
    user_id: &'a str,
    image_id: &'a str,
}

/// 上传协议依赖的后端能力。
pub trait ProfileBackend: Send + Sync {
    /// 阶段 1：上传图片资源。
    fn upload_image(
        &self,
        asset: &EncodedAsset,
    ) -> impl Future<Output = Result<AssetRecord, AvatarError>> + Send;

    /// 阶段 2：把资源关联到用户资料；返回服务端是否确认。
    fn associate_image(
        &self,
        user_id: &str,
        image_id: &str,
    ) -> impl Future<Output = Result<bool, AvatarError>> + Send;

    /// 阶段 3：重新拉取完整用户资料。
    fn fetch_profile(&self, user_id: &str) -> impl Future<Output = Result<UserProfile, AvatarError>> + Send;
}

impl<B: ProfileBackend> ProfileBackend for Arc<B> {
    fn upload_image(
        &self,
        asset: &EncodedAsset,
    ) -> impl Future<Output = Result<AssetRecord, AvatarError>> + Send {
        self.as_ref().upload_image(asset)
    }

    fn associate_image(
        &self,
        user_id: &str,
        image_id: &str,
    ) -> impl Future<Output = Result<bool, AvatarError>> + Send {
        self.as_ref().associate_image(user_id, image_id)
    }

    fn fetch_profile(&self, user_id: &str) -> impl Future<Output = Result<UserProfile, AvatarError>> + Send {
        self.as_ref().fetch_profile(user_id)
    }
}

/// 基于 `reqwest` 的后端实现。
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: AvatarConfig,
}

impl HttpBackend {
    /// 构建复用型 HTTP 客户端，减少每次请求的初始化开销。
    pub fn new(config: &AvatarConfig) -> Result<Self, AvatarError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .build()
            .map_err(|e| AvatarError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn profile_url(&self, user_id: &str) -> Result<reqwest::Url, AvatarError> {
        let mut url = reqwest::Url::parse(&self.config.endpoint("users/user"))
            .map_err(|e| AvatarError::InvalidFormat(format!("URL 格式错误：{}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AvatarError::InvalidFormat("backend_url 不能作为路径前缀".to_string()))?
            .push(user_id);
        Ok(url)
    }

    fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, AvatarError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(AvatarError::Network(format!(
            "HTTP {}（{}）",
            status.as_u16(),
            status_message(status.as_u16())
        )))
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(&self, e: reqwest::Error) -> AvatarError {
        if e.is_timeout() {
            AvatarError::Timeout(format!("请求超时（{}秒）", self.config.request_timeout))
        } else if e.is_connect() {
            AvatarError::Network(format!("无法连接：{}", e))
        } else if e.is_decode() {
            AvatarError::Protocol(format!("响应解析失败：{}", e))
        } else {
            AvatarError::Network(format!("请求失败：{}", e))
        }
    }
}

impl ProfileBackend for HttpBackend {
    async fn upload_image(&self, asset: &EncodedAsset) -> Result<AssetRecord, AvatarError> {
        let url = self.config.endpoint("upload/image");
        log::debug!("📡 上传图片 - {} ({} bytes)", url, asset.len());

        let part = reqwest::multipart::Part::bytes(asset.bytes.to_vec())
            .file_name(PNG_FILE_NAME)
            .mime_str(PNG_MIME)
            .map_err(|e| AvatarError::InvalidFormat(format!("multipart 构建失败：{}", e)))?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;
        let response = Self::ensure_success(response)?;

        let record: AssetRecord = response.json().await.map_err(|e| self.map_reqwest_error(e))?;
        if record.image_id.trim().is_empty() {
            return Err(AvatarError::Protocol("上传响应缺少 imageId".to_string()));
        }

        Ok(record)
    }

    async fn associate_image(&self, user_id: &str, image_id: &str) -> Result<bool, AvatarError> {
        let url = self.config.endpoint("users/profile-picture");
        log::debug!("📡 关联头像 - {} user={} image={}", url, user_id, image_id);

        let response = self
            .client
            .put(url)
            .json(&AssociateRequest { user_id, image_id })
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_reqwest_error(e))?;

        Ok(normalize_ack(status, &body))
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<UserProfile, AvatarError> {
        let url = self.profile_url(user_id)?;
        log::debug!("📡 拉取用户资料 - {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;
        let response = Self::ensure_success(response)?;

        response.json().await.map_err(|e| self.map_reqwest_error(e))
    }
}

const ACK_FLAG_KEYS: [&str; 4] = ["success", "ok", "acknowledged", "updated"];
const ACK_COUNT_KEYS: [&str; 2] = ["modifiedCount", "matchedCount"];

/// 将关联接口的各种响应形态归一为布尔确认。
///
/// - 非 2xx：`false`
/// - 空响应体：`true`
/// - JSON 中首个出现的确认字段（`success` / `ok` / `acknowledged` / `updated`）按真值判断
/// - 否则按 `modifiedCount` / `matchedCount` 是否大于 0 判断
/// - 其余任意响应体：`true`
pub(crate) fn normalize_ack(status: StatusCode, body: &str) -> bool {
    if !status.is_success() {
        return false;
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return true;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return true;
    };

    let Some(object) = value.as_object() else {
        return is_truthy(&value);
    };

    if let Some(flag) = ACK_FLAG_KEYS.iter().find_map(|key| object.get(*key)) {
        return is_truthy(flag);
    }

    if let Some(count) = ACK_COUNT_KEYS.iter().find_map(|key| object.get(*key)) {
        return count.as_f64().map(|n| n > 0.0).unwrap_or(false);
    }

    true
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

/// 常见 HTTP 状态码本地化文案。
fn status_message(code: u16) -> &'static str {
    match code {
        400 => "请求无效",
        401 | 403 => "访问被拒绝",
        404 => "未找到",
        413 => "文件过大",
        500..=599 => "服务器错误",
        _ => "请求失败",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_normalization_table() {
        let ok = StatusCode::OK;
        let cases = [
            (ok, "", true),
            (ok, "   ", true),
            (ok, r#"{"success":true}"#, true),
            (ok, r#"{"success":false}"#, false),
            (ok, r#"{"ok":1}"#, true),
            (ok, r#"{"ok":0}"#, false),
            (ok, r#"{"acknowledged":true,"modifiedCount":0}"#, true),
            (ok, r#"{"modifiedCount":1}"#, true),
            (ok, r#"{"matchedCount":0}"#, false),
            (ok, r#"{"message":"Profile picture updated"}"#, true),
            (ok, r#"{"_id":"u1","imageId":"img"}"#, true),
            (ok, "true", true),
            (ok, "false", false),
            (ok, "null", false),
            (ok, "Updated", true),
            (StatusCode::NO_CONTENT, "", true),
            (StatusCode::BAD_REQUEST, r#"{"success":true}"#, false),
            (StatusCode::INTERNAL_SERVER_ERROR, "", false),
        ];

        for (status, body, expected) in cases {
            assert_eq!(normalize_ack(status, body), expected, "status={} body={:?}", status, body);
        }
    }

    #[test]
    fn profile_url_escapes_user_id() {
        let backend = HttpBackend::new(&AvatarConfig::default()).expect("backend init failed");
        let url = backend.profile_url("a b/c").expect("url should build");
        assert_eq!(url.as_str(), "http://localhost:5555/users/user/a%20b%2Fc");
    }

    #[test]
    fn asset_record_requires_image_id_field() {
        let record: AssetRecord = serde_json::from_str(r#"{"imageId":"665f"}"#).expect("parse");
        assert_eq!(record.image_id, "665f");
        assert!(serde_json::from_str::<AssetRecord>(r#"{"id":"665f"}"#).is_err());
    }
}
