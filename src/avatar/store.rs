//! # 用户资料状态模块
//!
//! ## 设计思路
//!
//! 客户端共享的“当前用户资料”，以可注入服务（`Arc<ProfileStore>`）的形式存在，
//! 替代全局单例。对外只有三类操作：读取当前资料、整体替换、订阅变化。
//!
//! ## 实现思路
//!
//! - 资料使用 `RwLock`，读多写少。
//! - 订阅者列表使用 `Mutex`，通知时先复制回调列表再逐个调用，
//!   避免回调内再次订阅/取消订阅时死锁。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use super::AvatarError;

/// 服务端返回的完整用户资料。
///
/// 未建模的字段通过 `extra` 原样保留。用户 id 依次取 `_id`、`userId`、`id`，
/// 未被采用的同义键（例如带虚拟字段的文档里的 `id`）留在 `extra` 中。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JsonObject")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "imageId", default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

type JsonObject = serde_json::Map<String, serde_json::Value>;

const ID_KEYS: [&str; 3] = ["_id", "userId", "id"];

impl TryFrom<JsonObject> for UserProfile {
    type Error = String;

    fn try_from(mut fields: JsonObject) -> Result<Self, Self::Error> {
        let id_key = ID_KEYS
            .into_iter()
            .find(|key| fields.get(*key).is_some_and(serde_json::Value::is_string))
            .ok_or_else(|| "用户资料缺少字符串类型的 _id".to_string())?;
        let id = take_string(&mut fields, id_key)?.unwrap_or_default();

        Ok(Self {
            id,
            username: take_string(&mut fields, "username")?,
            email: take_string(&mut fields, "email")?,
            image_id: take_string(&mut fields, "imageId")?,
            extra: fields,
        })
    }
}

/// 取出可选字符串字段；`null` 视为缺失。
fn take_string(fields: &mut JsonObject, key: &str) -> Result<Option<String>, String> {
    match fields.remove(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(value)) => Ok(Some(value)),
        Some(other) => Err(format!("用户资料字段 {} 类型错误：{}", key, other)),
    }
}

/// 订阅标识，用于取消订阅。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&UserProfile) + Send + Sync>;

/// 当前用户资料状态。
#[derive(Default)]
pub struct ProfileStore {
    current: RwLock<Option<UserProfile>>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(profile: UserProfile) -> Self {
        Self {
            current: RwLock::new(Some(profile)),
            ..Self::default()
        }
    }

    /// 当前资料快照；未登录时为 `None`。
    pub fn get(&self) -> Result<Option<UserProfile>, AvatarError> {
        self.current
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| AvatarError::ResourceLimit("资料读取锁已中毒".to_string()))
    }

    /// 整体替换当前资料并通知订阅者。
    pub fn set(&self, profile: UserProfile) -> Result<(), AvatarError> {
        {
            let mut guard = self
                .current
                .write()
                .map_err(|_| AvatarError::ResourceLimit("资料写入锁已中毒".to_string()))?;
            *guard = Some(profile.clone());
        }

        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .map_err(|_| AvatarError::ResourceLimit("订阅列表锁已中毒".to_string()))?
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        log::debug!("🔔 用户资料已更新 - user={} 订阅者={}", profile.id, listeners.len());
        for listener in listeners {
            listener(&profile);
        }

        Ok(())
    }

    pub fn subscribe<F>(&self, listener: F) -> Result<SubscriptionId, AvatarError>
    where
        F: Fn(&UserProfile) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .lock()
            .map_err(|_| AvatarError::ResourceLimit("订阅列表锁已中毒".to_string()))?
            .push((id, Arc::new(listener)));
        Ok(id)
    }

    /// 取消订阅；返回是否确实移除了订阅者。
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, AvatarError> {
        let mut guard = self
            .listeners
            .lock()
            .map_err(|_| AvatarError::ResourceLimit("订阅列表锁已中毒".to_string()))?;
        let before = guard.len();
        guard.retain(|(existing, _)| *existing != id);
        Ok(guard.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn profile(id: &str, image_id: Option<&str>) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            username: Some("neo".to_string()),
            email: None,
            image_id: image_id.map(str::to_string),
            extra: JsonObject::new(),
        }
    }

    #[test]
    fn get_returns_none_until_set() {
        let store = ProfileStore::new();
        assert_eq!(store.get().expect("read"), None);

        store.set(profile("u1", Some("img-1"))).expect("write");
        assert_eq!(store.get().expect("read").and_then(|p| p.image_id), Some("img-1".to_string()));
    }

    #[test]
    fn subscribers_are_notified_until_unsubscribed() {
        let store = ProfileStore::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        let id = store
            .subscribe(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("subscribe");

        store.set(profile("u1", None)).expect("write");
        assert!(store.unsubscribe(id).expect("unsubscribe"));
        store.set(profile("u1", Some("img-2"))).expect("write");

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!store.unsubscribe(id).expect("second unsubscribe"));
    }

    #[test]
    fn profile_json_keeps_unknown_fields() {
        let json = r#"{"_id":"64f","username":"neo","imageId":"abc","companies":["c1"],"phone":"555"}"#;
        let parsed: UserProfile = serde_json::from_str(json).expect("profile should parse");

        assert_eq!(parsed.id, "64f");
        assert_eq!(parsed.image_id.as_deref(), Some("abc"));
        assert_eq!(parsed.extra.get("phone"), Some(&serde_json::json!("555")));

        let back = serde_json::to_value(&parsed).expect("serialize");
        assert_eq!(back["companies"], serde_json::json!(["c1"]));
        assert_eq!(back["_id"], serde_json::json!("64f"));
    }

    #[test]
    fn profile_accepts_user_id_alias() {
        let parsed: UserProfile =
            serde_json::from_str(r#"{"userId":"u9","imageId":"img"}"#).expect("profile should parse");
        assert_eq!(parsed.id, "u9");
    }

    #[test]
    fn profile_with_both_mongo_id_and_virtual_id_parses() {
        let parsed: UserProfile = serde_json::from_str(r#"{"_id":"u1","id":"u1","imageId":"img"}"#)
            .expect("profile with id virtual should parse");

        assert_eq!(parsed.id, "u1");
        assert_eq!(parsed.image_id.as_deref(), Some("img"));
        assert_eq!(parsed.extra.get("id"), Some(&serde_json::json!("u1")));

        let back = serde_json::to_value(&parsed).expect("serialize");
        assert_eq!(back["_id"], serde_json::json!("u1"));
        assert_eq!(back["id"], serde_json::json!("u1"));
    }

    #[test]
    fn profile_without_string_id_is_rejected() {
        assert!(serde_json::from_str::<UserProfile>(r#"{"username":"neo"}"#).is_err());
        assert!(serde_json::from_str::<UserProfile>(r#"{"_id":"u1","imageId":42}"#).is_err());
        assert!(serde_json::from_str::<UserProfile>("[1,2]").is_err());
    }

    #[test]
    fn null_optional_fields_are_treated_as_missing() {
        let parsed: UserProfile =
            serde_json::from_str(r#"{"_id":"u1","email":null,"imageId":null}"#).expect("profile should parse");
        assert_eq!(parsed.email, None);
        assert_eq!(parsed.image_id, None);
        assert!(parsed.extra.is_empty());
    }
}
