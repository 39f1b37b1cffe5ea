//! # 预览句柄模块
//!
//! ## 设计思路
//!
//! 对应浏览器中的 `createObjectURL / revokeObjectURL`：编码结果可以临时注册为
//! 一个预览地址，用完立即释放。句柄采用 RAII，`Drop` 时自动释放，
//! 显式 `release` 会消耗句柄本身，因此释放后无法再通过同一句柄访问。
//!
//! 句柄 id 单调递增、永不复用；已释放的地址再解析一律返回 `None`。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

const PREVIEW_URL_PREFIX: &str = "blob:profile-picture/";

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Bytes>>,
}

/// 预览地址注册表。
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<RegistryInner>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一段图片字节，返回新的预览句柄。
    pub fn create(&self, bytes: Bytes) -> PreviewHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        match self.inner.live.lock() {
            Ok(mut guard) => {
                guard.insert(id, bytes);
            }
            Err(_) => log::warn!("⚠️ 预览注册表锁已中毒，预览 {} 不可解析", id),
        }

        PreviewHandle {
            id,
            url: format!("{}{}", PREVIEW_URL_PREFIX, id),
            registry: Arc::clone(&self.inner),
            released: false,
        }
    }

    /// 按地址解析；已释放或未知地址返回 `None`。
    pub fn resolve(&self, url: &str) -> Option<Bytes> {
        let id = url.strip_prefix(PREVIEW_URL_PREFIX)?.parse::<u64>().ok()?;
        self.inner.live.lock().ok()?.get(&id).cloned()
    }

    /// 当前仍存活的预览数量。
    pub fn live_count(&self) -> usize {
        self.inner.live.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

/// 短生命周期预览句柄。
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    url: String,
    registry: Arc<RegistryInner>,
    released: bool,
}

impl PreviewHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 读取预览内容（仅在释放前有效）。
    pub fn bytes(&self) -> Option<Bytes> {
        self.registry.live.lock().ok()?.get(&self.id).cloned()
    }

    /// 显式释放；句柄被消耗，不可再次使用。
    pub fn release(mut self) {
        self.revoke();
    }

    fn revoke(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Ok(mut guard) = self.registry.live.lock() {
            guard.remove(&self.id);
        }
        log::debug!("🧹 预览已释放 - {}", self.url);
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.revoke();
    }
}
