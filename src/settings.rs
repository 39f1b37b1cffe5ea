//! 设置文件读写：JSON 配置 + 环境变量覆盖。

use std::fs;
use std::path::Path;

use crate::avatar::AvatarConfig;
use crate::error::AppError;

/// 覆盖后端地址的环境变量。
pub const BACKEND_URL_ENV: &str = "PROFILE_PICTURE_BACKEND_URL";

/// 读取设置；文件不存在时使用默认值，最后应用环境变量覆盖并校验。
pub fn load_settings(path: Option<&Path>) -> Result<AvatarConfig, AppError> {
    let config = match path {
        Some(path) if path.exists() => {
            let content = fs::read_to_string(path)?;
            serde_json::from_str::<AvatarConfig>(&content)
                .map_err(|e| AppError::Settings(format!("解析设置文件失败: {}", e)))?
        }
        Some(path) => {
            log::warn!("⚠️ 设置文件不存在，使用默认配置 - {}", path.display());
            AvatarConfig::default()
        }
        None => AvatarConfig::default(),
    };

    let config = apply_env_overrides(config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// 写出设置文件（格式化 JSON），必要时创建父目录。
pub fn save_settings(path: &Path, config: &AvatarConfig) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::Settings(format!("创建设置目录失败: {}", e)))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::Settings(format!("序列化设置失败: {}", e)))?;

    fs::write(path, content)?;
    Ok(())
}

pub(crate) fn apply_env_overrides<F>(mut config: AvatarConfig, lookup: F) -> AvatarConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(BACKEND_URL_ENV).filter(|v| !v.trim().is_empty()) {
        log::debug!("⚙️ 使用环境变量覆盖后端地址 - {}", url);
        config.backend_url = url.trim().to_string();
    }
    config
}
