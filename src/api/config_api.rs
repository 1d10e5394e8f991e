// ==========================================
// 学费缴款对账系统 - 配置管理 API
// ==========================================
// 职责: 导入配置查询与更新（global scope）
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{config_keys, ConfigManager};
use crate::db::{ensure_schema, open_sqlite_connection};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;

/// 配置项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub key: String,
    pub value: String,
    /// 未写入 config_kv，取默认值
    pub is_default: bool,
}

// ==========================================
// ConfigApi - 配置管理 API
// ==========================================
pub struct ConfigApi {
    config_manager: Arc<ConfigManager>,
}

impl ConfigApi {
    /// 创建新的ConfigApi实例
    pub fn new(config_manager: Arc<ConfigManager>) -> Self {
        Self { config_manager }
    }

    /// 按数据库路径创建（建表幂等）
    pub fn open(db_path: &str) -> ApiResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        ensure_schema(&conn)?;
        let manager = ConfigManager::from_connection(Arc::new(Mutex::new(conn)))?;
        Ok(Self::new(Arc::new(manager)))
    }

    /// 查询全部已登记配置（含默认值）
    pub fn list_configs(&self) -> ApiResult<Vec<ConfigItem>> {
        config_keys::ALL
            .iter()
            .map(|key| self.get_config(key))
            .collect()
    }

    /// 查询单个配置
    pub fn get_config(&self, key: &str) -> ApiResult<ConfigItem> {
        if !config_keys::ALL.contains(&key) {
            return Err(ApiError::NotFound(format!("配置键 {}", key)));
        }

        let stored = self.config_manager.get_global_config_value(key)?;
        Ok(ConfigItem {
            key: key.to_string(),
            is_default: stored.is_none(),
            value: stored.unwrap_or_else(|| config_keys::default_for(key).to_string()),
        })
    }

    /// 更新单个配置（下一次导入开始时生效）
    pub fn update_config(&self, key: &str, value: &str) -> ApiResult<ConfigItem> {
        self.config_manager.set_global_config_value(key, value)?;
        info!(key, value, "配置已更新");
        self.get_config(key)
    }
}
