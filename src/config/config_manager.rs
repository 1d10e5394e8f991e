// ==========================================
// 学费缴款对账系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope，当前只使用 global)
// ==========================================

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::import_config_trait::ImportConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::ImportMode;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::warn;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock()?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock()?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    /// 写入 global scope 的配置值（UPSERT）
    ///
    /// 仅接受 config_keys::ALL 中登记的键，且值必须能按该键的类型解析。
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        if !config_keys::ALL.contains(&key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }
        validate_value(key, value)?;

        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value.trim(), chrono::Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    /// 列出全部已登记键的当前值（未写入的键给出默认值）
    pub fn list_effective_values(&self) -> ConfigResult<Vec<(String, String)>> {
        config_keys::ALL
            .iter()
            .map(|key| {
                let value = self
                    .get_global_config_value(key)?
                    .unwrap_or_else(|| config_keys::default_for(key).to_string());
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// 读取并解析；缺失或格式错误时回退默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Display,
    {
        match self.get_global_config_value(key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    warn!(config_key = key, raw_value = %raw, default = %default, "配置值格式错误，使用默认值");
                    Ok(default)
                }
            },
        }
    }

    /// 正整数配置（0 视为格式错误）
    fn get_positive_or_default(&self, key: &str, default: usize) -> ConfigResult<usize> {
        let value = self.get_parsed_or_default(key, default)?;
        if value == 0 {
            warn!(config_key = key, default, "配置值必须为正整数，使用默认值");
            return Ok(default);
        }
        Ok(value)
    }
}

/// 写入前校验
fn validate_value(key: &str, value: &str) -> ConfigResult<()> {
    let trimmed = value.trim();
    let ok = match key {
        config_keys::IMPORT_MODE => trimmed.parse::<ImportMode>().is_ok(),
        config_keys::TX_DATE_STRICT => trimmed.parse::<bool>().is_ok(),
        config_keys::DEFAULT_OPERATOR_CODE => !trimmed.is_empty(),
        config_keys::IMPORT_CHUNK_SIZE | config_keys::IMPORT_SUB_BATCH_SIZE => {
            matches!(trimmed.parse::<usize>(), Ok(v) if v > 0)
        }
        _ => trimmed.parse::<u64>().is_ok(),
    };

    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    // ===== 分块与批量 =====

    async fn get_chunk_size(&self) -> ConfigResult<usize> {
        self.get_positive_or_default(config_keys::IMPORT_CHUNK_SIZE, 1000)
    }

    async fn get_sub_batch_size(&self) -> ConfigResult<usize> {
        self.get_positive_or_default(config_keys::IMPORT_SUB_BATCH_SIZE, 200)
    }

    // ===== 文件大小 =====

    async fn get_max_file_size_mb(&self) -> ConfigResult<u64> {
        self.get_parsed_or_default(config_keys::IMPORT_MAX_FILE_SIZE_MB, 20)
    }

    async fn get_async_threshold_mb(&self) -> ConfigResult<u64> {
        self.get_parsed_or_default(config_keys::IMPORT_ASYNC_THRESHOLD_MB, 5)
    }

    // ===== 错误列表 =====

    async fn get_error_head_limit(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::IMPORT_ERROR_HEAD_LIMIT, 100)
    }

    async fn get_error_tail_limit(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::IMPORT_ERROR_TAIL_LIMIT, 20)
    }

    async fn get_import_mode(&self) -> ConfigResult<ImportMode> {
        match self.get_global_config_value(config_keys::IMPORT_MODE)? {
            None => Ok(ImportMode::Strict),
            Some(raw) => Ok(raw.parse::<ImportMode>().unwrap_or_else(|_| {
                warn!(config_key = config_keys::IMPORT_MODE, raw_value = %raw, "导入模式配置错误，使用 STRICT");
                ImportMode::Strict
            })),
        }
    }

    // ===== 校验区间 =====

    async fn get_fiscal_year_tolerance(&self) -> ConfigResult<i32> {
        self.get_parsed_or_default(config_keys::FISCAL_YEAR_TOLERANCE, 5)
    }

    async fn get_tx_date_past_years(&self) -> ConfigResult<i64> {
        self.get_parsed_or_default(config_keys::TX_DATE_PAST_YEARS, 10)
    }

    async fn get_tx_date_future_days(&self) -> ConfigResult<i64> {
        self.get_parsed_or_default(config_keys::TX_DATE_FUTURE_DAYS, 30)
    }

    async fn get_tx_date_strict(&self) -> ConfigResult<bool> {
        self.get_parsed_or_default(config_keys::TX_DATE_STRICT, false)
    }

    async fn get_default_operator_code(&self) -> ConfigResult<String> {
        let value = self
            .get_global_config_value(config_keys::DEFAULT_OPERATOR_CODE)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(value.unwrap_or_else(|| crate::domain::SYSTEM_OPERATOR.to_string()))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 分块与批量
    pub const IMPORT_CHUNK_SIZE: &str = "import_chunk_size";
    pub const IMPORT_SUB_BATCH_SIZE: &str = "import_sub_batch_size";

    // 文件大小
    pub const IMPORT_MAX_FILE_SIZE_MB: &str = "import_max_file_size_mb";
    pub const IMPORT_ASYNC_THRESHOLD_MB: &str = "import_async_threshold_mb";

    // 错误列表
    pub const IMPORT_ERROR_HEAD_LIMIT: &str = "import_error_head_limit";
    pub const IMPORT_ERROR_TAIL_LIMIT: &str = "import_error_tail_limit";
    pub const IMPORT_MODE: &str = "import_mode";

    // 校验区间
    pub const FISCAL_YEAR_TOLERANCE: &str = "fiscal_year_tolerance";
    pub const TX_DATE_PAST_YEARS: &str = "tx_date_past_years";
    pub const TX_DATE_FUTURE_DAYS: &str = "tx_date_future_days";
    pub const TX_DATE_STRICT: &str = "tx_date_strict";

    // 操作员
    pub const DEFAULT_OPERATOR_CODE: &str = "default_operator_code";

    pub const ALL: [&str; 12] = [
        IMPORT_CHUNK_SIZE,
        IMPORT_SUB_BATCH_SIZE,
        IMPORT_MAX_FILE_SIZE_MB,
        IMPORT_ASYNC_THRESHOLD_MB,
        IMPORT_ERROR_HEAD_LIMIT,
        IMPORT_ERROR_TAIL_LIMIT,
        IMPORT_MODE,
        FISCAL_YEAR_TOLERANCE,
        TX_DATE_PAST_YEARS,
        TX_DATE_FUTURE_DAYS,
        TX_DATE_STRICT,
        DEFAULT_OPERATOR_CODE,
    ];

    /// 默认值（文本形式）
    pub fn default_for(key: &str) -> &'static str {
        match key {
            IMPORT_CHUNK_SIZE => "1000",
            IMPORT_SUB_BATCH_SIZE => "200",
            IMPORT_MAX_FILE_SIZE_MB => "20",
            IMPORT_ASYNC_THRESHOLD_MB => "5",
            IMPORT_ERROR_HEAD_LIMIT => "100",
            IMPORT_ERROR_TAIL_LIMIT => "20",
            IMPORT_MODE => "STRICT",
            FISCAL_YEAR_TOLERANCE => "5",
            TX_DATE_PAST_YEARS => "10",
            TX_DATE_FUTURE_DAYS => "30",
            TX_DATE_STRICT => "false",
            DEFAULT_OPERATOR_CODE => "system",
            _ => "",
        }
    }
}
