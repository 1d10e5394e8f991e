// ==========================================
// 学费缴款对账系统 - 配置层错误类型
// ==========================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置库访问失败: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("配置锁获取失败: {0}")]
    LockError(String),

    #[error("配置值非法 (key={key}): {value}")]
    InvalidValue { key: String, value: String },

    #[error("未知配置键: {0}")]
    UnknownKey(String),
}

impl<T> From<std::sync::PoisonError<T>> for ConfigError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ConfigError::LockError(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
