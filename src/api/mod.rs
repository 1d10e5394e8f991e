// ==========================================
// 学费缴款对账系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供命令行与后台任务调用
// ==========================================

pub mod config_api;
pub mod error;
pub mod import_api;

// 重导出核心类型
pub use config_api::{ConfigApi, ConfigItem};
pub use error::{ApiError, ApiResult};
pub use import_api::{ImportApi, ImportApiResponse, ImportFileOutcome};
