// ==========================================
// 学费缴款对账系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含导入流程逻辑
// ==========================================

pub mod import;
pub mod payment;
pub mod types;

// 重导出核心类型
pub use import::{ErrorLog, ImportBatch, ImportResult, ImportTally};
pub use payment::{CommunityFund, PaymentRecord, SYSTEM_OPERATOR};
pub use types::{ImportMode, SourceFamily};
