// ==========================================
// 学费缴款对账系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + calamine/csv
// 系统定位: 学费缴款文件（内部导出 / 银行结算）导入与判重对账
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 请求上下文（关联 ID / 操作员 / 时钟）
pub mod context;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// 性能统计
pub mod perf;

// API 层 - 业务接口
pub mod api;

// 命令行定义
pub mod cli;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    CommunityFund, ImportBatch, ImportMode, ImportResult, PaymentRecord, SourceFamily,
};

// 导入
pub use importer::{ImportError, ImportOptions, PaymentImporter, PaymentImporterImpl};

// API
pub use api::{ConfigApi, ImportApi};

// 上下文
pub use context::RequestContext;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "学费缴款对账系统";
