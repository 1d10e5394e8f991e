// ==========================================
// 学费缴款对账系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入流程所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::error::ConfigResult;
use crate::domain::ImportMode;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入流程所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
// 约定: 配置缺失或格式错误时返回默认值，不报错
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 分块与批量 =====

    /// 每块读取行数
    ///
    /// # 默认值
    /// - 1000
    async fn get_chunk_size(&self) -> ConfigResult<usize>;

    /// 单条 INSERT 语句的记录数上限
    ///
    /// # 默认值
    /// - 200
    async fn get_sub_batch_size(&self) -> ConfigResult<usize>;

    // ===== 文件大小 =====

    /// 文件大小上限（MB），超过则在打开阶段拒绝
    ///
    /// # 默认值
    /// - 20
    async fn get_max_file_size_mb(&self) -> ConfigResult<u64>;

    /// 建议转后台执行的文件大小阈值（MB）
    ///
    /// # 默认值
    /// - 5
    async fn get_async_threshold_mb(&self) -> ConfigResult<u64>;

    // ===== 错误列表 =====

    /// 保留的前 N 条错误
    ///
    /// # 默认值
    /// - 100
    async fn get_error_head_limit(&self) -> ConfigResult<usize>;

    /// 保留的后 N 条错误
    ///
    /// # 默认值
    /// - 20
    async fn get_error_tail_limit(&self) -> ConfigResult<usize>;

    /// 导入严格度
    ///
    /// # 默认值
    /// - STRICT
    async fn get_import_mode(&self) -> ConfigResult<ImportMode>;

    // ===== 校验区间 =====

    /// 账期年份与当前年份的最大距离
    ///
    /// # 默认值
    /// - 5
    async fn get_fiscal_year_tolerance(&self) -> ConfigResult<i32>;

    /// 交易日期合理区间下界（距导入时刻的年数）
    ///
    /// # 默认值
    /// - 10
    async fn get_tx_date_past_years(&self) -> ConfigResult<i64>;

    /// 交易日期合理区间上界（距导入时刻的天数）
    ///
    /// # 默认值
    /// - 30
    async fn get_tx_date_future_days(&self) -> ConfigResult<i64>;

    /// 交易日期无法解析时是否拒绝整行（否则取导入时刻）
    ///
    /// # 默认值
    /// - false
    async fn get_tx_date_strict(&self) -> ConfigResult<bool>;

    /// 缺省操作员代码
    ///
    /// # 默认值
    /// - system
    async fn get_default_operator_code(&self) -> ConfigResult<String>;
}
