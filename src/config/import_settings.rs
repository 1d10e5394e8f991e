// ==========================================
// 学费缴款对账系统 - 导入运行参数
// ==========================================
// 职责: 每次导入开始时从配置读取一次，运行期间不再变化
// ==========================================

use crate::config::error::ConfigResult;
use crate::config::import_config_trait::ImportConfigReader;
use crate::domain::{ImportMode, SYSTEM_OPERATOR};

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub chunk_size: usize,
    pub sub_batch_size: usize,
    pub max_file_size_mb: u64,
    pub async_threshold_mb: u64,
    pub error_head_limit: usize,
    pub error_tail_limit: usize,
    pub import_mode: ImportMode,
    pub fiscal_year_tolerance: i32,
    pub tx_date_past_years: i64,
    pub tx_date_future_days: i64,
    pub tx_date_strict: bool,
    pub default_operator_code: String,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            sub_batch_size: 200,
            max_file_size_mb: 20,
            async_threshold_mb: 5,
            error_head_limit: 100,
            error_tail_limit: 20,
            import_mode: ImportMode::Strict,
            fiscal_year_tolerance: 5,
            tx_date_past_years: 10,
            tx_date_future_days: 30,
            tx_date_strict: false,
            default_operator_code: SYSTEM_OPERATOR.to_string(),
        }
    }
}

impl ImportSettings {
    /// 从配置读取器加载
    pub async fn from_reader<C>(reader: &C) -> ConfigResult<Self>
    where
        C: ImportConfigReader + ?Sized,
    {
        Ok(Self {
            chunk_size: reader.get_chunk_size().await?,
            sub_batch_size: reader.get_sub_batch_size().await?,
            max_file_size_mb: reader.get_max_file_size_mb().await?,
            async_threshold_mb: reader.get_async_threshold_mb().await?,
            error_head_limit: reader.get_error_head_limit().await?,
            error_tail_limit: reader.get_error_tail_limit().await?,
            import_mode: reader.get_import_mode().await?,
            fiscal_year_tolerance: reader.get_fiscal_year_tolerance().await?,
            tx_date_past_years: reader.get_tx_date_past_years().await?,
            tx_date_future_days: reader.get_tx_date_future_days().await?,
            tx_date_strict: reader.get_tx_date_strict().await?,
            default_operator_code: reader.get_default_operator_code().await?,
        })
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn async_threshold_bytes(&self) -> u64 {
        self.async_threshold_mb.saturating_mul(BYTES_PER_MB)
    }
}
