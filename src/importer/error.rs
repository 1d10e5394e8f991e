// ==========================================
// 学费缴款对账系统 - 导入模块错误类型
// ==========================================
// 文件级错误（ImportError）: 终止整个导入
// 行级拒绝（RowRejection）:   记入错误列表，继续处理下一行
// 工具: thiserror 派生宏
// ==========================================

use crate::config::ConfigError;
use crate::domain::ImportMode;
use crate::repository::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型（文件级，终止导入）
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xlsm/.xls/.ods/.csv/.txt/.tsv）")]
    UnsupportedFormat(String),

    #[error("文件过大: {size} 字节，超过上限 {limit} 字节")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("文件为空: 未找到表头行")]
    EmptyFile,

    // ===== 表头识别错误 =====
    #[error("无法识别的文件格式: 表头 [{headers}] 未匹配任何已知字段")]
    UnrecognizedHeader { headers: String },

    // ===== 配置/存储错误 =====
    #[error("配置读取失败: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ImportError {
    /// 是否属于文件格式错误（文件不可读/超限/扩展名错误/表头无法识别）
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            ImportError::FileNotFound(_)
                | ImportError::UnsupportedFormat(_)
                | ImportError::FileTooLarge { .. }
                | ImportError::FileReadError(_)
                | ImportError::ExcelParseError(_)
                | ImportError::CsvParseError(_)
                | ImportError::EmptyFile
                | ImportError::UnrecognizedHeader { .. }
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

// 实现 From<ConfigError>
impl From<ConfigError> for ImportError {
    fn from(err: ConfigError) -> Self {
        ImportError::ConfigError(err.to_string())
    }
}

/// Result 类型别名
pub type ImporterResult<T> = Result<T, ImportError>;

// ==========================================
// RowRejection - 行级拒绝原因
// ==========================================
// Display 为 STRICT 模式的明细文本；FAST 模式使用 brief()
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowRejection {
    #[error("行 {row}: 必填字段缺失 [{}]", fields.join(", "))]
    MissingFields { row: usize, fields: Vec<&'static str> },

    #[error("行 {row}: 字段 {field} 不是有效整数: {value}")]
    InvalidNumber {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("行 {row}: 字段 {field} 超出范围: {value} 不在 [{min}, {max}]")]
    OutOfRange {
        row: usize,
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("行 {row}: 字段 {field} 日期格式错误: {value}")]
    DateFormat {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("行 {row}: 字段 {field} 日期超出合理区间: {value}")]
    DateOutOfWindow {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("行 {row}: 字段 {field} 为空，无法判重")]
    MissingReference { row: usize, field: &'static str },

    #[error("行 {row}: 写入失败 (凭证号 {reference}): {message}")]
    Storage {
        row: usize,
        reference: String,
        message: String,
    },
}

impl RowRejection {
    pub fn row(&self) -> usize {
        match self {
            RowRejection::MissingFields { row, .. }
            | RowRejection::InvalidNumber { row, .. }
            | RowRejection::OutOfRange { row, .. }
            | RowRejection::DateFormat { row, .. }
            | RowRejection::DateOutOfWindow { row, .. }
            | RowRejection::MissingReference { row, .. }
            | RowRejection::Storage { row, .. } => *row,
        }
    }

    /// 精简文本（不含原值与明细）
    pub fn brief(&self) -> String {
        let row = self.row();
        match self {
            RowRejection::MissingFields { .. } => format!("行 {}: 必填字段缺失", row),
            RowRejection::InvalidNumber { field, .. } => format!("行 {}: {} 格式错误", row, field),
            RowRejection::OutOfRange { field, .. } => format!("行 {}: {} 超出范围", row, field),
            RowRejection::DateFormat { field, .. } => format!("行 {}: {} 日期格式错误", row, field),
            RowRejection::DateOutOfWindow { field, .. } => {
                format!("行 {}: {} 日期超出合理区间", row, field)
            }
            RowRejection::MissingReference { field, .. } => format!("行 {}: {} 为空", row, field),
            RowRejection::Storage { .. } => format!("行 {}: 写入失败", row),
        }
    }

    /// 按导入模式渲染
    pub fn render(&self, mode: ImportMode) -> String {
        match mode {
            ImportMode::Strict => self.to_string(),
            ImportMode::Fast => self.brief(),
        }
    }
}
