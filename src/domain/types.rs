// ==========================================
// 学费缴款对账系统 - 领域类型定义
// ==========================================
// 职责: 来源文件族 / 导入严格度 等枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 来源文件族 (Source Family)
// ==========================================
// LEGACY: 内部导出格式（SEKOLAH, ID_SISWA ... 规范列名）
// BANK:   银行结算 CSV（自然语言列名，仅"已缴"行落库）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceFamily {
    Legacy,
    Bank,
}

impl SourceFamily {
    pub const ALL: [SourceFamily; 2] = [SourceFamily::Legacy, SourceFamily::Bank];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFamily::Legacy => "LEGACY",
            SourceFamily::Bank => "BANK",
        }
    }

    /// 是否按缴费状态过滤（仅银行结算文件）
    pub fn gates_on_paid_status(&self) -> bool {
        matches!(self, SourceFamily::Bank)
    }

    /// 是否强制要求结算凭证号
    ///
    /// 银行结算文件的凭证号是唯一可靠的幂等键；内部导出的历史数据允许为空。
    pub fn requires_reference(&self) -> bool {
        matches!(self, SourceFamily::Bank)
    }
}

impl fmt::Display for SourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LEGACY" => Ok(SourceFamily::Legacy),
            "BANK" => Ok(SourceFamily::Bank),
            other => Err(format!("未知的来源文件族: {}", other)),
        }
    }
}

// ==========================================
// 导入严格度 (Import Mode)
// ==========================================
// STRICT: 逐条查库判重，错误信息带字段/原值明细
// FAST:   按块批量预查，错误信息精简
// 两种模式的字段解析规则完全一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportMode {
    #[default]
    Strict,
    Fast,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Strict => "STRICT",
            ImportMode::Fast => "FAST",
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STRICT" => Ok(ImportMode::Strict),
            "FAST" => Ok(ImportMode::Fast),
            other => Err(format!("未知的导入模式: {}", other)),
        }
    }
}
