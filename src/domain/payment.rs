// ==========================================
// 学费缴款对账系统 - 缴款领域模型
// ==========================================
// 职责: 定义规范化缴款记录（落库单元）
// 用途: 导入层写入,对账/报表只读
// 对齐: tuition_payment 表
// ==========================================

use crate::domain::types::SourceFamily;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 默认操作员代码（源文件缺失 KD_USER 时使用）
pub const SYSTEM_OPERATOR: &str = "system";

// ==========================================
// CommunityFund - 社区基金金额
// ==========================================
// 源系统把该列当自由文本（混有 "-"、"N/A" 等占位符）
// 导入时不做强制数值化，只在消费端按"可解析则取值，否则为 0"处理
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommunityFund {
    Numeric(i64),
    Unparsed(String),
}

impl CommunityFund {
    /// 从原始文本构造
    ///
    /// 仅当文本本身就是规范整数（纯数字，无前导零）时视为数值，
    /// 保证 `as_stored_text` 总能还原原文；"25.000"、"Rp 5.000" 之类原样保留。
    pub fn parse(raw: &str) -> Self {
        let canonical = !raw.is_empty()
            && raw.chars().all(|c| c.is_ascii_digit())
            && (raw == "0" || !raw.starts_with('0'));

        if canonical {
            if let Ok(value) = raw.parse::<i64>() {
                return CommunityFund::Numeric(value);
            }
        }
        CommunityFund::Unparsed(raw.to_string())
    }

    /// 消费端口径：可解析则取值，否则为 0
    pub fn amount_or_zero(&self) -> i64 {
        match self {
            CommunityFund::Numeric(value) => *value,
            CommunityFund::Unparsed(_) => 0,
        }
    }

    /// 落库文本（与源值逐字一致）
    pub fn as_stored_text(&self) -> String {
        match self {
            CommunityFund::Numeric(value) => value.to_string(),
            CommunityFund::Unparsed(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for CommunityFund {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_stored_text())
    }
}

// ==========================================
// PaymentRecord - 规范化缴款记录
// ==========================================
// 红线: reference_no 非空时全局唯一，重复即拒绝，不覆盖
// 金额单位: 货币最小单位（非负整数）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    // ===== 学生身份（必填）=====
    pub school_id: String,    // SEKOLAH / Institution
    pub student_id: String,   // ID_SISWA / Invoice No.
    pub student_name: String, // NAMA_SISWA / Name

    // ===== 学生附加信息 =====
    pub address: Option<String>,    // ALAMAT
    pub class_name: Option<String>, // KELAS
    pub major: Option<String>,      // JURUSAN

    // ===== 金额 =====
    pub billed_amount: i64,                // JUM_TAGIHAN
    pub admin_fee: i64,                    // BIAYA_ADM
    pub other_charge: i64,                 // TAGIHAN_LAIN
    pub other_charge_note: Option<String>, // KET_TAGIHAN_LAIN
    pub remark: Option<String>,            // KETERANGAN
    pub community_fund: Option<CommunityFund>, // DANA_MASYARAKAT

    // ===== 账期（必填）=====
    pub fiscal_year: i32,  // TAHUN
    pub fiscal_month: u32, // BULAN (1-12)

    // ===== 交易信息 =====
    pub transaction_at: NaiveDateTime,  // TGL_TX（解析失败时为导入时刻）
    pub transaction_at_display: String, // TGL_TX 原文（审计用）
    pub paid: bool,                     // STS_BAYAR
    pub branch_code: Option<String>,    // KD_CAB
    pub operator_code: String,          // KD_USER（缺省 system）
    pub reversal: bool,                 // STS_REVERSAL
    pub reference_no: Option<String>,   // NO_BUKTI（判重自然键）

    // ===== 元信息 =====
    pub source_family: SourceFamily, // 来源文件族
    pub batch_id: String,            // 导入批次 ID
    pub row_number: usize,           // 源文件数据行号（从 1 开始）
    pub created_at: DateTime<Utc>,   // 记录创建时间
}

impl PaymentRecord {
    /// 总应缴金额（账单 + 手续费 + 其他费用）
    pub fn total_amount(&self) -> i64 {
        self.billed_amount
            .saturating_add(self.admin_fee)
            .saturating_add(self.other_charge)
    }

    /// 社区基金金额（消费端口径）
    pub fn community_fund_amount(&self) -> i64 {
        self.community_fund
            .as_ref()
            .map(CommunityFund::amount_or_zero)
            .unwrap_or(0)
    }
}
