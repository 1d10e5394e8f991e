// ==========================================
// 学费缴款对账系统 - 表头规范化
// ==========================================
// 职责: 原始表头 → 规范字段 → 列下标（ColumnMapping）
// 规则: TRIM + UPPER，`.` `-` 与空白串统一替换为单个 `_`
// 匹配: 子串覆盖规则优先于精确匹配；先出现的列优先占位
// 红线: 未识别的表头忽略；零字段命中 = 文件格式无法识别
// ==========================================

use crate::domain::SourceFamily;
use crate::importer::error::{ImportError, ImporterResult};
use std::collections::HashMap;
use tracing::debug;

// ==========================================
// CanonicalField - 规范字段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    SchoolId,
    StudentId,
    StudentName,
    Address,
    ClassName,
    Major,
    BilledAmount,
    AdminFee,
    OtherCharge,
    OtherChargeNote,
    Remark,
    FiscalYear,
    FiscalMonth,
    CommunityFund,
    TransactionAt,
    PaidStatus,
    BranchCode,
    OperatorCode,
    ReversalFlag,
    ReferenceNo,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 20] = [
        CanonicalField::SchoolId,
        CanonicalField::StudentId,
        CanonicalField::StudentName,
        CanonicalField::Address,
        CanonicalField::ClassName,
        CanonicalField::Major,
        CanonicalField::BilledAmount,
        CanonicalField::AdminFee,
        CanonicalField::OtherCharge,
        CanonicalField::OtherChargeNote,
        CanonicalField::Remark,
        CanonicalField::FiscalYear,
        CanonicalField::FiscalMonth,
        CanonicalField::CommunityFund,
        CanonicalField::TransactionAt,
        CanonicalField::PaidStatus,
        CanonicalField::BranchCode,
        CanonicalField::OperatorCode,
        CanonicalField::ReversalFlag,
        CanonicalField::ReferenceNo,
    ];

    /// 规范列名（内部导出格式的表头即为此名）
    pub fn token(&self) -> &'static str {
        match self {
            CanonicalField::SchoolId => "SEKOLAH",
            CanonicalField::StudentId => "ID_SISWA",
            CanonicalField::StudentName => "NAMA_SISWA",
            CanonicalField::Address => "ALAMAT",
            CanonicalField::ClassName => "KELAS",
            CanonicalField::Major => "JURUSAN",
            CanonicalField::BilledAmount => "JUM_TAGIHAN",
            CanonicalField::AdminFee => "BIAYA_ADM",
            CanonicalField::OtherCharge => "TAGIHAN_LAIN",
            CanonicalField::OtherChargeNote => "KET_TAGIHAN_LAIN",
            CanonicalField::Remark => "KETERANGAN",
            CanonicalField::FiscalYear => "TAHUN",
            CanonicalField::FiscalMonth => "BULAN",
            CanonicalField::CommunityFund => "DANA_MASYARAKAT",
            CanonicalField::TransactionAt => "TGL_TX",
            CanonicalField::PaidStatus => "STS_BAYAR",
            CanonicalField::BranchCode => "KD_CAB",
            CanonicalField::OperatorCode => "KD_USER",
            CanonicalField::ReversalFlag => "STS_REVERSAL",
            CanonicalField::ReferenceNo => "NO_BUKTI",
        }
    }

    /// 缺失即整行拒绝的字段
    pub fn is_mandatory(&self) -> bool {
        matches!(
            self,
            CanonicalField::SchoolId
                | CanonicalField::StudentId
                | CanonicalField::StudentName
                | CanonicalField::FiscalYear
                | CanonicalField::FiscalMonth
        )
    }
}

// ==========================================
// 词表
// ==========================================

/// 银行结算文件: 子串覆盖规则（这些列在实际导出中命名最不稳定）
const BANK_SUBSTRING_OVERRIDES: &[(&str, CanonicalField)] = &[
    ("INSTITU", CanonicalField::SchoolId),
    ("NO_TAGIHAN", CanonicalField::StudentId),
    ("NOMOR_TAGIHAN", CanonicalField::StudentId),
    ("INVOICE_NO", CanonicalField::StudentId),
    ("TANGGAL_TRANSAKSI", CanonicalField::TransactionAt),
    ("TGL_TRANSAKSI", CanonicalField::TransactionAt),
    ("TRANSACTION_DATE", CanonicalField::TransactionAt),
    ("STATUS_PEMBAYARAN", CanonicalField::PaidStatus),
    ("STATUS_BAYAR", CanonicalField::PaidStatus),
    ("PAYMENT_STATUS", CanonicalField::PaidStatus),
];

/// 银行结算文件: 精确匹配词表（英文标签 + 印尼语标签）
const BANK_EXACT_TOKENS: &[(&str, CanonicalField)] = &[
    ("INSTANSI", CanonicalField::SchoolId),
    ("SEKOLAH", CanonicalField::SchoolId),
    ("INVOICE", CanonicalField::StudentId),
    ("INVOICE_NUMBER", CanonicalField::StudentId),
    ("NAME", CanonicalField::StudentName),
    ("NAMA", CanonicalField::StudentName),
    ("NAMA_SISWA", CanonicalField::StudentName),
    ("STUDENT_NAME", CanonicalField::StudentName),
    ("ADDRESS", CanonicalField::Address),
    ("ALAMAT", CanonicalField::Address),
    ("CLASS", CanonicalField::ClassName),
    ("KELAS", CanonicalField::ClassName),
    ("MAJOR", CanonicalField::Major),
    ("JURUSAN", CanonicalField::Major),
    ("AMOUNT_BILLED", CanonicalField::BilledAmount),
    ("BILLED_AMOUNT", CanonicalField::BilledAmount),
    ("JUMLAH_TAGIHAN", CanonicalField::BilledAmount),
    ("ADMIN_FEE", CanonicalField::AdminFee),
    ("BIAYA_ADMIN", CanonicalField::AdminFee),
    ("OTHER_CHARGES", CanonicalField::OtherCharge),
    ("OTHER_CHARGE", CanonicalField::OtherCharge),
    ("BIAYA_LAIN", CanonicalField::OtherCharge),
    ("OTHER_CHARGE_NOTE", CanonicalField::OtherChargeNote),
    ("OTHER_CHARGES_NOTE", CanonicalField::OtherChargeNote),
    ("KETERANGAN_BIAYA_LAIN", CanonicalField::OtherChargeNote),
    ("REMARK", CanonicalField::Remark),
    ("REMARKS", CanonicalField::Remark),
    ("KETERANGAN", CanonicalField::Remark),
    ("YEAR", CanonicalField::FiscalYear),
    ("TAHUN", CanonicalField::FiscalYear),
    ("MONTH", CanonicalField::FiscalMonth),
    ("BULAN", CanonicalField::FiscalMonth),
    ("COMMUNITY_FUND", CanonicalField::CommunityFund),
    ("DANA_MASYARAKAT", CanonicalField::CommunityFund),
    ("BRANCH_CODE", CanonicalField::BranchCode),
    ("KODE_CABANG", CanonicalField::BranchCode),
    ("USER", CanonicalField::OperatorCode),
    ("USER_ID", CanonicalField::OperatorCode),
    ("KODE_USER", CanonicalField::OperatorCode),
    ("REVERSAL_STATUS", CanonicalField::ReversalFlag),
    ("STATUS_REVERSAL", CanonicalField::ReversalFlag),
    ("PROOF_NO", CanonicalField::ReferenceNo),
    ("PROOF_NUMBER", CanonicalField::ReferenceNo),
    ("NO_BUKTI", CanonicalField::ReferenceNo),
    ("NOMOR_BUKTI", CanonicalField::ReferenceNo),
];

/// 内部导出文件: 子串覆盖规则
const LEGACY_SUBSTRING_OVERRIDES: &[(&str, CanonicalField)] = &[
    ("TGL_TX", CanonicalField::TransactionAt),
    ("STS_BAYAR", CanonicalField::PaidStatus),
    ("NO_BUKTI", CanonicalField::ReferenceNo),
];

// ==========================================
// ColumnMapping - 规范字段 → 列下标
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub family: SourceFamily,
    columns: HashMap<CanonicalField, usize>,
}

impl ColumnMapping {
    pub fn new(family: SourceFamily) -> Self {
        Self {
            family,
            columns: HashMap::new(),
        }
    }

    pub fn get(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// 尝试占位；已被先出现的列占用时返回 false
    fn claim(&mut self, field: CanonicalField, column: usize) -> bool {
        if self.columns.contains_key(&field) {
            return false;
        }
        self.columns.insert(field, column);
        true
    }

    /// 表头中未出现的必填字段
    pub fn missing_mandatory(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .iter()
            .copied()
            .filter(|f| f.is_mandatory() && !self.contains(*f))
            .collect()
    }
}

/// 表头单元格规范化
///
/// `"No. Tagihan"` / `"NO TAGIHAN"` / `"no_tagihan"` → `"NO_TAGIHAN"`
pub fn normalize_header(raw: &str) -> String {
    let mut token = String::with_capacity(raw.len());
    let mut pending_sep = false;

    for ch in raw.trim().chars() {
        if ch == '.' || ch == '-' || ch == '_' || ch.is_whitespace() {
            pending_sep = true;
            continue;
        }
        if pending_sep && !token.is_empty() {
            token.push('_');
        }
        pending_sep = false;
        token.extend(ch.to_uppercase());
    }

    token
}

// ==========================================
// HeaderNormalizer
// ==========================================
pub struct HeaderNormalizer;

impl HeaderNormalizer {
    /// 按指定来源文件族建立列映射
    pub fn map_headers(&self, headers: &[String], family: SourceFamily) -> ColumnMapping {
        let mut mapping = ColumnMapping::new(family);

        for (column, raw) in headers.iter().enumerate() {
            let token = normalize_header(raw);
            if token.is_empty() {
                continue;
            }
            match Self::match_token(&token, family) {
                Some(field) => {
                    if !mapping.claim(field, column) {
                        debug!(column, header = %raw, field = field.token(), "字段已被前列占用，忽略");
                    }
                }
                None => debug!(column, header = %raw, "未识别的表头，忽略"),
            }
        }

        mapping
    }

    /// 识别来源文件族并建立列映射
    ///
    /// 指定 `forced` 时只按该文件族映射；否则两族各映射一次，取命中字段多者，
    /// 并列时取内部导出格式。
    pub fn detect(
        &self,
        headers: &[String],
        forced: Option<SourceFamily>,
    ) -> ImporterResult<ColumnMapping> {
        let mapping = match forced {
            Some(family) => self.map_headers(headers, family),
            None => {
                let legacy = self.map_headers(headers, SourceFamily::Legacy);
                let bank = self.map_headers(headers, SourceFamily::Bank);
                if bank.len() > legacy.len() {
                    bank
                } else {
                    legacy
                }
            }
        };

        if mapping.is_empty() {
            return Err(ImportError::UnrecognizedHeader {
                headers: headers.join(", "),
            });
        }

        Ok(mapping)
    }

    fn match_token(token: &str, family: SourceFamily) -> Option<CanonicalField> {
        let overrides = match family {
            SourceFamily::Legacy => LEGACY_SUBSTRING_OVERRIDES,
            SourceFamily::Bank => BANK_SUBSTRING_OVERRIDES,
        };
        if let Some((_, field)) = overrides.iter().find(|(needle, _)| token.contains(needle)) {
            return Some(*field);
        }

        match family {
            SourceFamily::Legacy => CanonicalField::ALL
                .iter()
                .copied()
                .find(|f| f.token() == token),
            SourceFamily::Bank => BANK_EXACT_TOKENS
                .iter()
                .find(|(name, _)| *name == token)
                .map(|(_, field)| *field),
        }
    }
}
