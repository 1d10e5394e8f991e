// ==========================================
// 学费缴款对账系统 - 行解码器
// ==========================================
// 职责: RawRow + ColumnMapping → PaymentRecord 或行级拒绝
// 规则:
// - 非必填字段缺失/空值 → 默认值（空串 / 0）
// - 必填字段（学校、学生编号、姓名、年份、月份）缺失 → 整行拒绝，列出全部缺失字段
// - 年份/月份越界 → 拒绝（不做截断）
// - 交易日期: 可解析但超出合理区间 → 拒绝；无法解析 → 取导入时刻
// - 缴费状态始终解析（即使整行被拒绝），供调度层做未缴过滤
// ==========================================

use crate::config::ImportSettings;
use crate::context::RequestContext;
use crate::domain::{CommunityFund, ImportMode, PaymentRecord, SourceFamily};
use crate::importer::chunked_reader::{CellValue, RawRow, EMPTY_CELL};
use crate::importer::error::RowRejection;
use crate::importer::header_normalizer::{CanonicalField, ColumnMapping};
use crate::importer::value_parser::{
    is_paid_status, parse_amount, parse_datetime, parse_flag, parse_integer, parse_month,
};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDateTime, Utc};
use tracing::debug;

// ==========================================
// DecodeRules - 单次导入的解码参数
// ==========================================
#[derive(Debug, Clone)]
pub struct DecodeRules {
    pub family: SourceFamily,
    pub mode: ImportMode,
    pub fiscal_year_min: i32,
    pub fiscal_year_max: i32,
    pub tx_window_start: NaiveDateTime,
    pub tx_window_end: NaiveDateTime,
    pub import_time: NaiveDateTime,
    pub strict_dates: bool,
    pub default_operator: String,
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
}

impl DecodeRules {
    pub fn new(
        settings: &ImportSettings,
        family: SourceFamily,
        mode: ImportMode,
        batch_id: &str,
        ctx: &RequestContext,
    ) -> Self {
        let import_time = ctx.import_time();
        let current_year = import_time.year();
        let past_months = u32::try_from(settings.tx_date_past_years.max(0).saturating_mul(12))
            .unwrap_or(u32::MAX);

        Self {
            family,
            mode,
            fiscal_year_min: current_year - settings.fiscal_year_tolerance,
            fiscal_year_max: current_year + settings.fiscal_year_tolerance,
            tx_window_start: import_time
                .checked_sub_months(Months::new(past_months))
                .unwrap_or(NaiveDateTime::MIN),
            tx_window_end: import_time
                .checked_add_signed(Duration::days(settings.tx_date_future_days.max(0)))
                .unwrap_or(NaiveDateTime::MAX),
            import_time,
            strict_dates: settings.tx_date_strict,
            default_operator: settings.default_operator_code.clone(),
            batch_id: batch_id.to_string(),
            created_at: ctx.started_at_utc(),
        }
    }
}

// ==========================================
// DecodedRow - 解码结果
// ==========================================
#[derive(Debug, Clone)]
pub struct DecodedRow {
    pub row_number: usize,
    /// 缴费状态（与解码成功与否无关）
    pub paid: bool,
    pub outcome: Result<PaymentRecord, RowRejection>,
}

// ==========================================
// RowDecoder
// ==========================================
pub struct RowDecoder {
    mapping: ColumnMapping,
    rules: DecodeRules,
}

impl RowDecoder {
    pub fn new(mapping: ColumnMapping, rules: DecodeRules) -> Self {
        Self { mapping, rules }
    }

    pub fn rules(&self) -> &DecodeRules {
        &self.rules
    }

    pub fn decode(&self, row: &RawRow) -> DecodedRow {
        let paid = self.paid_status(row);
        DecodedRow {
            row_number: row.row_number,
            paid,
            outcome: self.decode_record(row, paid),
        }
    }

    fn cell<'a>(&self, row: &'a RawRow, field: CanonicalField) -> &'a CellValue {
        match self.mapping.get(field) {
            Some(column) => row.cell(column),
            None => &EMPTY_CELL,
        }
    }

    /// 文本字段（空串视为缺失）
    fn text(&self, row: &RawRow, field: CanonicalField) -> Option<String> {
        let value = self.cell(row, field).as_text();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn paid_status(&self, row: &RawRow) -> bool {
        let cell = self.cell(row, CanonicalField::PaidStatus);
        match self.rules.family {
            SourceFamily::Bank => is_paid_status(cell),
            SourceFamily::Legacy => parse_flag(cell),
        }
    }

    fn decode_record(&self, row: &RawRow, paid: bool) -> Result<PaymentRecord, RowRejection> {
        let row_no = row.row_number;

        // ===== 必填字段 =====
        let school_id = self.text(row, CanonicalField::SchoolId);
        let student_id = self.text(row, CanonicalField::StudentId);
        let student_name = self.text(row, CanonicalField::StudentName);
        let year = parse_integer(self.cell(row, CanonicalField::FiscalYear));
        let month = parse_month(self.cell(row, CanonicalField::FiscalMonth));

        let missing: Vec<&'static str> = [
            (CanonicalField::SchoolId, school_id.is_none()),
            (CanonicalField::StudentId, student_id.is_none()),
            (CanonicalField::StudentName, student_name.is_none()),
            (CanonicalField::FiscalYear, year.is_none()),
            (CanonicalField::FiscalMonth, month.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(field, _)| field.token())
        .collect();

        let (Some(school_id), Some(student_id), Some(student_name), Some(year), Some(month)) =
            (school_id, student_id, student_name, year, month)
        else {
            return Err(RowRejection::MissingFields {
                row: row_no,
                fields: missing,
            });
        };

        // ===== 账期 =====
        let fiscal_year = self.check_range(
            row_no,
            CanonicalField::FiscalYear,
            year,
            i64::from(self.rules.fiscal_year_min),
            i64::from(self.rules.fiscal_year_max),
        )?;
        let fiscal_month =
            self.check_range(row_no, CanonicalField::FiscalMonth, month, 1, 12)?;

        // ===== 交易时间 =====
        let (transaction_at, transaction_at_display) = self.transaction_at(row)?;

        // ===== 金额 =====
        let community_fund = self
            .text(row, CanonicalField::CommunityFund)
            .map(|raw| CommunityFund::parse(&raw));

        Ok(PaymentRecord {
            school_id,
            student_id,
            student_name,
            address: self.text(row, CanonicalField::Address),
            class_name: self.text(row, CanonicalField::ClassName),
            major: self.text(row, CanonicalField::Major),
            billed_amount: parse_amount(self.cell(row, CanonicalField::BilledAmount)),
            admin_fee: parse_amount(self.cell(row, CanonicalField::AdminFee)),
            other_charge: parse_amount(self.cell(row, CanonicalField::OtherCharge)),
            other_charge_note: self.text(row, CanonicalField::OtherChargeNote),
            remark: self.text(row, CanonicalField::Remark),
            community_fund,
            fiscal_year: fiscal_year as i32,
            fiscal_month: fiscal_month as u32,
            transaction_at,
            transaction_at_display,
            paid,
            branch_code: self.text(row, CanonicalField::BranchCode),
            operator_code: self
                .text(row, CanonicalField::OperatorCode)
                .unwrap_or_else(|| self.rules.default_operator.clone()),
            reversal: parse_flag(self.cell(row, CanonicalField::ReversalFlag)),
            reference_no: self.text(row, CanonicalField::ReferenceNo),
            source_family: self.rules.family,
            batch_id: self.rules.batch_id.clone(),
            row_number: row_no,
            created_at: self.rules.created_at,
        })
    }

    fn check_range(
        &self,
        row: usize,
        field: CanonicalField,
        parsed: Result<i64, String>,
        min: i64,
        max: i64,
    ) -> Result<i64, RowRejection> {
        let value = parsed.map_err(|raw| RowRejection::InvalidNumber {
            row,
            field: field.token(),
            value: raw,
        })?;

        if value < min || value > max {
            return Err(RowRejection::OutOfRange {
                row,
                field: field.token(),
                value,
                min,
                max,
            });
        }
        Ok(value)
    }

    /// 交易时间与原文
    fn transaction_at(&self, row: &RawRow) -> Result<(NaiveDateTime, String), RowRejection> {
        let cell = self.cell(row, CanonicalField::TransactionAt);
        let shown = cell.as_text();
        let field = CanonicalField::TransactionAt.token();

        match parse_datetime(cell) {
            Some(dt) => {
                if dt < self.rules.tx_window_start || dt > self.rules.tx_window_end {
                    return Err(RowRejection::DateOutOfWindow {
                        row: row.row_number,
                        field,
                        value: shown,
                    });
                }
                Ok((dt, shown))
            }
            None if cell.is_empty() => Ok((self.rules.import_time, shown)),
            None if self.rules.strict_dates => Err(RowRejection::DateFormat {
                row: row.row_number,
                field,
                value: shown,
            }),
            None => {
                debug!(row = row.row_number, value = %shown, "交易日期无法解析，取导入时刻");
                Ok((self.rules.import_time, shown))
            }
        }
    }
}
