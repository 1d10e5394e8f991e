// ==========================================
// 学费缴款对账系统 - 单元格值解析
// ==========================================
// 职责: 金额 / 整数 / 月份 / 标志位 / 日期时间 的宽松转换
// 红线: 金额解析永不报错（去除全部非数字字符后解析，空则为 0）
// ==========================================

use crate::importer::chunked_reader::CellValue;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

/// 银行结算文件中表示"已缴"的状态值（比较时忽略大小写）
pub const PAID_STATUS_TOKENS: &[&str] = &["paid", "lunas", "sudah bayar"];

/// 带时间的格式（按顺序尝试，两位年份格式在前以免被四位年份格式误吞）
const DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%y %H:%M:%S",
    "%d/%m/%y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// 仅日期的格式
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%y",
    "%d/%m/%Y",
    "%d-%m-%y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
];

/// 印尼语月份名 → 英文（兜底解析前替换）
const INDONESIAN_MONTHS: &[(&str, &str)] = &[
    ("JANUARI", "January"),
    ("FEBRUARI", "February"),
    ("MARET", "March"),
    ("APRIL", "April"),
    ("MEI", "May"),
    ("JUNI", "June"),
    ("JULI", "July"),
    ("AGUSTUS", "August"),
    ("SEPTEMBER", "September"),
    ("OKTOBER", "October"),
    ("NOVEMBER", "November"),
    ("DESEMBER", "December"),
    ("AGT", "Aug"),
    ("AGU", "Aug"),
    ("OKT", "Oct"),
    ("DES", "Dec"),
];

/// 月份名（印尼语 / 英文，全称与缩写）
const MONTH_NAMES: &[(&str, u32)] = &[
    ("JANUARI", 1),
    ("JANUARY", 1),
    ("JAN", 1),
    ("FEBRUARI", 2),
    ("FEBRUARY", 2),
    ("FEB", 2),
    ("PEB", 2),
    ("MARET", 3),
    ("MARCH", 3),
    ("MAR", 3),
    ("APRIL", 4),
    ("APR", 4),
    ("MEI", 5),
    ("MAY", 5),
    ("JUNI", 6),
    ("JUNE", 6),
    ("JUN", 6),
    ("JULI", 7),
    ("JULY", 7),
    ("JUL", 7),
    ("AGUSTUS", 8),
    ("AUGUST", 8),
    ("AGU", 8),
    ("AGT", 8),
    ("AUG", 8),
    ("SEPTEMBER", 9),
    ("SEP", 9),
    ("SEPT", 9),
    ("OKTOBER", 10),
    ("OCTOBER", 10),
    ("OKT", 10),
    ("OCT", 10),
    ("NOVEMBER", 11),
    ("NOV", 11),
    ("NOPEMBER", 11),
    ("DESEMBER", 12),
    ("DECEMBER", 12),
    ("DES", 12),
    ("DEC", 12),
];

/// 金额（货币最小单位，非负）
///
/// 数值单元格直接取整；文本单元格去除全部非数字字符后解析。
/// 注意: 文本 "350.5" 会得到 3505（不区分小数点与千分位符）。
pub fn parse_amount(cell: &CellValue) -> i64 {
    match cell {
        CellValue::Int(i) => i.saturating_abs(),
        CellValue::Float(f) if f.is_finite() => f.trunc().abs() as i64,
        CellValue::Text(s) => parse_amount_text(s),
        _ => 0,
    }
}

pub fn parse_amount_text(raw: &str) -> i64 {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return 0;
    }
    digits.parse::<i64>().unwrap_or(0)
}

/// 整数（年份等）
///
/// # 返回
/// - None: 空单元格
/// - Some(Err(raw)): 非空但不是整数
/// - Some(Ok(v)): 解析成功
pub fn parse_integer(cell: &CellValue) -> Option<Result<i64, String>> {
    match cell {
        CellValue::Empty => None,
        CellValue::Int(i) => Some(Ok(*i)),
        CellValue::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(Ok(*f as i64)),
        CellValue::Text(s) => {
            let trimmed = s.trim();
            if let Ok(v) = trimmed.parse::<i64>() {
                return Some(Ok(v));
            }
            // "2024.0" 之类由表格软件导出的整数
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() && f.fract() == 0.0 => Some(Ok(f as i64)),
                _ => Some(Err(trimmed.to_string())),
            }
        }
        other => Some(Err(other.as_text())),
    }
}

/// 月份（数字或月份名）
pub fn parse_month(cell: &CellValue) -> Option<Result<i64, String>> {
    match parse_integer(cell)? {
        Ok(v) => Some(Ok(v)),
        Err(raw) => {
            let upper = raw.trim().trim_end_matches('.').to_uppercase();
            MONTH_NAMES
                .iter()
                .find(|(name, _)| *name == upper)
                .map(|(_, month)| Ok(i64::from(*month)))
                .or(Some(Err(raw)))
        }
    }
}

/// 标志位（1/Y/YA/TRUE/LUNAS ... 为真，其余为假）
pub fn parse_flag(cell: &CellValue) -> bool {
    match cell {
        CellValue::Bool(b) => *b,
        CellValue::Int(i) => *i != 0,
        CellValue::Float(f) => *f != 0.0,
        CellValue::Text(s) => matches!(
            s.trim().to_uppercase().as_str(),
            "1" | "Y" | "YA" | "YES" | "T" | "TRUE" | "LUNAS" | "PAID"
        ),
        _ => false,
    }
}

/// 银行结算文件的"已缴"判定（TRIM 后忽略大小写等值比较）
pub fn is_paid_status(cell: &CellValue) -> bool {
    let text = cell.as_text();
    let normalized = text.trim().to_lowercase();
    PAID_STATUS_TOKENS.iter().any(|token| *token == normalized)
}

/// Excel 序列日期 → NaiveDateTime（基准 1899-12-30）
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc() as i64;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    base.checked_add_signed(Duration::days(days))?
        .checked_add_signed(Duration::seconds(seconds))
}

/// 单元格 → 日期时间
///
/// 日期单元格直接返回；数值单元格在合理区间内按 Excel 序列日期处理；
/// 其余按文本格式列表解析。
pub fn parse_datetime(cell: &CellValue) -> Option<NaiveDateTime> {
    match cell {
        CellValue::Empty => None,
        CellValue::DateTime(dt) => Some(*dt),
        CellValue::Float(f) if (1.0..100_000.0).contains(f) => excel_serial_to_datetime(*f),
        CellValue::Int(i) if (1..100_000).contains(i) => excel_serial_to_datetime(*i as f64),
        other => parse_datetime_text(&other.as_text()),
    }
}

/// 文本 → 日期时间（格式列表优先，最后尝试宽松解析）
pub fn parse_datetime_text(raw: &str) -> Option<NaiveDateTime> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    parse_datetime_freeform(text)
}

/// 宽松解析: RFC3339 / RFC2822 / 印尼语月份名 / 紧凑数字格式
fn parse_datetime_freeform(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.naive_local());
    }

    let translated = translate_month_names(text);
    // %B 解析时同时接受全称与三字母缩写
    for fmt in [
        "%d %B %Y %H:%M:%S",
        "%d %B %Y %H:%M",
        "%d %B %Y",
        "%d-%B-%Y",
        "%B %d, %Y",
        "%B %d %Y",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&translated, fmt) {
            return Some(dt);
        }
        if let Ok(d) = NaiveDate::parse_from_str(&translated, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        match text.len() {
            14 => return NaiveDateTime::parse_from_str(text, "%Y%m%d%H%M%S").ok(),
            8 => {
                return NaiveDate::parse_from_str(text, "%Y%m%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            }
            _ => {}
        }
    }

    None
}

fn translate_month_names(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let trimmed = word.trim_end_matches(',');
            let upper = trimmed.to_uppercase();
            match INDONESIAN_MONTHS.iter().find(|(id, _)| *id == upper) {
                Some((_, en)) => word.replacen(trimmed, en, 1),
                None => word.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
