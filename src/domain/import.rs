// ==========================================
// 学费缴款对账系统 - 导入结果模型
// ==========================================
// 职责: 导入过程中的计数器、行级错误列表、最终结果与批次审计
// 红线: 计数必须精确；错误明细可截断，但必须注明截断条数
// ==========================================

use crate::domain::types::{ImportMode, SourceFamily};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

// ==========================================
// ErrorLog - 有界错误列表
// ==========================================
// 保留前 head_limit 条与最后 tail_limit 条，中间以汇总行替代
#[derive(Debug, Clone)]
pub struct ErrorLog {
    head_limit: usize,
    tail_limit: usize,
    head: Vec<String>,
    tail: VecDeque<String>,
    total: usize,
}

impl ErrorLog {
    pub fn new(head_limit: usize, tail_limit: usize) -> Self {
        Self {
            head_limit,
            tail_limit,
            head: Vec::new(),
            tail: VecDeque::new(),
            total: 0,
        }
    }

    pub fn push(&mut self, message: String) {
        self.total += 1;
        if self.head.len() < self.head_limit {
            self.head.push(message);
            return;
        }
        if self.tail_limit == 0 {
            return;
        }
        self.tail.push_back(message);
        if self.tail.len() > self.tail_limit {
            self.tail.pop_front();
        }
    }

    /// 累计错误条数（含被截断的）
    pub fn total(&self) -> usize {
        self.total
    }

    /// 被截断未保留的条数
    pub fn omitted(&self) -> usize {
        self.total - self.head.len() - self.tail.len()
    }

    pub fn into_messages(self) -> Vec<String> {
        let omitted = self.omitted();
        let mut messages = self.head;
        if omitted > 0 {
            messages.push(format!("... 另有 {} 条错误未显示", omitted));
        }
        messages.extend(self.tail);
        messages
    }
}

// ==========================================
// ImportTally - 导入运行中的累加器
// ==========================================
#[derive(Debug, Clone)]
pub struct ImportTally {
    pub total_rows: usize,     // 读取到的数据行（不含表头、空白行）
    pub imported: usize,       // 成功落库
    pub duplicates: usize,     // 判重拒绝
    pub invalid: usize,        // 校验拒绝
    pub skipped_unpaid: usize, // 未缴行（银行文件），不计错误
    pub storage_failed: usize, // 写库失败归因的行
    errors: ErrorLog,
}

impl ImportTally {
    pub fn new(error_head_limit: usize, error_tail_limit: usize) -> Self {
        Self {
            total_rows: 0,
            imported: 0,
            duplicates: 0,
            invalid: 0,
            skipped_unpaid: 0,
            storage_failed: 0,
            errors: ErrorLog::new(error_head_limit, error_tail_limit),
        }
    }

    pub fn record_invalid(&mut self, message: String) {
        self.invalid += 1;
        self.errors.push(message);
    }

    pub fn record_storage_failure(&mut self, message: String) {
        self.storage_failed += 1;
        self.errors.push(message);
    }

    pub fn error_count(&self) -> usize {
        self.errors.total()
    }

    /// 结束运行，生成最终结果
    pub fn finalize(
        self,
        batch_id: String,
        source_family: SourceFamily,
        import_mode: ImportMode,
        elapsed: Duration,
    ) -> ImportResult {
        let error_count = self.errors.total();
        ImportResult {
            success: true,
            batch_id,
            source_family,
            import_mode,
            total_rows: self.total_rows,
            imported: self.imported,
            duplicates: self.duplicates,
            invalid: self.invalid,
            skipped_unpaid: self.skipped_unpaid,
            storage_failed: self.storage_failed,
            errors: self.errors.into_messages(),
            error_count,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

// ==========================================
// ImportResult - 导入结果
// ==========================================
// 用途: 导入接口返回值
// 说明: 只要文件可读且表头可识别，success 即为 true（即使全部行失败）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub success: bool,
    pub batch_id: String,
    pub source_family: SourceFamily,
    pub import_mode: ImportMode,
    pub total_rows: usize,
    pub imported: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub skipped_unpaid: usize,
    pub storage_failed: usize,
    pub errors: Vec<String>,
    pub error_count: usize,
    pub duration_ms: f64,
}

// ==========================================
// ImportBatch - 导入批次审计
// ==========================================
// 对齐: import_batch 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: String,             // 批次 ID（UUID）
    pub file_name: Option<String>,    // 源文件名
    pub source_family: SourceFamily,  // 来源文件族
    pub import_mode: ImportMode,      // 导入严格度
    pub total_rows: i64,
    pub imported_rows: i64,
    pub duplicate_rows: i64,
    pub invalid_rows: i64,
    pub unpaid_rows: i64,
    pub storage_failed_rows: i64,
    pub imported_by: String,          // 操作员
    pub correlation_id: String,       // 请求关联 ID
    pub started_at: DateTime<Utc>,    // 开始时间
    pub elapsed_ms: i64,              // 耗时（毫秒）
}

impl ImportBatch {
    /// 由最终结果构造审计记录
    pub fn from_result(
        result: &ImportResult,
        file_name: Option<String>,
        imported_by: &str,
        correlation_id: &str,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            batch_id: result.batch_id.clone(),
            file_name,
            source_family: result.source_family,
            import_mode: result.import_mode,
            total_rows: result.total_rows as i64,
            imported_rows: result.imported as i64,
            duplicate_rows: result.duplicates as i64,
            invalid_rows: result.invalid as i64,
            unpaid_rows: result.skipped_unpaid as i64,
            storage_failed_rows: result.storage_failed as i64,
            imported_by: imported_by.to_string(),
            correlation_id: correlation_id.to_string(),
            started_at,
            elapsed_ms: result.duration_ms.round() as i64,
        }
    }
}
