// ==========================================
// 学费缴款对账系统 - 批量写入器
// ==========================================
// 职责: 将一块已判重的记录按 sub_batch_size 切分并批量落库
// 红线: 子批次失败不静默跳过，整批回滚并把失败归因到该子批次的每一行
// ==========================================

use crate::domain::PaymentRecord;
use crate::repository::{PaymentRepository, RepositoryError};
use std::sync::Arc;
use tracing::{debug, warn};

/// 子批次失败明细
#[derive(Debug)]
pub struct SubBatchFailure {
    /// (行号, 凭证号)
    pub rows: Vec<(usize, Option<String>)>,
    pub error: RepositoryError,
}

/// 单块写入结果
#[derive(Debug, Default)]
pub struct WriteReport {
    pub written: usize,
    pub failures: Vec<SubBatchFailure>,
}

impl WriteReport {
    pub fn failed_rows(&self) -> usize {
        self.failures.iter().map(|f| f.rows.len()).sum()
    }
}

pub struct BatchWriter<R: ?Sized> {
    repo: Arc<R>,
    sub_batch_size: usize,
}

impl<R> BatchWriter<R>
where
    R: PaymentRepository + ?Sized,
{
    pub fn new(repo: Arc<R>, sub_batch_size: usize) -> Self {
        Self {
            repo,
            sub_batch_size: sub_batch_size.max(1),
        }
    }

    /// 写入一块记录（记录所有权转交存储层）
    pub async fn write(&self, records: Vec<PaymentRecord>) -> WriteReport {
        let mut report = WriteReport::default();

        for (index, sub_batch) in records.chunks(self.sub_batch_size).enumerate() {
            match self.repo.bulk_insert(sub_batch).await {
                Ok(count) => {
                    debug!(sub_batch = index, rows = count, "子批次写入成功");
                    report.written += count;
                }
                Err(error) => {
                    warn!(
                        sub_batch = index,
                        rows = sub_batch.len(),
                        first_row = sub_batch.first().map(|r| r.row_number),
                        error = %error,
                        "子批次写入失败，整批回滚"
                    );
                    report.failures.push(SubBatchFailure {
                        rows: sub_batch
                            .iter()
                            .map(|r| (r.row_number, r.reference_no.clone()))
                            .collect(),
                        error,
                    });
                }
            }
        }

        report
    }
}
