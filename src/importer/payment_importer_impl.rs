// ==========================================
// 学费缴款对账系统 - 缴款导入实现
// ==========================================
// 职责: 编排 文件检查 → 表头识别 → 分块解码 → 判重 → 子批次落库 → 汇总
// 红线: 任一行的失败不得中止运行或影响其他行的计数
// 红线: 未缴行（银行文件）既不算重复也不算错误
// ==========================================

use crate::config::{ImportConfigReader, ImportSettings};
use crate::context::RequestContext;
use crate::domain::{ImportBatch, ImportMode, ImportResult, ImportTally, SourceFamily};
use crate::importer::batch_writer::BatchWriter;
use crate::importer::chunked_reader::{
    file_extension, open_chunk_reader, RawRow, DELIMITED_EXTENSIONS, WORKBOOK_EXTENSIONS,
};
use crate::importer::duplicate_guard::{DuplicateGuard, GuardVerdict};
use crate::importer::error::{ImportError, ImporterResult, RowRejection};
use crate::importer::header_normalizer::{CanonicalField, HeaderNormalizer};
use crate::importer::payment_importer_trait::{ImportOptions, ImportStage, PaymentImporter};
use crate::importer::row_decoder::{DecodeRules, DecodedRow, RowDecoder};
use crate::perf::PerfGuard;
use crate::repository::PaymentRepository;
use async_trait::async_trait;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn, Span};
use uuid::Uuid;

// ==========================================
// PaymentImporterImpl - 缴款导入实现
// ==========================================
pub struct PaymentImporterImpl<R: ?Sized, C: ?Sized> {
    repo: Arc<R>,
    config: Arc<C>,
    normalizer: HeaderNormalizer,
}

impl<R, C> PaymentImporterImpl<R, C>
where
    R: PaymentRepository + ?Sized,
    C: ImportConfigReader + ?Sized,
{
    /// 创建新的 PaymentImporterImpl 实例
    ///
    /// # 参数
    /// - repo: 缴款仓储（判重查询 + 批量写入 + 批次审计）
    /// - config: 导入配置读取器
    pub fn new(repo: Arc<R>, config: Arc<C>) -> Self {
        Self {
            repo,
            config,
            normalizer: HeaderNormalizer,
        }
    }

    /// 文件检查: 存在 → 扩展名 → 大小
    fn check_file(path: &Path, settings: &ImportSettings) -> ImporterResult<u64> {
        if !path.is_file() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        let ext = file_extension(path);
        if !DELIMITED_EXTENSIONS.contains(&ext.as_str()) && !WORKBOOK_EXTENSIONS.contains(&ext.as_str())
        {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let size = std::fs::metadata(path)?.len();
        let limit = settings.max_file_size_bytes();
        if size > limit {
            return Err(ImportError::FileTooLarge { size, limit });
        }

        Ok(size)
    }

    /// 写入批次审计记录（失败只告警，不影响导入结果）
    async fn record_batch(&self, result: &ImportResult, path: &Path, ctx: &RequestContext) {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        let batch = ImportBatch::from_result(
            result,
            file_name,
            &ctx.operator,
            &ctx.correlation_id,
            ctx.started_at_utc(),
        );

        if let Err(e) = self.repo.insert_batch(&batch).await {
            warn!(batch_id = %result.batch_id, error = %e, "批次审计记录写入失败");
        }
    }
}

#[async_trait]
impl<R, C> PaymentImporter for PaymentImporterImpl<R, C>
where
    R: PaymentRepository + ?Sized,
    C: ImportConfigReader + ?Sized,
{
    #[instrument(
        skip(self, path, options, ctx),
        fields(
            correlation_id = %ctx.correlation_id,
            file = %path.display(),
            batch_id = tracing::field::Empty
        )
    )]
    async fn import_file(
        &self,
        path: &Path,
        options: &ImportOptions,
        ctx: &RequestContext,
    ) -> ImporterResult<ImportResult> {
        let _perf = PerfGuard::new("import_file");
        let start_time = Instant::now();
        let batch_id = Uuid::new_v4().to_string();
        Span::current().record("batch_id", batch_id.as_str());

        info!(batch_id = %batch_id, operator = %ctx.operator, "开始导入缴款文件");

        // 配置在运行开始时读取一次
        let settings = ImportSettings::from_reader(self.config.as_ref()).await?;
        let mode = options.mode.unwrap_or(settings.import_mode);
        let chunk_size = options.chunk_size.unwrap_or(settings.chunk_size).max(1);

        // === 步骤 1: 文件检查与打开 ===
        debug!("步骤 1: 文件检查与打开");
        let size = Self::check_file(path, &settings)?;
        let mut reader = open_chunk_reader(path, chunk_size)?;
        debug!(stage = ImportStage::Opened.as_str(), size_bytes = size, "文件已打开");

        // === 步骤 2: 表头识别 ===
        debug!("步骤 2: 表头识别");
        let mapping = self.normalizer.detect(reader.header(), options.family)?;
        let family = mapping.family;
        let missing: Vec<&'static str> = mapping
            .missing_mandatory()
            .iter()
            .map(CanonicalField::token)
            .collect();
        if !missing.is_empty() {
            warn!(family = %family, missing = ?missing, "表头缺少必填字段，相关行将被拒绝");
        }
        info!(
            stage = ImportStage::HeaderRead.as_str(),
            family = %family,
            mode = %mode,
            mapped_fields = mapping.len(),
            "表头识别完成"
        );

        let rules = DecodeRules::new(&settings, family, mode, &batch_id, ctx);
        let mut run = ImportRun {
            decoder: RowDecoder::new(mapping, rules),
            guard: DuplicateGuard::new(self.repo.clone(), family, mode),
            writer: BatchWriter::new(self.repo.clone(), settings.sub_batch_size),
            tally: ImportTally::new(settings.error_head_limit, settings.error_tail_limit),
            family,
            mode,
        };

        // === 步骤 3: 分块处理 ===
        debug!(stage = ImportStage::Streaming.as_str(), chunk_size, "步骤 3: 分块处理");
        let mut chunk_index = 0usize;
        while let Some(chunk) = reader.next_chunk()? {
            let rows = chunk.len();
            run.process_chunk(chunk).await;
            debug!(
                chunk = chunk_index,
                rows,
                imported = run.tally.imported,
                "分块处理完成"
            );
            chunk_index += 1;
        }

        // === 步骤 4: 汇总 ===
        let tracked = run.guard.tracked();
        let result = run
            .tally
            .finalize(batch_id.clone(), family, mode, start_time.elapsed());
        self.record_batch(&result, path, ctx).await;

        info!(
            stage = ImportStage::Finalized.as_str(),
            batch_id = %batch_id,
            total = result.total_rows,
            imported = result.imported,
            duplicates = result.duplicates,
            invalid = result.invalid,
            skipped_unpaid = result.skipped_unpaid,
            storage_failed = result.storage_failed,
            references_tracked = tracked,
            elapsed_ms = result.duration_ms,
            "缴款导入完成"
        );

        Ok(result)
    }

    #[instrument(skip(self, paths, options, ctx), fields(correlation_id = %ctx.correlation_id, files = paths.len()))]
    async fn batch_import(
        &self,
        paths: &[PathBuf],
        options: &ImportOptions,
        ctx: &RequestContext,
    ) -> Vec<(PathBuf, ImporterResult<ImportResult>)> {
        info!(files = paths.len(), "开始批量导入");

        let futures = paths.iter().map(|path| async move {
            let outcome = self.import_file(path, options, ctx).await;
            if let Err(e) = &outcome {
                warn!(file = %path.display(), error = %e, "文件导入失败");
            }
            (path.clone(), outcome)
        });

        let results = join_all(futures).await;

        let succeeded = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!(
            files = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            "批量导入完成"
        );

        results
    }
}

// ==========================================
// ImportRun - 单次运行的可变状态
// ==========================================
struct ImportRun<R: ?Sized> {
    decoder: RowDecoder,
    guard: DuplicateGuard<R>,
    writer: BatchWriter<R>,
    tally: ImportTally,
    family: SourceFamily,
    mode: ImportMode,
}

impl<R> ImportRun<R>
where
    R: PaymentRepository + ?Sized,
{
    /// 处理一块数据行
    async fn process_chunk(&mut self, chunk: Vec<RawRow>) {
        self.tally.total_rows += chunk.len();
        let decoded: Vec<DecodedRow> = chunk.iter().map(|row| self.decoder.decode(row)).collect();
        drop(chunk);

        // FAST: 本块待判重凭证号一次性预取
        let gated = self.family.gates_on_paid_status();
        let references = decoded
            .iter()
            .filter(|d| !gated || d.paid)
            .filter_map(|d| d.outcome.as_ref().ok())
            .filter_map(|record| record.reference_no.as_deref());
        if let Err(e) = self.guard.prefetch(references).await {
            warn!(error = %e, "凭证号预取失败，本块回退为逐条查询");
        }

        let mut accepted = Vec::with_capacity(decoded.len());
        for row in decoded {
            // 未缴行先于判重与校验剔除
            if gated && !row.paid {
                debug!(row = row.row_number, "未缴行，跳过");
                self.tally.skipped_unpaid += 1;
                continue;
            }

            let record = match row.outcome {
                Ok(record) => record,
                Err(rejection) => {
                    warn!(row = row.row_number, reason = %rejection.brief(), "行校验失败");
                    self.tally.record_invalid(rejection.render(self.mode));
                    continue;
                }
            };

            match self.guard.check(record.reference_no.as_deref()).await {
                Ok(GuardVerdict::Accept) => accepted.push(record),
                Ok(GuardVerdict::Duplicate) => {
                    debug!(row = record.row_number, reference = ?record.reference_no, "重复凭证号，丢弃");
                    self.tally.duplicates += 1;
                }
                Ok(GuardVerdict::MissingReference) => {
                    let rejection = RowRejection::MissingReference {
                        row: record.row_number,
                        field: CanonicalField::ReferenceNo.token(),
                    };
                    warn!(row = record.row_number, "凭证号为空");
                    self.tally.record_invalid(rejection.render(self.mode));
                }
                Err(e) => {
                    warn!(row = record.row_number, error = %e, "判重查询失败");
                    let rejection = RowRejection::Storage {
                        row: record.row_number,
                        reference: record.reference_no.clone().unwrap_or_else(|| "-".to_string()),
                        message: e.to_string(),
                    };
                    self.tally.record_storage_failure(rejection.render(self.mode));
                }
            }
        }

        let report = self.writer.write(accepted).await;
        self.tally.imported += report.written;
        for failure in report.failures {
            let message = failure.error.to_string();
            for (row, reference) in failure.rows {
                let rejection = RowRejection::Storage {
                    row,
                    reference: reference.unwrap_or_else(|| "-".to_string()),
                    message: message.clone(),
                };
                self.tally.record_storage_failure(rejection.render(self.mode));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;
    use crate::repository::PaymentRepositoryImpl;
    use rusqlite::Connection;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn importer() -> PaymentImporterImpl<PaymentRepositoryImpl, ConfigManager> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repo = PaymentRepositoryImpl::from_connection(conn.clone()).unwrap();
        let config = ConfigManager::from_connection(conn).unwrap();
        PaymentImporterImpl::new(Arc::new(repo), Arc::new(config))
    }

    #[test]
    fn test_check_file_order() {
        let dir = TempDir::new().unwrap();
        let settings = ImportSettings::default();

        let missing = dir.path().join("missing.csv");
        assert!(matches!(
            PaymentImporterImpl::<PaymentRepositoryImpl, ConfigManager>::check_file(&missing, &settings),
            Err(ImportError::FileNotFound(_))
        ));

        let pdf = dir.path().join("report.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        assert!(matches!(
            PaymentImporterImpl::<PaymentRepositoryImpl, ConfigManager>::check_file(&pdf, &settings),
            Err(ImportError::UnsupportedFormat(ext)) if ext == "pdf"
        ));

        let big = dir.path().join("big.csv");
        let mut file = std::fs::File::create(&big).unwrap();
        file.write_all(&vec![b'a'; 2 * 1024 * 1024]).unwrap();
        let small_limit = ImportSettings {
            max_file_size_mb: 1,
            ..ImportSettings::default()
        };
        assert!(matches!(
            PaymentImporterImpl::<PaymentRepositoryImpl, ConfigManager>::check_file(&big, &small_limit),
            Err(ImportError::FileTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_unpaid_bank_rows_skip_before_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bank.csv");
        std::fs::write(
            &path,
            "Institution,Invoice No.,Name,Amount Billed,Year,Month,Payment Status,Proof No\n\
             S1,I1,Ani,150000,2024,3,Paid,R1\n\
             S1,I2,Budi,150000,2024,3,Unpaid,R2\n\
             S1,,Citra,150000,abc,3,Unpaid,R3\n",
        )
        .unwrap();

        let ctx = RequestContext::new("tester");
        let result = importer()
            .import_file(&path, &ImportOptions::default(), &ctx)
            .await
            .unwrap();

        assert_eq!(result.source_family, SourceFamily::Bank);
        assert_eq!(result.total_rows, 3);
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped_unpaid, 2);
        assert_eq!(result.invalid, 0);
        assert!(result.errors.is_empty());
    }
}
