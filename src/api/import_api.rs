// ==========================================
// 学费缴款对账系统 - 缴款导入 API
// ==========================================
// 职责: 封装缴款导入相关功能（单文件、多文件、后台执行、批次查询）
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, ImportSettings};
use crate::context::RequestContext;
use crate::db::{ensure_schema, open_sqlite_connection, read_schema_version};
use crate::domain::{ImportBatch, ImportResult, SourceFamily};
use crate::importer::{ImportOptions, PaymentImporter, PaymentImporterImpl};
use crate::repository::{PaymentRepository, PaymentRepositoryImpl};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

type DefaultImporter = PaymentImporterImpl<PaymentRepositoryImpl, ConfigManager>;

/// 导入 API 响应（对外输出契约）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportApiResponse {
    /// 文件可读且表头可识别即为 true（与行级错误无关）
    pub success: bool,
    /// 本次导入批次 ID
    pub batch_id: String,
    /// 识别出的来源文件族
    pub source_family: SourceFamily,
    pub imported: usize,
    pub duplicates: usize,
    /// 未缴行（银行文件），不计错误
    pub skipped_unpaid: usize,
    pub total_rows: usize,
    /// 保留的错误消息（首尾截断）
    pub errors: Vec<String>,
    /// 错误总数（精确）
    pub error_count: usize,
    pub duration_ms: f64,
}

impl From<ImportResult> for ImportApiResponse {
    fn from(result: ImportResult) -> Self {
        Self {
            success: result.success,
            batch_id: result.batch_id,
            source_family: result.source_family,
            imported: result.imported,
            duplicates: result.duplicates,
            skipped_unpaid: result.skipped_unpaid,
            total_rows: result.total_rows,
            errors: result.errors,
            error_count: result.error_count,
            duration_ms: result.duration_ms,
        }
    }
}

/// 多文件导入中单个文件的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportFileOutcome {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ImportApiResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 导入API
pub struct ImportApi {
    db_path: String,
}

impl ImportApi {
    /// 创建新的ImportApi实例
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// 初始化数据库（建表幂等），返回 schema 版本
    pub fn init_db(&self) -> ApiResult<i64> {
        let conn = open_sqlite_connection(&self.db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        ensure_schema(&conn)?;
        let version = read_schema_version(&conn)?.unwrap_or_default();
        info!(db_path = %self.db_path, schema_version = version, "数据库初始化完成");
        Ok(version)
    }

    /// 打开共享连接（仓储与配置共用）
    fn open_shared_connection(&self) -> ApiResult<Arc<Mutex<Connection>>> {
        let mut conn = open_sqlite_connection(&self.db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        ensure_schema(&conn)?;
        crate::perf::install_sqlite_tracing(&mut conn);
        Ok(Arc::new(Mutex::new(conn)))
    }

    fn create_importer(&self) -> ApiResult<DefaultImporter> {
        let conn = self.open_shared_connection()?;
        let repo = PaymentRepositoryImpl::from_connection(conn.clone())?;
        let config = ConfigManager::from_connection(conn)?;
        Ok(PaymentImporterImpl::new(Arc::new(repo), Arc::new(config)))
    }

    /// 导入单个缴款文件
    ///
    /// # 返回
    /// - Ok(ImportApiResponse): 导入结果（行级错误在 errors 中）
    /// - Err(ApiError::FormatError): 文件被整体拒绝
    pub async fn import_payments(
        &self,
        file_path: &Path,
        options: &ImportOptions,
        ctx: &RequestContext,
    ) -> ApiResult<ImportApiResponse> {
        let importer = self.create_importer()?;
        let result = importer.import_file(file_path, options, ctx).await?;
        Ok(result.into())
    }

    /// 并发导入多个文件（单个文件失败不影响其他文件）
    pub async fn import_many(
        &self,
        files: &[PathBuf],
        options: &ImportOptions,
        ctx: &RequestContext,
    ) -> ApiResult<Vec<ImportFileOutcome>> {
        let importer = self.create_importer()?;
        let outcomes = importer
            .batch_import(files, options, ctx)
            .await
            .into_iter()
            .map(|(path, outcome)| {
                let file = path.display().to_string();
                match outcome {
                    Ok(result) => ImportFileOutcome {
                        file,
                        result: Some(result.into()),
                        error: None,
                    },
                    Err(e) => ImportFileOutcome {
                        file,
                        result: None,
                        error: Some(ApiError::from(e).to_string()),
                    },
                }
            })
            .collect();
        Ok(outcomes)
    }

    /// 文件大小是否超过后台执行阈值（由调用方决定是否转后台）
    pub async fn should_run_in_background(&self, file_path: &Path) -> ApiResult<bool> {
        let size = std::fs::metadata(file_path)
            .map_err(|e| ApiError::FormatError(format!("{}: {}", file_path.display(), e)))?
            .len();
        let config = ConfigManager::from_connection(self.open_shared_connection()?)?;
        let settings = ImportSettings::from_reader(&config).await?;
        Ok(size > settings.async_threshold_bytes())
    }

    /// 在 tokio 后台任务中执行同一导入管道
    pub fn spawn_import(
        &self,
        file_path: PathBuf,
        options: ImportOptions,
        ctx: RequestContext,
    ) -> JoinHandle<ApiResult<ImportApiResponse>> {
        let api = ImportApi::new(self.db_path.clone());
        info!(
            file = %file_path.display(),
            correlation_id = %ctx.correlation_id,
            "导入任务转入后台执行"
        );
        tokio::spawn(async move { api.import_payments(&file_path, &options, &ctx).await })
    }

    /// 等待后台导入结束
    pub async fn join_import(
        handle: JoinHandle<ApiResult<ImportApiResponse>>,
    ) -> ApiResult<ImportApiResponse> {
        handle
            .await
            .map_err(|e| ApiError::BackgroundTaskError(e.to_string()))?
    }

    /// 最近的导入批次（审计）
    pub async fn recent_batches(&self, limit: usize) -> ApiResult<Vec<ImportBatch>> {
        if limit == 0 {
            return Err(ApiError::InvalidInput("limit 必须大于 0".to_string()));
        }
        let repo = PaymentRepositoryImpl::from_connection(self.open_shared_connection()?)?;
        Ok(repo.get_recent_batches(limit).await?)
    }
}
