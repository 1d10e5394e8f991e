// ==========================================
// 学费缴款对账系统 - 缴款 Repository 实现
// ==========================================
// 职责: 实现缴款记录与导入批次的数据访问（使用 rusqlite）
// 红线: Repository 不含业务规则，只做数据 CRUD
// 时间格式: transaction_at 为本地墙钟 "%Y-%m-%d %H:%M:%S"；created_at / started_at 为 RFC3339
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::{CommunityFund, ImportBatch, ImportMode, PaymentRecord, SourceFamily};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::payment_repo::PaymentRepository;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

const TX_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 单条语句的绑定参数上限（低于 SQLite 默认 32766）
const MAX_BIND_PARAMS: usize = 30_000;

/// IN 子句每次查询的凭证号个数
const EXISTS_CHUNK: usize = 500;

const PAYMENT_COLUMNS: [&str; 25] = [
    "school_id",
    "student_id",
    "student_name",
    "address",
    "class_name",
    "major",
    "billed_amount",
    "admin_fee",
    "other_charge",
    "other_charge_note",
    "remark",
    "fiscal_year",
    "fiscal_month",
    "community_fund",
    "transaction_at",
    "transaction_at_display",
    "paid",
    "branch_code",
    "operator_code",
    "reversal",
    "reference_no",
    "source_family",
    "batch_id",
    "source_row",
    "created_at",
];

// ==========================================
// PaymentRepositoryImpl
// ==========================================
pub struct PaymentRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl PaymentRepositoryImpl {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let mut conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        crate::perf::install_sqlite_tracing(&mut conn);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn.lock()?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 记录 → 绑定参数（顺序与 PAYMENT_COLUMNS 一致）
    fn record_values(record: &PaymentRecord) -> [Value; 25] {
        fn opt_text(v: &Option<String>) -> Value {
            v.clone().map(Value::Text).unwrap_or(Value::Null)
        }

        [
            Value::Text(record.school_id.clone()),
            Value::Text(record.student_id.clone()),
            Value::Text(record.student_name.clone()),
            opt_text(&record.address),
            opt_text(&record.class_name),
            opt_text(&record.major),
            Value::Integer(record.billed_amount),
            Value::Integer(record.admin_fee),
            Value::Integer(record.other_charge),
            opt_text(&record.other_charge_note),
            opt_text(&record.remark),
            Value::Integer(i64::from(record.fiscal_year)),
            Value::Integer(i64::from(record.fiscal_month)),
            record
                .community_fund
                .as_ref()
                .map(|f| Value::Text(f.as_stored_text()))
                .unwrap_or(Value::Null),
            Value::Text(record.transaction_at.format(TX_DATETIME_FORMAT).to_string()),
            Value::Text(record.transaction_at_display.clone()),
            Value::Integer(i64::from(record.paid)),
            opt_text(&record.branch_code),
            Value::Text(record.operator_code.clone()),
            Value::Integer(i64::from(record.reversal)),
            opt_text(&record.reference_no),
            Value::Text(record.source_family.as_str().to_string()),
            Value::Text(record.batch_id.clone()),
            Value::Integer(record.row_number as i64),
            Value::Text(record.created_at.to_rfc3339()),
        ]
    }

    /// 在事务中执行多行 INSERT（按参数上限切分语句）
    fn bulk_insert_tx(tx: &Transaction, records: &[PaymentRecord]) -> RepositoryResult<usize> {
        let rows_per_statement = (MAX_BIND_PARAMS / PAYMENT_COLUMNS.len()).max(1);
        let row_placeholder = format!("({})", vec!["?"; PAYMENT_COLUMNS.len()].join(", "));

        let mut count = 0;
        for slice in records.chunks(rows_per_statement) {
            let sql = format!(
                "INSERT INTO tuition_payment ({}) VALUES {}",
                PAYMENT_COLUMNS.join(", "),
                vec![row_placeholder.as_str(); slice.len()].join(", ")
            );
            let values = slice.iter().flat_map(Self::record_values);
            count += tx.execute(&sql, params_from_iter(values))?;
        }

        Ok(count)
    }

    fn map_payment_row(row: &Row) -> rusqlite::Result<PaymentRecord> {
        let transaction_raw: String = row.get(14)?;
        let transaction_at = NaiveDateTime::parse_from_str(&transaction_raw, TX_DATETIME_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(14, Type::Text, Box::new(e)))?;

        let family_raw: String = row.get(21)?;
        let source_family = family_raw.parse::<SourceFamily>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(21, Type::Text, e.into())
        })?;

        let created_raw: String = row.get(24)?;
        let created_at = parse_rfc3339(&created_raw, 24)?;

        Ok(PaymentRecord {
            school_id: row.get(0)?,
            student_id: row.get(1)?,
            student_name: row.get(2)?,
            address: row.get(3)?,
            class_name: row.get(4)?,
            major: row.get(5)?,
            billed_amount: row.get(6)?,
            admin_fee: row.get(7)?,
            other_charge: row.get(8)?,
            other_charge_note: row.get(9)?,
            remark: row.get(10)?,
            fiscal_year: row.get(11)?,
            fiscal_month: row.get(12)?,
            community_fund: row
                .get::<_, Option<String>>(13)?
                .map(|raw| CommunityFund::parse(&raw)),
            transaction_at,
            transaction_at_display: row.get(15)?,
            paid: row.get(16)?,
            branch_code: row.get(17)?,
            operator_code: row.get(18)?,
            reversal: row.get(19)?,
            reference_no: row.get(20)?,
            source_family,
            batch_id: row.get(22)?,
            row_number: row.get::<_, i64>(23)? as usize,
            created_at,
        })
    }

    fn map_batch_row(row: &Row) -> rusqlite::Result<ImportBatch> {
        let family_raw: String = row.get(2)?;
        let mode_raw: String = row.get(3)?;
        let started_raw: String = row.get(12)?;

        Ok(ImportBatch {
            batch_id: row.get(0)?,
            file_name: row.get(1)?,
            source_family: family_raw.parse::<SourceFamily>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
            })?,
            import_mode: mode_raw.parse::<ImportMode>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
            })?,
            total_rows: row.get(4)?,
            imported_rows: row.get(5)?,
            duplicate_rows: row.get(6)?,
            invalid_rows: row.get(7)?,
            unpaid_rows: row.get(8)?,
            storage_failed_rows: row.get(9)?,
            imported_by: row.get(10)?,
            correlation_id: row.get(11)?,
            started_at: parse_rfc3339(&started_raw, 12)?,
            elapsed_ms: row.get(13)?,
        })
    }
}

fn parse_rfc3339(raw: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[async_trait]
impl PaymentRepository for PaymentRepositoryImpl {
    /// 批量插入（事务化）
    async fn bulk_insert(&self, records: &[PaymentRecord]) -> RepositoryResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let count = Self::bulk_insert_tx(&tx, records)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(count)
    }

    async fn exists_reference(&self, reference_no: &str) -> RepositoryResult<bool> {
        let conn = self.conn.lock()?;

        let found = conn
            .query_row(
                "SELECT 1 FROM tuition_payment WHERE reference_no = ?1 LIMIT 1",
                params![reference_no],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        Ok(found)
    }

    async fn batch_check_exists(
        &self,
        reference_nos: &[String],
    ) -> RepositoryResult<HashSet<String>> {
        let mut existing = HashSet::new();
        if reference_nos.is_empty() {
            return Ok(existing);
        }

        let conn = self.conn.lock()?;

        for chunk in reference_nos.chunks(EXISTS_CHUNK) {
            // 构建 IN 子句的占位符
            let placeholders = vec!["?"; chunk.len()].join(",");
            let query = format!(
                "SELECT reference_no FROM tuition_payment WHERE reference_no IN ({})",
                placeholders
            );

            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                row.get::<_, String>(0)
            })?;
            for reference in rows {
                existing.insert(reference?);
            }
        }

        Ok(existing)
    }

    async fn find_by_reference(
        &self,
        reference_no: &str,
    ) -> RepositoryResult<Option<PaymentRecord>> {
        let conn = self.conn.lock()?;

        let sql = format!(
            "SELECT {} FROM tuition_payment WHERE reference_no = ?1",
            PAYMENT_COLUMNS.join(", ")
        );
        let record = conn
            .query_row(&sql, params![reference_no], Self::map_payment_row)
            .optional()?;

        Ok(record)
    }

    async fn list_reference_numbers(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.conn.lock()?;

        let mut stmt = conn.prepare(
            "SELECT reference_no FROM tuition_payment WHERE reference_no IS NOT NULL ORDER BY reference_no",
        )?;
        let references = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(references)
    }

    async fn count_payments(&self) -> RepositoryResult<usize> {
        let conn = self.conn.lock()?;

        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM tuition_payment", [], |row| row.get(0))?;

        Ok(count as usize)
    }

    async fn insert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        let conn = self.conn.lock()?;

        conn.execute(
            r#"
            INSERT INTO import_batch (
                batch_id, file_name, source_family, import_mode,
                total_rows, imported_rows, duplicate_rows, invalid_rows, unpaid_rows,
                storage_failed_rows, imported_by, correlation_id, started_at, elapsed_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                batch.batch_id,
                batch.file_name,
                batch.source_family.as_str(),
                batch.import_mode.as_str(),
                batch.total_rows,
                batch.imported_rows,
                batch.duplicate_rows,
                batch.invalid_rows,
                batch.unpaid_rows,
                batch.storage_failed_rows,
                batch.imported_by,
                batch.correlation_id,
                batch.started_at.to_rfc3339(),
                batch.elapsed_ms,
            ],
        )?;

        Ok(())
    }

    async fn get_recent_batches(&self, limit: usize) -> RepositoryResult<Vec<ImportBatch>> {
        let conn = self.conn.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT batch_id, file_name, source_family, import_mode,
                   total_rows, imported_rows, duplicate_rows, invalid_rows, unpaid_rows,
                   storage_failed_rows, imported_by, correlation_id, started_at, elapsed_ms
            FROM import_batch
            ORDER BY started_at DESC
            LIMIT ?1
            "#,
        )?;

        let batches = stmt
            .query_map(params![limit as i64], Self::map_batch_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(batches)
    }
}
