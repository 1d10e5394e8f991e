// ==========================================
// 学费缴款对账系统 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，并发导入写同一库时减少偶发 busy 错误
// - 建表幂等（CREATE TABLE IF NOT EXISTS）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::path::PathBuf;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "SPP_RECONCILE_DB_PATH";

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id    TEXT NOT NULL DEFAULT 'global',
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    updated_at  TEXT,
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS import_batch (
    batch_id            TEXT PRIMARY KEY,
    file_name           TEXT,
    source_family       TEXT NOT NULL,
    import_mode         TEXT NOT NULL,
    total_rows          INTEGER NOT NULL DEFAULT 0,
    imported_rows       INTEGER NOT NULL DEFAULT 0,
    duplicate_rows      INTEGER NOT NULL DEFAULT 0,
    invalid_rows        INTEGER NOT NULL DEFAULT 0,
    unpaid_rows         INTEGER NOT NULL DEFAULT 0,
    storage_failed_rows INTEGER NOT NULL DEFAULT 0,
    imported_by         TEXT NOT NULL,
    correlation_id      TEXT NOT NULL,
    started_at          TEXT NOT NULL,
    elapsed_ms          INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS tuition_payment (
    payment_id              INTEGER PRIMARY KEY AUTOINCREMENT,
    school_id               TEXT NOT NULL,
    student_id              TEXT NOT NULL,
    student_name            TEXT NOT NULL,
    address                 TEXT,
    class_name              TEXT,
    major                   TEXT,
    billed_amount           INTEGER NOT NULL DEFAULT 0 CHECK (billed_amount >= 0),
    admin_fee               INTEGER NOT NULL DEFAULT 0 CHECK (admin_fee >= 0),
    other_charge            INTEGER NOT NULL DEFAULT 0 CHECK (other_charge >= 0),
    other_charge_note       TEXT,
    remark                  TEXT,
    fiscal_year             INTEGER NOT NULL,
    fiscal_month            INTEGER NOT NULL CHECK (fiscal_month BETWEEN 1 AND 12),
    community_fund          TEXT,
    transaction_at          TEXT NOT NULL,
    transaction_at_display  TEXT NOT NULL DEFAULT '',
    paid                    INTEGER NOT NULL DEFAULT 0,
    branch_code             TEXT,
    operator_code           TEXT NOT NULL DEFAULT 'system',
    reversal                INTEGER NOT NULL DEFAULT 0,
    reference_no            TEXT UNIQUE,
    source_family           TEXT NOT NULL,
    batch_id                TEXT NOT NULL,
    source_row              INTEGER NOT NULL,
    created_at              TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tuition_payment_student_period
    ON tuition_payment (school_id, student_id, fiscal_year, fiscal_month);

CREATE INDEX IF NOT EXISTS idx_tuition_payment_batch
    ON tuition_payment (batch_id);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等），并登记 schema_version
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![CURRENT_SCHEMA_VERSION, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 默认数据库路径
///
/// 优先读取环境变量 SPP_RECONCILE_DB_PATH，否则放在用户数据目录下
pub fn default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("spp-reconcile");
    if let Err(e) = std::fs::create_dir_all(&path) {
        tracing::warn!(dir = %path.display(), error = %e, "数据目录创建失败，回退到当前目录");
        return "spp_reconcile.db".to_string();
    }
    path.push("spp_reconcile.db");
    path.to_string_lossy().to_string()
}
