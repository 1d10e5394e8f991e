// ==========================================
// 学费缴款对账系统 - 缴款 Repository Trait
// ==========================================
// 职责: 定义缴款记录与导入批次的数据访问接口（不包含业务逻辑）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::{ImportBatch, PaymentRecord};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use std::collections::HashSet;

// ==========================================
// PaymentRepository Trait
// ==========================================
// 用途: 导入流程的持久化协作方
// 实现者: PaymentRepositoryImpl（使用 rusqlite）
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    // ===== 批量写入（事务化）=====

    /// 批量插入缴款记录（单条多行 INSERT，整体成功或整体回滚）
    ///
    /// # 返回
    /// - Ok(usize): 成功插入的记录数
    /// - Err: 数据库错误（含唯一约束冲突），本批无一落库
    async fn bulk_insert(&self, records: &[PaymentRecord]) -> RepositoryResult<usize>;

    // ===== 判重查询 =====

    /// 按结算凭证号精确查询是否已存在
    async fn exists_reference(&self, reference_no: &str) -> RepositoryResult<bool>;

    /// 批量检查凭证号
    ///
    /// # 返回
    /// - Ok(HashSet<String>): 已存在的凭证号
    async fn batch_check_exists(&self, reference_nos: &[String])
        -> RepositoryResult<HashSet<String>>;

    /// 按凭证号读取记录
    async fn find_by_reference(&self, reference_no: &str)
        -> RepositoryResult<Option<PaymentRecord>>;

    /// 全部已落库的凭证号（升序）
    async fn list_reference_numbers(&self) -> RepositoryResult<Vec<String>>;

    /// 统计缴款记录数
    async fn count_payments(&self) -> RepositoryResult<usize>;

    // ===== 批次审计 =====

    /// 插入导入批次记录
    async fn insert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()>;

    /// 查询最近的导入批次（按开始时间倒序）
    async fn get_recent_batches(&self, limit: usize) -> RepositoryResult<Vec<ImportBatch>>;
}
