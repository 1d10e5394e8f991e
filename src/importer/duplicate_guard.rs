// ==========================================
// 学费缴款对账系统 - 判重守卫
// ==========================================
// 职责: 按结算凭证号判定 接受 / 重复 / 无凭证号
// 两级检查:
// 1. 本次运行内已接受的凭证号（内存集合）
// 2. 持久化存储（STRICT: 逐条精确查询；FAST: 按块预取）
// 红线: 重复即丢弃，不更新、不合并已有记录
// 说明: 接受的凭证号在写库失败后也不释放，同一文件内后续同号行仍按重复处理
// ==========================================

use crate::domain::{ImportMode, SourceFamily};
use crate::repository::{PaymentRepository, RepositoryResult};
use std::collections::HashSet;
use std::sync::Arc;

/// 判重结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Accept,
    Duplicate,
    /// 凭证号为空（仅银行结算文件视为无效）
    MissingReference,
}

pub struct DuplicateGuard<R: ?Sized> {
    repo: Arc<R>,
    family: SourceFamily,
    mode: ImportMode,
    seen: HashSet<String>,
    prefetched: HashSet<String>,
    /// 预取失败时本块回退为逐条精确查询
    prefetch_ok: bool,
}

impl<R> DuplicateGuard<R>
where
    R: PaymentRepository + ?Sized,
{
    pub fn new(repo: Arc<R>, family: SourceFamily, mode: ImportMode) -> Self {
        Self {
            repo,
            family,
            mode,
            seen: HashSet::new(),
            prefetched: HashSet::new(),
            prefetch_ok: true,
        }
    }

    /// 块开始前预取（仅 FAST 模式生效）
    ///
    /// 只查询本次运行尚未见过的凭证号；上一块的预取结果被替换。
    pub async fn prefetch<'a, I>(&mut self, references: I) -> RepositoryResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.mode != ImportMode::Fast {
            return Ok(());
        }

        let mut pending: Vec<String> = Vec::new();
        let mut dedup: HashSet<&str> = HashSet::new();
        for reference in references {
            let reference = reference.trim();
            if reference.is_empty() || self.seen.contains(reference) || !dedup.insert(reference) {
                continue;
            }
            pending.push(reference.to_string());
        }

        self.prefetched.clear();
        self.prefetch_ok = false;
        self.prefetched = self.repo.batch_check_exists(&pending).await?;
        self.prefetch_ok = true;
        Ok(())
    }

    /// 判定一条记录
    pub async fn check(&mut self, reference: Option<&str>) -> RepositoryResult<GuardVerdict> {
        let reference = match reference.map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) => r,
            None if self.family.requires_reference() => return Ok(GuardVerdict::MissingReference),
            None => return Ok(GuardVerdict::Accept),
        };

        // 第一级: 本次运行
        if self.seen.contains(reference) {
            return Ok(GuardVerdict::Duplicate);
        }

        // 第二级: 持久化存储
        let persisted = match self.mode {
            ImportMode::Strict => self.repo.exists_reference(reference).await?,
            ImportMode::Fast if self.prefetch_ok => self.prefetched.contains(reference),
            ImportMode::Fast => self.repo.exists_reference(reference).await?,
        };

        // 已落库的凭证号也登记，避免同文件内重复查询
        self.seen.insert(reference.to_string());

        if persisted {
            Ok(GuardVerdict::Duplicate)
        } else {
            Ok(GuardVerdict::Accept)
        }
    }

    /// 本次运行登记的凭证号数量
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }
}
