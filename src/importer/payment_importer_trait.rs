// ==========================================
// 学费缴款对账系统 - 缴款导入 Trait
// ==========================================
// 职责: 定义缴款文件导入接口（不包含实现）
// ==========================================

use crate::context::RequestContext;
use crate::domain::{ImportMode, ImportResult, SourceFamily};
use crate::importer::error::ImporterResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// 单次导入的调用方覆盖项（未指定的取全局配置）
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// 强制来源文件族（跳过表头自动识别）
    pub family: Option<SourceFamily>,
    /// 覆盖导入严格度
    pub mode: Option<ImportMode>,
    /// 覆盖分块大小
    pub chunk_size: Option<usize>,
}

impl ImportOptions {
    pub fn with_mode(mut self, mode: ImportMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_family(mut self, family: SourceFamily) -> Self {
        self.family = Some(family);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }
}

/// 导入运行阶段
///
/// Opened → HeaderRead → Streaming → Finalized；
/// 前两个阶段的失败以 ImportError 终止，Streaming 中的行级问题不终止运行。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Opened,
    HeaderRead,
    Streaming,
    Finalized,
}

impl ImportStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStage::Opened => "opened",
            ImportStage::HeaderRead => "header_read",
            ImportStage::Streaming => "streaming",
            ImportStage::Finalized => "finalized",
        }
    }
}

// ==========================================
// PaymentImporter Trait
// ==========================================
// 用途: 缴款导入主接口
// 实现者: PaymentImporterImpl
#[async_trait]
pub trait PaymentImporter: Send + Sync {
    /// 导入单个缴款文件
    ///
    /// # 返回
    /// - Ok(ImportResult): 文件可读且表头可识别（即使全部行被拒绝）
    /// - Err: 文件不存在/格式不支持/超限/表头无法识别/读取中断
    ///
    /// # 导入流程
    /// 1. 文件检查（存在、扩展名、大小）
    /// 2. 表头识别与列映射
    /// 3. 分块解码、未缴过滤、判重
    /// 4. 子批次落库
    /// 5. 汇总结果 + 批次审计
    async fn import_file(
        &self,
        path: &Path,
        options: &ImportOptions,
        ctx: &RequestContext,
    ) -> ImporterResult<ImportResult>;

    /// 批量导入多个文件（并发执行）
    ///
    /// 每个文件独立出结果，单个文件失败不影响其他文件。
    async fn batch_import(
        &self,
        paths: &[PathBuf],
        options: &ImportOptions,
        ctx: &RequestContext,
    ) -> Vec<(PathBuf, ImporterResult<ImportResult>)>;
}
