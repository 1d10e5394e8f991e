// ==========================================
// 学费缴款对账系统 - 命令行参数
// ==========================================

use crate::domain::{ImportMode, SourceFamily};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "spp-reconcile", version, about = "学费缴款文件导入与对账")]
pub struct Cli {
    /// 数据库路径（默认读取 SPP_RECONCILE_DB_PATH，否则用户数据目录）
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// 以 JSON 行输出日志
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 导入一个或多个缴款文件
    Import {
        /// 文件路径（CSV/TXT/TSV/XLSX/XLS/ODS）
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// 导入严格度: STRICT / FAST
        #[arg(long)]
        mode: Option<ImportMode>,

        /// 强制来源文件族: LEGACY / BANK
        #[arg(long)]
        family: Option<SourceFamily>,

        /// 操作员
        #[arg(long, default_value = "system")]
        operator: String,

        /// 覆盖分块大小
        #[arg(long)]
        chunk_size: Option<usize>,

        /// 以 JSON 输出导入结果
        #[arg(long)]
        json: bool,
    },
    /// 查看最近的导入批次
    Batches {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// 初始化数据库并退出
    InitDb,
    /// 导入配置读写
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// 查看配置（不指定键则列出全部）
    Get { key: Option<String> },
    /// 写入配置
    Set { key: String, value: String },
}
