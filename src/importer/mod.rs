// ==========================================
// 学费缴款对账系统 - 导入层
// ==========================================
// 职责: 缴款文件（CSV/Excel）分块读取、表头归一、行解码、判重、批量落库
// 支持: 内部导出格式（legacy）与银行结算格式（bank）
// ==========================================

// 模块声明
pub mod batch_writer;
pub mod chunked_reader;
pub mod duplicate_guard;
pub mod error;
pub mod header_normalizer;
pub mod payment_importer_impl;
pub mod payment_importer_trait;
pub mod row_decoder;
pub mod value_parser;

// 重导出核心类型
pub use batch_writer::{BatchWriter, WriteReport};
pub use chunked_reader::{open_chunk_reader, CellValue, ChunkReader, RawRow};
pub use duplicate_guard::{DuplicateGuard, GuardVerdict};
pub use error::{ImportError, ImporterResult, RowRejection};
pub use header_normalizer::{CanonicalField, ColumnMapping, HeaderNormalizer};
pub use payment_importer_impl::PaymentImporterImpl;
pub use row_decoder::{DecodeRules, DecodedRow, RowDecoder};

// 重导出 Trait 接口
pub use payment_importer_trait::{ImportOptions, ImportStage, PaymentImporter};
