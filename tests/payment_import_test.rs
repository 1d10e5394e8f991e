// ==========================================
// 缴款导入集成测试
// ==========================================
// 测试目标: 验证完整的缴款导入流程（CSV → 解码 → 判重 → 落库 → 审计）
// ==========================================


use async_trait::async_trait;
use chrono::NaiveDate;
use spp_reconcile::config::{config_keys, ConfigManager};
use spp_reconcile::domain::{ImportBatch, ImportMode, PaymentRecord, SourceFamily};
use spp_reconcile::importer::{ImportError, ImportOptions, PaymentImporter, PaymentImporterImpl};
use spp_reconcile::logging;
use spp_reconcile::repository::{
    PaymentRepository, PaymentRepositoryImpl, RepositoryError, RepositoryResult,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use test_helpers::*;

// ==========================================
// 基本流程
// ==========================================

#[tokio::test]
async fn test_bank_file_persists_paid_rows() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let path = env.write_file("bank.csv", &bank_csv(5));

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .expect("导入应该成功");

    assert!(result.success);
    assert_eq!(result.source_family, SourceFamily::Bank);
    assert_eq!(result.total_rows, 5);
    assert_eq!(result.imported, 5);
    assert_eq!(result.error_count, 0);
    assert!(result.errors.is_empty());

    let repo = env.repo();
    assert_eq!(repo.count_payments().await.unwrap(), 5);

    let record = repo
        .find_by_reference("REF00001")
        .await
        .unwrap()
        .expect("记录应存在");
    assert_eq!(record.student_id, "INV0001");
    assert_eq!(record.billed_amount, 350_000);
    assert_eq!(record.admin_fee, 2_500);
    assert_eq!(record.community_fund_amount(), 5_000);
    assert_eq!(record.fiscal_month, 7);
    assert_eq!(
        record.transaction_at,
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    );
    assert_eq!(record.operator_code, "teller1");
    assert!(!record.reversal);
    assert_eq!(record.batch_id, result.batch_id);
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let path = env.write_file("bank.csv", &bank_csv(8));
    let importer = env.importer();
    let ctx = fixed_context();

    let first = importer
        .import_file(&path, &ImportOptions::default(), &ctx)
        .await
        .unwrap();
    assert_eq!(first.imported, 8);

    let second = importer
        .import_file(&path, &ImportOptions::default(), &ctx)
        .await
        .unwrap();
    assert!(second.success);
    assert_eq!(second.imported, 0);
    assert_eq!(second.duplicates, 8);
    assert_eq!(second.error_count, 0);
    assert_eq!(env.repo().count_payments().await.unwrap(), 8);
}

#[tokio::test]
async fn test_malformed_row_is_isolated() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");

    let mut lines = vec![BANK_HEADER.to_string()];
    for i in 1..=6 {
        let line = bank_row(i, "Paid", &format!("REF{:05}", i));
        if i == 3 {
            // 去掉姓名
            lines.push(line.replace("Siswa 3", ""));
        } else {
            lines.push(line);
        }
    }
    let path = env.write_file("bank.csv", &(lines.join("\n") + "\n"));

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();

    assert_eq!(result.total_rows, 6);
    assert_eq!(result.imported, 5);
    assert_eq!(result.invalid, 1);
    assert_eq!(result.error_count, 1);
    assert!(result.errors[0].starts_with("行 3:"), "{}", result.errors[0]);
    assert!(result.errors[0].contains("NAMA_SISWA"));
}

#[tokio::test]
async fn test_row_numbers_count_empty_lines() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");

    // 第 2 行为空行，第 3 行缺姓名
    let content = [
        BANK_HEADER.to_string(),
        bank_row(1, "Paid", "REF00001"),
        String::new(),
        bank_row(3, "Paid", "REF00003").replace("Siswa 3", ""),
        bank_row(4, "Paid", "REF00004"),
    ]
    .join("\n");
    let path = env.write_file("bank.csv", &content);

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();

    assert_eq!(result.total_rows, 3);
    assert_eq!(result.imported, 2);
    assert_eq!(result.error_count, 1);
    assert!(result.errors[0].starts_with("行 3:"), "{}", result.errors[0]);
    assert!(result.errors[0].contains("NAMA_SISWA"));
}

#[tokio::test]
async fn test_unpaid_rows_are_excluded_without_error() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let content = [
        BANK_HEADER.to_string(),
        bank_row(1, "Paid", "REF00001"),
        bank_row(2, "Unpaid", "REF00002"),
        bank_row(3, " PAID ", "REF00003"),
    ]
    .join("\n");
    let path = env.write_file("bank.csv", &content);

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();

    assert_eq!(result.total_rows, 3);
    assert_eq!(result.imported, 2);
    assert_eq!(result.skipped_unpaid, 1);
    assert_eq!(result.duplicates, 0);
    assert_eq!(result.error_count, 0);
    assert!(env.repo().find_by_reference("REF00002").await.unwrap().is_none());
}

// ==========================================
// 字段语义
// ==========================================

#[tokio::test]
async fn test_unparseable_date_defaults_to_import_time() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let row = bank_row(1, "Paid", "REF00001").replace("15/06/2024 10:30:00", "kemarin sore");
    let path = env.write_file("bank.csv", &format!("{}\n{}\n", BANK_HEADER, row));
    let ctx = fixed_context();

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &ctx)
        .await
        .unwrap();
    assert_eq!(result.imported, 1);
    assert_eq!(result.error_count, 0);

    let record = env
        .repo()
        .find_by_reference("REF00001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.transaction_at, ctx.import_time());
    assert_eq!(record.transaction_at_display, "kemarin sore");
}

#[tokio::test]
async fn test_strict_dates_reject_unparseable_date() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    env.set_config(config_keys::TX_DATE_STRICT, "true");
    let row = bank_row(1, "Paid", "REF00001").replace("15/06/2024 10:30:00", "kemarin sore");
    let path = env.write_file("bank.csv", &format!("{}\n{}\n", BANK_HEADER, row));

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();
    assert_eq!(result.imported, 0);
    assert_eq!(result.invalid, 1);
    assert!(result.errors[0].contains("TGL_TX"));
}

#[tokio::test]
async fn test_parsed_date_outside_window_is_rejected() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let content = [
        BANK_HEADER.to_string(),
        bank_row(1, "Paid", "REF00001").replace("15/06/2024 10:30:00", "01/01/1990"),
        bank_row(2, "Paid", "REF00002").replace("15/06/2024 10:30:00", "01/01/2030"),
        bank_row(3, "Paid", "REF00003"),
    ]
    .join("\n");
    let path = env.write_file("bank.csv", &content);

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();
    assert_eq!(result.imported, 1);
    assert_eq!(result.invalid, 2);
    assert!(result.errors[0].starts_with("行 1:"));
    assert!(result.errors[1].starts_with("行 2:"));
}

#[tokio::test]
async fn test_fiscal_period_out_of_range() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let content = [
        BANK_HEADER.to_string(),
        bank_row(1, "Paid", "REF00001").replace(",2024,7,", ",2010,7,"),
        bank_row(2, "Paid", "REF00002").replace(",2024,7,", ",2024,13,"),
        bank_row(3, "Paid", "REF00003").replace(",2024,7,", ",2024,Juli,"),
    ]
    .join("\n");
    let path = env.write_file("bank.csv", &content);

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();
    assert_eq!(result.imported, 1);
    assert_eq!(result.invalid, 2);
    assert!(result.errors[0].contains("TAHUN"));
    assert!(result.errors[1].contains("BULAN"));

    let record = env
        .repo()
        .find_by_reference("REF00003")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.fiscal_month, 7);
}

#[tokio::test]
async fn test_amount_coercion_strips_non_digits() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let amounts = ["\"350,000\"", "350.000", "350000", "abc", "350.5"];
    let mut lines = vec![BANK_HEADER.to_string()];
    for (i, amount) in amounts.iter().enumerate() {
        lines.push(
            bank_row(i + 1, "Paid", &format!("REF{:05}", i + 1)).replace("\"350,000\"", amount),
        );
    }
    let path = env.write_file("bank.csv", &lines.join("\n"));

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();
    assert_eq!(result.imported, 5);

    let repo = env.repo();
    let mut billed = Vec::new();
    for i in 1..=5 {
        let record = repo
            .find_by_reference(&format!("REF{:05}", i))
            .await
            .unwrap()
            .unwrap();
        billed.push(record.billed_amount);
    }
    // "350.5" 按去除非数字规则得到 3505（小数点不被识别，保留该行为）
    assert_eq!(billed, vec![350_000, 350_000, 350_000, 0, 3_505]);
}

#[tokio::test]
async fn test_bank_header_variants_resolve() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");

    for (i, variant) in ["No. Tagihan", "NO TAGIHAN", "no_tagihan"].iter().enumerate() {
        let content = format!(
            "Institution,{},Name,Year,Month,Payment Status,Proof No.\nSCH01,INV-{},Ani,2024,7,Paid,HDR{}\n",
            variant, i, i
        );
        let path = env.write_file(&format!("variant_{}.csv", i), &content);
        let result = env
            .importer()
            .import_file(&path, &ImportOptions::default(), &fixed_context())
            .await
            .unwrap();
        assert_eq!(result.imported, 1, "{}", variant);

        let record = env
            .repo()
            .find_by_reference(&format!("HDR{}", i))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.student_id, format!("INV-{}", i));
    }
}

#[tokio::test]
async fn test_bank_row_without_reference_is_invalid() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let content = [
        BANK_HEADER.to_string(),
        bank_row(1, "Paid", ""),
        bank_row(2, "Paid", "REF00002"),
        bank_row(3, "Paid", "REF00002"),
    ]
    .join("\n");
    let path = env.write_file("bank.csv", &content);

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();
    assert_eq!(result.imported, 1);
    assert_eq!(result.invalid, 1);
    assert_eq!(result.duplicates, 1);
    assert!(result.errors[0].contains("NO_BUKTI"));
}

// ==========================================
// 内部导出格式
// ==========================================

#[tokio::test]
async fn test_legacy_file_imports_regardless_of_paid_flag() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let content = [
        LEGACY_HEADER.to_string(),
        legacy_row(1, "1", "LG-001"),
        legacy_row(2, "0", "LG-002"),
        legacy_row(3, "1", ""),
        legacy_row(4, "1", ""),
        legacy_row(5, "1", "LG-001"),
    ]
    .join("\r\n");
    let path = env.write_file("legacy.csv", &content);

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();

    assert_eq!(result.source_family, SourceFamily::Legacy);
    assert_eq!(result.total_rows, 5);
    assert_eq!(result.imported, 4);
    assert_eq!(result.duplicates, 1);
    assert_eq!(result.skipped_unpaid, 0);
    assert_eq!(result.error_count, 0);

    let repo = env.repo();
    let unpaid = repo.find_by_reference("LG-002").await.unwrap().unwrap();
    assert!(!unpaid.paid);
    assert_eq!(unpaid.operator_code, "system");
    assert_eq!(unpaid.other_charge, 15_000);
    assert_eq!(unpaid.community_fund_amount(), 0);
    assert_eq!(repo.count_payments().await.unwrap(), 4);
}

#[tokio::test]
async fn test_legacy_workbook_import() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/legacy_payments.xlsx");

    let options = ImportOptions::default().with_chunk_size(2);
    let result = env
        .importer()
        .import_file(&path, &options, &fixed_context())
        .await
        .unwrap();

    assert_eq!(result.source_family, SourceFamily::Legacy);
    assert_eq!(result.total_rows, 3);
    assert_eq!(result.imported, 3);
    assert_eq!(result.error_count, 0, "{:?}", result.errors);

    let repo = env.repo();
    let first = repo.find_by_reference("XL0001").await.unwrap().unwrap();
    assert_eq!(
        first.transaction_at,
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_hms_opt(0, 0, 0).unwrap()
    );
    assert_eq!(first.billed_amount, 300_000);
    assert_eq!(first.fiscal_month, 1);
    assert_eq!(first.row_number, 1);

    let second = repo.find_by_reference("XL0002").await.unwrap().unwrap();
    assert_eq!(
        second.transaction_at,
        NaiveDate::from_ymd_opt(2024, 2, 5).unwrap().and_hms_opt(12, 0, 0).unwrap()
    );
    assert_eq!(second.fiscal_month, 2);
    assert_eq!(second.other_charge, 15_000);
    assert_eq!(second.operator_code, "system");
    assert_eq!(second.community_fund_amount(), 5_000);
    assert_eq!(second.row_number, 3);

    // 文本金额按去非数字规则解析；社区基金原文保留
    let third = repo.find_by_reference("XL0003").await.unwrap().unwrap();
    assert_eq!(third.billed_amount, 300_000);
    assert!(!third.paid);
    assert_eq!(
        third.community_fund.map(|fund| fund.as_stored_text()).as_deref(),
        Some("25.000")
    );
    assert_eq!(third.row_number, 4);
}

#[tokio::test]
async fn test_semicolon_delimited_legacy_file() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let content = format!(
        "\u{feff}{}\n{}\n",
        LEGACY_HEADER.replace(',', ";"),
        legacy_row(1, "1", "LG-SEMI").replace(',', ";")
    );
    let path = env.write_file("legacy.txt", &content);

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();
    assert_eq!(result.source_family, SourceFamily::Legacy);
    assert_eq!(result.imported, 1);
}

// ==========================================
// 文件级错误
// ==========================================

#[tokio::test]
async fn test_format_errors_abort_before_rows() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let importer = env.importer();
    let ctx = fixed_context();
    let opts = ImportOptions::default();

    let unknown = env.write_file("unknown.csv", "foo,bar,baz\n1,2,3\n");
    let err = importer.import_file(&unknown, &opts, &ctx).await.unwrap_err();
    assert!(matches!(err, ImportError::UnrecognizedHeader { .. }));
    assert!(err.is_format_error());

    let wrong_ext = env.write_file("payments.json", &bank_csv(1));
    let err = importer.import_file(&wrong_ext, &opts, &ctx).await.unwrap_err();
    assert!(matches!(err, ImportError::UnsupportedFormat(_)));

    let missing = env.dir.path().join("missing.csv");
    let err = importer.import_file(&missing, &opts, &ctx).await.unwrap_err();
    assert!(matches!(err, ImportError::FileNotFound(_)));

    let empty = env.write_file("empty.csv", "\n\n");
    let err = importer.import_file(&empty, &opts, &ctx).await.unwrap_err();
    assert!(matches!(err, ImportError::EmptyFile));

    env.set_config(config_keys::IMPORT_MAX_FILE_SIZE_MB, "0");
    let oversized = env.write_file("big.csv", &bank_csv(3));
    let err = env
        .importer()
        .import_file(&oversized, &opts, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::FileTooLarge { .. }));

    let repo = env.repo();
    assert_eq!(repo.count_payments().await.unwrap(), 0);
    assert!(repo.get_recent_batches(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_all_rows_failing_still_succeeds() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let mut lines = vec![BANK_HEADER.to_string()];
    for i in 1..=4 {
        lines.push(bank_row(i, "Paid", &format!("REF{:05}", i)).replace(",2024,7,", ",,7,"));
    }
    let path = env.write_file("bank.csv", &lines.join("\n"));

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.imported, 0);
    assert_eq!(result.error_count, 4);
}

// ==========================================
// 分块、截断、模式
// ==========================================

/// 含重复、未缴、无效行的混合文件
fn mixed_bank_csv(n: usize) -> String {
    let mut lines = vec![BANK_HEADER.to_string()];
    for i in 1..=n {
        let line = match i % 7 {
            0 => bank_row(i, "Unpaid", &format!("REF{:05}", i)),
            3 => bank_row(i, "Paid", &format!("REF{:05}", i - 1)),
            5 => bank_row(i, "Paid", &format!("REF{:05}", i)).replace(",2024,7,", ",2024,0,"),
            _ => bank_row(i, "Paid", &format!("REF{:05}", i)),
        };
        lines.push(line);
    }
    lines.join("\n") + "\n"
}

#[tokio::test]
async fn test_chunk_size_independence() {
    logging::init_test();
    let small = create_test_env().expect("Failed to create test env");
    let large = create_test_env().expect("Failed to create test env");
    let content = mixed_bank_csv(40);
    let ctx = fixed_context();

    let a = small
        .importer()
        .import_file(
            &small.write_file("bank.csv", &content),
            &ImportOptions::default().with_chunk_size(1),
            &ctx,
        )
        .await
        .unwrap();
    let b = large
        .importer()
        .import_file(
            &large.write_file("bank.csv", &content),
            &ImportOptions::default().with_chunk_size(1000),
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(a.total_rows, b.total_rows);
    assert_eq!(a.imported, b.imported);
    assert_eq!(a.duplicates, b.duplicates);
    assert_eq!(a.invalid, b.invalid);
    assert_eq!(a.skipped_unpaid, b.skipped_unpaid);
    assert_eq!(a.errors, b.errors);
    assert!(a.duplicates > 0 && a.invalid > 0 && a.skipped_unpaid > 0);

    assert_eq!(
        small.repo().list_reference_numbers().await.unwrap(),
        large.repo().list_reference_numbers().await.unwrap()
    );
}

#[tokio::test]
async fn test_error_list_is_bounded_but_count_exact() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    env.set_config(config_keys::IMPORT_ERROR_HEAD_LIMIT, "3");
    env.set_config(config_keys::IMPORT_ERROR_TAIL_LIMIT, "2");

    let mut lines = vec![BANK_HEADER.to_string()];
    for i in 1..=10 {
        lines.push(bank_row(i, "Paid", &format!("REF{:05}", i)).replace(",2024,7,", ",2024,99,"));
    }
    let path = env.write_file("bank.csv", &lines.join("\n"));

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();

    assert_eq!(result.error_count, 10);
    assert_eq!(result.errors.len(), 6);
    assert!(result.errors[0].starts_with("行 1:"));
    assert!(result.errors[3].contains("5"));
    assert!(result.errors[5].starts_with("行 10:"));
}

#[tokio::test]
async fn test_fast_mode_matches_strict_counts() {
    logging::init_test();
    let strict_env = create_test_env().expect("Failed to create test env");
    let fast_env = create_test_env().expect("Failed to create test env");
    let ctx = fixed_context();

    // 两库预置同一批已有凭证号
    for env in [&strict_env, &fast_env] {
        let seed = env.write_file("seed.csv", &bank_csv(5));
        env.importer()
            .import_file(&seed, &ImportOptions::default(), &ctx)
            .await
            .unwrap();
    }

    let content = mixed_bank_csv(30);
    let strict = strict_env
        .importer()
        .import_file(
            &strict_env.write_file("bank.csv", &content),
            &ImportOptions::default().with_mode(ImportMode::Strict),
            &ctx,
        )
        .await
        .unwrap();
    let fast = fast_env
        .importer()
        .import_file(
            &fast_env.write_file("bank.csv", &content),
            &ImportOptions::default()
                .with_mode(ImportMode::Fast)
                .with_chunk_size(4),
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(fast.import_mode, ImportMode::Fast);
    assert_eq!(strict.imported, fast.imported);
    assert_eq!(strict.duplicates, fast.duplicates);
    assert_eq!(strict.invalid, fast.invalid);
    assert_eq!(strict.error_count, fast.error_count);

    // FAST 模式错误信息精简（不含原值）
    assert!(strict.errors[0].contains("BULAN"));
    assert!(fast.errors[0].ends_with("BULAN 超出范围"), "{}", fast.errors[0]);
    assert!(fast.errors[0].len() < strict.errors[0].len());
}

// ==========================================
// 批次审计
// ==========================================

#[tokio::test]
async fn test_batch_audit_row_written() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let path = env.write_file("audit.csv", &mixed_bank_csv(14));
    let ctx = fixed_context().with_correlation_id("corr-42");

    let result = env
        .importer()
        .import_file(&path, &ImportOptions::default(), &ctx)
        .await
        .unwrap();

    let batches = env.repo().get_recent_batches(5).await.unwrap();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.batch_id, result.batch_id);
    assert_eq!(batch.file_name.as_deref(), Some("audit.csv"));
    assert_eq!(batch.imported_by, "tester");
    assert_eq!(batch.correlation_id, "corr-42");
    assert_eq!(batch.total_rows, result.total_rows as i64);
    assert_eq!(batch.imported_rows, result.imported as i64);
    assert_eq!(batch.unpaid_rows, result.skipped_unpaid as i64);
}

// ==========================================
// 写库失败
// ==========================================

/// 在指定序号的 bulk_insert 调用上失败，其余委托给真实仓储
struct FailingRepo {
    inner: PaymentRepositoryImpl,
    calls: AtomicUsize,
    fail_on_call: usize,
}

#[async_trait]
impl PaymentRepository for FailingRepo {
    async fn bulk_insert(&self, records: &[PaymentRecord]) -> RepositoryResult<usize> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == self.fail_on_call {
            return Err(RepositoryError::DatabaseQueryError(
                "disk I/O error".to_string(),
            ));
        }
        self.inner.bulk_insert(records).await
    }
    async fn exists_reference(&self, reference_no: &str) -> RepositoryResult<bool> {
        self.inner.exists_reference(reference_no).await
    }
    async fn batch_check_exists(
        &self,
        reference_nos: &[String],
    ) -> RepositoryResult<HashSet<String>> {
        self.inner.batch_check_exists(reference_nos).await
    }
    async fn find_by_reference(
        &self,
        reference_no: &str,
    ) -> RepositoryResult<Option<PaymentRecord>> {
        self.inner.find_by_reference(reference_no).await
    }
    async fn list_reference_numbers(&self) -> RepositoryResult<Vec<String>> {
        self.inner.list_reference_numbers().await
    }
    async fn count_payments(&self) -> RepositoryResult<usize> {
        self.inner.count_payments().await
    }
    async fn insert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        self.inner.insert_batch(batch).await
    }
    async fn get_recent_batches(&self, limit: usize) -> RepositoryResult<Vec<ImportBatch>> {
        self.inner.get_recent_batches(limit).await
    }
}

#[tokio::test]
async fn test_failed_sub_batch_is_attributed_and_run_continues() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    env.set_config(config_keys::IMPORT_SUB_BATCH_SIZE, "3");
    let path = env.write_file("bank.csv", &bank_csv(10));

    let repo = Arc::new(FailingRepo {
        inner: env.repo(),
        calls: AtomicUsize::new(0),
        fail_on_call: 1,
    });
    let config = Arc::new(ConfigManager::new(&env.db_path).unwrap());
    let importer = PaymentImporterImpl::new(repo.clone(), config);

    let result = importer
        .import_file(&path, &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.total_rows, 10);
    assert_eq!(result.imported, 7);
    assert_eq!(result.storage_failed, 3);
    assert_eq!(result.error_count, 3);
    for (message, row) in result.errors.iter().zip([4, 5, 6]) {
        assert!(message.starts_with(&format!("行 {}:", row)), "{}", message);
        assert!(message.contains("disk I/O error"));
    }

    let references = repo.list_reference_numbers().await.unwrap();
    assert_eq!(references.len(), 7);
    assert!(!references.contains(&"REF00005".to_string()));
}
