// ==========================================
// 并发导入测试
// ==========================================
// 测试目标: 验证多文件批量导入与并发运行间的判重一致性
// ==========================================


use spp_reconcile::api::ImportApi;
use spp_reconcile::importer::{ImportError, ImportOptions, PaymentImporter};
use spp_reconcile::logging;
use spp_reconcile::repository::PaymentRepository;
use std::time::Instant;
use test_helpers::*;

#[tokio::test]
async fn test_batch_import_multiple_files() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");

    // 第二个文件的前 5 行与第一个文件重叠
    let first = env.write_file("first.csv", &bank_csv(10));
    let mut lines = vec![BANK_HEADER.to_string()];
    for i in 6..=15 {
        lines.push(bank_row(i, "Paid", &format!("REF{:05}", i)));
    }
    let second = env.write_file("second.csv", &lines.join("\n"));
    let broken = env.write_file("broken.csv", "foo,bar\n1,2\n");

    let start = Instant::now();
    let results = env
        .importer()
        .batch_import(
            &[first.clone(), second.clone(), broken.clone()],
            &ImportOptions::default(),
            &fixed_context(),
        )
        .await;
    let elapsed = start.elapsed();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].0, first);
    assert_eq!(results[2].0, broken);
    assert!(matches!(
        results[2].1,
        Err(ImportError::UnrecognizedHeader { .. })
    ));

    let first_result = results[0].1.as_ref().expect("第一个文件应导入成功");
    let second_result = results[1].1.as_ref().expect("第二个文件应导入成功");
    assert_eq!(first_result.total_rows, 10);
    assert_eq!(second_result.total_rows, 10);
    assert_eq!(
        first_result.imported
            + second_result.imported
            + first_result.storage_failed
            + second_result.storage_failed
            + first_result.duplicates
            + second_result.duplicates,
        20
    );

    let repo = env.repo();
    assert_eq!(repo.count_payments().await.unwrap(), 15);
    assert_eq!(repo.get_recent_batches(10).await.unwrap().len(), 2);

    println!("批量导入 3 个文件耗时: {:?}", elapsed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_never_persist_duplicates() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let n = 120;
    let content = bank_csv(n);
    let paths: Vec<_> = (0..3)
        .map(|i| env.write_file(&format!("upload_{}.csv", i), &content))
        .collect();

    let mut handles = Vec::new();
    for path in paths {
        let importer = env.importer();
        handles.push(tokio::spawn(async move {
            let options = ImportOptions::default().with_chunk_size(25);
            importer
                .import_file(&path, &options, &fixed_context())
                .await
        }));
    }

    let mut imported = 0;
    for handle in handles {
        let result = handle
            .await
            .expect("导入任务不应 panic")
            .expect("导入应该成功");
        assert!(result.success);
        assert_eq!(result.total_rows, n);
        // 每一行要么落库，要么判重，要么因唯一约束冲突计入写库失败
        assert_eq!(
            result.imported + result.duplicates + result.storage_failed,
            n
        );
        imported += result.imported;
    }

    let repo = env.repo();
    assert_eq!(imported, n);
    assert_eq!(repo.count_payments().await.unwrap(), n);
    assert_eq!(repo.list_reference_numbers().await.unwrap().len(), n);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_import_matches_foreground() {
    logging::init_test();
    let foreground = create_test_env().expect("Failed to create test env");
    let background = create_test_env().expect("Failed to create test env");
    let content = bank_csv(30);

    let fg_api = ImportApi::new(foreground.db_path.clone());
    let fg = fg_api
        .import_payments(
            &foreground.write_file("bank.csv", &content),
            &ImportOptions::default(),
            &fixed_context(),
        )
        .await
        .unwrap();

    let bg_api = ImportApi::new(background.db_path.clone());
    let handle = bg_api.spawn_import(
        background.write_file("bank.csv", &content),
        ImportOptions::default(),
        fixed_context(),
    );
    let bg = ImportApi::join_import(handle).await.unwrap();

    assert_eq!(fg.imported, bg.imported);
    assert_eq!(fg.total_rows, bg.total_rows);
    assert_eq!(fg.errors, bg.errors);
}

#[tokio::test]
async fn test_import_many_reports_each_file() {
    logging::init_test();
    let env = create_test_env().expect("Failed to create test env");
    let good = env.write_file("good.csv", &bank_csv(4));
    let missing = env.dir.path().join("missing.xlsx");

    let api = ImportApi::new(env.db_path.clone());
    let outcomes = api
        .import_many(&[good, missing], &ImportOptions::default(), &fixed_context())
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].result.as_ref().map(|r| r.imported), Some(4));
    assert!(outcomes[0].error.is_none());
    assert!(outcomes[1].result.is_none());
    assert!(outcomes[1]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("文件格式错误")));
}
