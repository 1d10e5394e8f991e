// ==========================================
// 学费缴款对账系统 - 命令行主入口
// ==========================================

use anyhow::Context;
use clap::Parser;
use spp_reconcile::api::{ConfigApi, ImportApi, ImportApiResponse, ImportFileOutcome};
use spp_reconcile::cli::{Cli, Command, ConfigAction};
use spp_reconcile::context::RequestContext;
use spp_reconcile::importer::ImportOptions;
use spp_reconcile::{db, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.log_json {
        logging::init_json();
    } else {
        logging::init();
    }

    let db_path = cli.db.clone().unwrap_or_else(db::default_db_path);
    tracing::info!(version = spp_reconcile::VERSION, db_path = %db_path, "{}", spp_reconcile::APP_NAME);

    match cli.command {
        Command::InitDb => {
            let version = ImportApi::new(db_path.clone())
                .init_db()
                .with_context(|| format!("无法初始化数据库: {}", db_path))?;
            println!("schema_version = {}", version);
        }
        Command::Import {
            files,
            mode,
            family,
            operator,
            chunk_size,
            json,
        } => {
            let api = ImportApi::new(db_path);
            let options = ImportOptions {
                family,
                mode,
                chunk_size,
            };
            let ctx = RequestContext::new(operator);

            if files.len() == 1 {
                let response = api
                    .import_payments(&files[0], &options, &ctx)
                    .await
                    .with_context(|| format!("导入失败: {}", files[0].display()))?;
                print_response(&files[0].display().to_string(), &response, json)?;
            } else {
                let outcomes = api.import_many(&files, &options, &ctx).await?;
                print_outcomes(&outcomes, json)?;
            }
        }
        Command::Batches { limit } => {
            let batches = ImportApi::new(db_path).recent_batches(limit).await?;
            println!("{}", serde_json::to_string_pretty(&batches)?);
        }
        Command::Config { action } => {
            let api = ConfigApi::open(&db_path)?;
            match action {
                ConfigAction::Get { key: Some(key) } => {
                    let item = api.get_config(&key)?;
                    println!("{} = {}", item.key, item.value);
                }
                ConfigAction::Get { key: None } => {
                    for item in api.list_configs()? {
                        let marker = if item.is_default { " (默认)" } else { "" };
                        println!("{} = {}{}", item.key, item.value, marker);
                    }
                }
                ConfigAction::Set { key, value } => {
                    let item = api.update_config(&key, &value)?;
                    println!("{} = {}", item.key, item.value);
                }
            }
        }
    }

    Ok(())
}

fn print_response(file: &str, response: &ImportApiResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    println!("文件: {}", file);
    println!(
        "  批次 {} [{}] 共 {} 行: 导入 {}, 重复 {}, 未缴 {}, 错误 {} ({:.1} ms)",
        response.batch_id,
        response.source_family,
        response.total_rows,
        response.imported,
        response.duplicates,
        response.skipped_unpaid,
        response.error_count,
        response.duration_ms
    );
    for error in &response.errors {
        println!("  - {}", error);
    }
    Ok(())
}

fn print_outcomes(outcomes: &[ImportFileOutcome], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcomes)?);
        return Ok(());
    }

    for outcome in outcomes {
        match (&outcome.result, &outcome.error) {
            (Some(response), _) => print_response(&outcome.file, response, false)?,
            (None, Some(error)) => println!("文件: {}\n  失败: {}", outcome.file, error),
            (None, None) => {}
        }
    }
    Ok(())
}
