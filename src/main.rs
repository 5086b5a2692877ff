// ==========================================
// 烘焙运营管理系统 - 命令行入口
// ==========================================
// 用法:
//   bakery-ops [db_path] [--dry-run] [--today YYYY-MM-DD]
//
// 每次启动执行一次结算（对应客户端会话启动触发），结果以 JSON 输出到 stdout。
// ==========================================

use anyhow::{bail, Context, Result};
use bakery_ops::app::{get_default_db_path, AppState};
use bakery_ops::logging;
use chrono::{Local, NaiveDate};

struct CliArgs {
    db_path: String,
    dry_run: bool,
    today: NaiveDate,
}

fn parse_args() -> Result<CliArgs> {
    let mut db_path = None;
    let mut dry_run = false;
    let mut today = Local::now().date_naive();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            "--today" => {
                let value = args.next().context("--today 需要日期参数 (YYYY-MM-DD)")?;
                today = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                    .with_context(|| format!("无法解析日期: {}", value))?;
            }
            other if other.starts_with("--") => bail!("未知参数: {}", other),
            other => {
                if db_path.is_some() {
                    bail!("多余的位置参数: {}", other);
                }
                db_path = Some(other.to_string());
            }
        }
    }

    Ok(CliArgs {
        db_path: db_path.unwrap_or_else(get_default_db_path),
        dry_run,
        today,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = parse_args()?;

    tracing::info!("==================================================");
    tracing::info!("{} - 系统版本: {}", bakery_ops::APP_NAME, bakery_ops::VERSION);
    tracing::info!("使用数据库: {}", args.db_path);
    tracing::info!("==================================================");

    let state = AppState::new(args.db_path.clone(), None).map_err(anyhow::Error::msg)?;
    let engine = &state.settlement_engine;

    let output = if args.dry_run {
        let preview = engine.preview(args.today).await?;
        serde_json::to_string_pretty(&preview)?
    } else {
        let outcome = engine.run(args.today).await?;
        serde_json::to_string_pretty(&outcome)?
    };

    println!("{}", output);
    Ok(())
}
