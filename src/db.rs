// ==========================================
// 烘焙运营管理系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 幂等建库，schema_version 记录当前版本
// ==========================================

use crate::domain::types::LEGACY_UNLIMITED_STOCK_SENTINEL;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

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

/// 幂等建表
///
/// 说明：
/// - bake_event_recipe.recipe_id 在配方删除后置 NULL（排程保留，结算时跳过该条目）
/// - ingredient.tracked = 0 表示不限量原料（不参与扣减），此时 quantity 无意义
/// - v1 库没有 tracked 列，以 quantity = -1000 表示不限量，由 migrate_ingredient_tracked 转换
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS ingredient (
            ingredient_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            unit TEXT NOT NULL,
            quantity REAL NOT NULL DEFAULT 0,
            tracked INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS recipe (
            recipe_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            dough_weight_g REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recipe_ingredient (
            line_id TEXT PRIMARY KEY,
            recipe_id TEXT NOT NULL REFERENCES recipe(recipe_id) ON DELETE CASCADE,
            ingredient_id TEXT,
            bakers_percent REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS bake_event (
            event_id TEXT PRIMARY KEY,
            event_date TEXT NOT NULL,
            settled INTEGER NOT NULL DEFAULT 0,
            settled_at TEXT
        );

        CREATE TABLE IF NOT EXISTS bake_event_recipe (
            entry_id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES bake_event(event_id) ON DELETE CASCADE,
            recipe_id TEXT REFERENCES recipe(recipe_id) ON DELETE SET NULL,
            quantity INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS settlement_ledger (
            event_id TEXT NOT NULL,
            ingredient_id TEXT NOT NULL,
            quantity REAL NOT NULL,
            run_id TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (event_id, ingredient_id)
        );

        CREATE TABLE IF NOT EXISTS settlement_run (
            run_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            status TEXT NOT NULL,
            commit_mode TEXT NOT NULL,
            due_events INTEGER NOT NULL,
            settled_events INTEGER NOT NULL,
            failed_events INTEGER NOT NULL,
            decremented_ingredients INTEGER NOT NULL,
            detail_json TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_bake_event_due ON bake_event(settled, event_date);
        CREATE INDEX IF NOT EXISTS idx_bake_event_recipe_event ON bake_event_recipe(event_id);
        CREATE INDEX IF NOT EXISTS idx_recipe_ingredient_recipe ON recipe_ingredient(recipe_id);
        "#,
    )?;

    migrate_ingredient_tracked(conn)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// v1 → v2: 增加 ingredient.tracked，并把旧哨兵行转换为不限量
///
/// 只在 tracked 列不存在时执行一次；之后 -1000 只是普通库存值。
fn migrate_ingredient_tracked(conn: &Connection) -> rusqlite::Result<()> {
    let has_col: i32 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('ingredient') WHERE name = 'tracked'",
        [],
        |row| row.get(0),
    )?;
    if has_col > 0 {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch("ALTER TABLE ingredient ADD COLUMN tracked INTEGER NOT NULL DEFAULT 1;")?;
    let converted = tx.execute(
        "UPDATE ingredient SET tracked = 0, quantity = 0 WHERE quantity = ?1",
        [LEGACY_UNLIMITED_STOCK_SENTINEL],
    )?;
    tx.commit()?;
    tracing::info!(converted, "ingredient.tracked 迁移完成");
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

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
