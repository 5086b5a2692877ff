// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、共享连接、原始数据写入
// ==========================================
#![allow(dead_code)]

use bakery_ops::db::{init_schema, open_sqlite_connection};
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是合法 UTF-8")?
        .to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开共享连接（仓储、配置与结算存储共用）
pub fn open_shared(db_path: &str) -> Result<Arc<Mutex<Connection>>, Box<dyn Error>> {
    Ok(Arc::new(Mutex::new(open_sqlite_connection(db_path)?)))
}

/// 直接写入一条事件头（绕过仓储，用于构造脏数据）
pub fn insert_raw_event(
    conn: &Arc<Mutex<Connection>>,
    event_id: &str,
    event_date: &str,
) -> Result<(), Box<dyn Error>> {
    let conn = conn.lock().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO bake_event (event_id, event_date, settled) VALUES (?1, ?2, 0)",
        params![event_id, event_date],
    )?;
    Ok(())
}

/// 直接写入一条配方条目
pub fn insert_raw_entry(
    conn: &Arc<Mutex<Connection>>,
    entry_id: &str,
    event_id: &str,
    recipe_id: Option<&str>,
    quantity: i64,
) -> Result<(), Box<dyn Error>> {
    let conn = conn.lock().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO bake_event_recipe (entry_id, event_id, recipe_id, quantity) VALUES (?1, ?2, ?3, ?4)",
        params![entry_id, event_id, recipe_id, quantity],
    )?;
    Ok(())
}

/// 读取事件结算标志
pub fn is_settled(conn: &Arc<Mutex<Connection>>, event_id: &str) -> Result<bool, Box<dyn Error>> {
    let conn = conn.lock().map_err(|e| e.to_string())?;
    let settled: i64 = conn.query_row(
        "SELECT settled FROM bake_event WHERE event_id = ?1",
        params![event_id],
        |row| row.get(0),
    )?;
    Ok(settled != 0)
}

/// 读取原料库存原始值
pub fn stored_quantity(conn: &Arc<Mutex<Connection>>, ingredient_id: &str) -> Result<f64, Box<dyn Error>> {
    let conn = conn.lock().map_err(|e| e.to_string())?;
    let q: f64 = conn.query_row(
        "SELECT quantity FROM ingredient WHERE ingredient_id = ?1",
        params![ingredient_id],
        |row| row.get(0),
    )?;
    Ok(q)
}

/// 读取原料是否追踪库存
pub fn stored_tracked(conn: &Arc<Mutex<Connection>>, ingredient_id: &str) -> Result<bool, Box<dyn Error>> {
    let conn = conn.lock().map_err(|e| e.to_string())?;
    let tracked: i64 = conn.query_row(
        "SELECT tracked FROM ingredient WHERE ingredient_id = ?1",
        params![ingredient_id],
        |row| row.get(0),
    )?;
    Ok(tracked != 0)
}

/// 统计表行数
pub fn count_rows(conn: &Arc<Mutex<Connection>>, table: &str) -> Result<i64, Box<dyn Error>> {
    let conn = conn.lock().map_err(|e| e.to_string())?;
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(n)
}
