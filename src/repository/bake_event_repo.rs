// ==========================================
// 烘焙运营管理系统 - 烘焙事件数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 事件与其配方条目在同一事务内写入
// ==========================================

use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// 事件日期在库中的存储格式
pub const EVENT_DATE_FORMAT: &str = "%Y-%m-%d";

// ==========================================
// 行模型（未经读边界校验的原始数据）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BakeEventRow {
    pub event_id: String,
    pub event_date: String,
    pub settled: bool,
    pub settled_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BakeEntryRow {
    pub entry_id: String,
    pub recipe_id: Option<String>, // 配方删除后为 NULL
    pub quantity: i64,
}

impl BakeEntryRow {
    pub fn new(entry_id: &str, recipe_id: &str, quantity: i64) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            recipe_id: Some(recipe_id.to_string()),
            quantity,
        }
    }
}

// ==========================================
// BakeEventRepository - 烘焙事件仓储
// ==========================================
/// 烘焙事件仓储
/// 职责: 管理 bake_event / bake_event_recipe 表（排程侧）
pub struct BakeEventRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BakeEventRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建烘焙事件（含配方条目）
    ///
    /// # 参数
    /// - event_id: 事件ID
    /// - event_date: 烘焙日期
    /// - entries: 配方条目（quantity 为整批倍数）
    pub fn create_event(
        &self,
        event_id: &str,
        event_date: NaiveDate,
        entries: &[BakeEntryRow],
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO bake_event (event_id, event_date, settled) VALUES (?1, ?2, 0)",
            params![event_id, event_date.format(EVENT_DATE_FORMAT).to_string()],
        )?;

        for entry in entries {
            tx.execute(
                r#"
                INSERT INTO bake_event_recipe (entry_id, event_id, recipe_id, quantity)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![entry.entry_id, event_id, entry.recipe_id, entry.quantity],
            )?;
        }

        tx.commit()?;
        tracing::debug!(event_id = %event_id, entries = entries.len(), "烘焙事件已创建");
        Ok(())
    }

    /// 按 event_id 查询事件头
    pub fn find_by_id(&self, event_id: &str) -> RepositoryResult<Option<BakeEventRow>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                "SELECT event_id, event_date, settled, settled_at FROM bake_event WHERE event_id = ?1",
                params![event_id],
                map_event_row,
            )
            .optional()?;
        Ok(row)
    }

    /// 查询事件的配方条目
    pub fn list_entries(&self, event_id: &str) -> RepositoryResult<Vec<BakeEntryRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT entry_id, recipe_id, quantity
            FROM bake_event_recipe
            WHERE event_id = ?1
            ORDER BY entry_id
            "#,
        )?;

        let rows = stmt
            .query_map(params![event_id], |row| {
                Ok(BakeEntryRow {
                    entry_id: row.get(0)?,
                    recipe_id: row.get(1)?,
                    quantity: row.get(2)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 查询全部未结算事件（按日期排序，不判断是否到期）
    pub fn list_unsettled(&self) -> RepositoryResult<Vec<BakeEventRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT event_id, event_date, settled, settled_at
            FROM bake_event
            WHERE settled = 0
            ORDER BY event_date, event_id
            "#,
        )?;

        let rows = stmt
            .query_map([], map_event_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 删除事件（条目级联删除）
    pub fn delete(&self, event_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM bake_event WHERE event_id = ?1", params![event_id])?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "BakeEvent".to_string(),
                id: event_id.to_string(),
            });
        }
        Ok(())
    }
}

fn map_event_row(row: &rusqlite::Row<'_>) -> SqliteResult<BakeEventRow> {
    Ok(BakeEventRow {
        event_id: row.get(0)?,
        event_date: row.get(1)?,
        settled: row.get::<_, i64>(2)? != 0,
        settled_at: row.get(3)?,
    })
}
