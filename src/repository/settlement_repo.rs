// ==========================================
// 烘焙运营管理系统 - 结算存储 (SQLite 实现)
// ==========================================
// 职责: 实现 engine::store::SettlementStore
// 读边界: 不合法的行在此处隔离或拒绝，引擎只看到类型化数据
// - 事件日期无法解析      → 隔离（永不结算，每轮上报）
// - 条目 quantity <= 0 或非整数 → 隔离
// - recipe_id 为 NULL/悬空 → RecipeRef::Missing
// - 配方行原料缺失、单位无法识别、百分比非法、数值列存了文本 → RecipeRef::Rejected
// 写边界: 批量扣减、原子结算各自在单个事务内完成
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::bake_event::{BakeEvent, EventRecipeEntry, RecipeRef};
use crate::domain::recipe::{FormulaLine, Recipe};
use crate::domain::settlement::{
    AtomicSettleReport, DueEventBatch, EventClaim, QuarantinedRow, SettlementRunRecord,
};
use crate::domain::types::CommitMode;
use crate::engine::store::SettlementStore;
use crate::repository::bake_event_repo::EVENT_DATE_FORMAT;
use crate::repository::column;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::ingredient_repo::ingredient_from_raw;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// settlement_run 时间戳存储格式
const RUN_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 台账记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub event_id: String,
    pub ingredient_id: String,
    pub quantity: f64,
    pub run_id: String,
}

// ==========================================
// SqliteSettlementStore
// ==========================================
pub struct SqliteSettlementStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSettlementStore {
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

    /// 查询最近的运行审计（按开始时间倒序）
    pub fn list_runs(&self, limit: usize) -> RepositoryResult<Vec<SettlementRunRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, started_at, finished_at, status, commit_mode,
                   due_events, settled_events, failed_events,
                   decremented_ingredients, detail_json
            FROM settlement_run
            ORDER BY started_at DESC, run_id
            LIMIT ?1
            "#,
        )?;

        #[allow(clippy::type_complexity)]
        let rows: Vec<(String, String, String, String, String, i64, i64, i64, i64, Option<String>)> = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        rows.into_iter()
            .map(|r| {
                let detail_json = match r.9 {
                    Some(text) => Some(serde_json::from_str(&text).map_err(|e| {
                        RepositoryError::FieldValueError {
                            field: "settlement_run.detail_json".to_string(),
                            message: e.to_string(),
                        }
                    })?),
                    None => None,
                };
                Ok(SettlementRunRecord {
                    started_at: parse_run_timestamp("started_at", &r.1)?,
                    finished_at: parse_run_timestamp("finished_at", &r.2)?,
                    run_id: r.0,
                    status: r.3,
                    commit_mode: CommitMode::from_str(&r.4),
                    due_events: r.5,
                    settled_events: r.6,
                    failed_events: r.7,
                    decremented_ingredients: r.8,
                    detail_json,
                })
            })
            .collect()
    }

    /// 查询事件的台账记录
    pub fn ledger_for_event(&self, event_id: &str) -> RepositoryResult<Vec<LedgerEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT event_id, ingredient_id, quantity, run_id
            FROM settlement_ledger
            WHERE event_id = ?1
            ORDER BY ingredient_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![event_id], |row| {
                Ok(LedgerEntry {
                    event_id: row.get(0)?,
                    ingredient_id: row.get(1)?,
                    quantity: row.get(2)?,
                    run_id: row.get(3)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}

fn parse_run_timestamp(field: &str, value: &str) -> RepositoryResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, RUN_TIMESTAMP_FORMAT).map_err(|e| {
        RepositoryError::FieldValueError {
            field: format!("settlement_run.{}", field),
            message: format!("{}: {}", value, e),
        }
    })
}

// ==========================================
// 读边界: 到期事件加载
// ==========================================

/// 配方行原始数据: (line_id, bakers_percent, ingredient_id, name, unit, quantity, tracked)
type RawLineRow = (
    String,
    Value,
    Option<String>,
    Option<String>,
    Option<String>,
    Value,
    Value,
);

/// 加载并校验一个配方
///
/// 配方不存在返回 Missing；任一行不合法则整份配方 Rejected。
fn load_recipe_ref(conn: &Connection, recipe_id: &str) -> RepositoryResult<RecipeRef> {
    let header: Option<(String, Value)> = conn
        .query_row(
            "SELECT name, dough_weight_g FROM recipe WHERE recipe_id = ?1",
            params![recipe_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (name, dough_weight_g) = match header {
        Some(h) => h,
        None => return Ok(RecipeRef::Missing),
    };

    let reject = |reason: String| RecipeRef::Rejected {
        recipe_id: recipe_id.to_string(),
        reason,
    };

    let dough_weight_g =
        match column::real("recipe.dough_weight_g", &format!("recipe_id={}", recipe_id), &dough_weight_g) {
            Ok(v) => v,
            Err(e) => return Ok(reject(e.to_string())),
        };
    if !dough_weight_g.is_finite() {
        return Ok(reject(format!("dough_weight_g 非有限值: {}", dough_weight_g)));
    }

    let mut stmt = conn.prepare(
        r#"
        SELECT l.line_id, l.bakers_percent,
               i.ingredient_id, i.name, i.unit, i.quantity, i.tracked
        FROM recipe_ingredient l
        LEFT JOIN ingredient i ON i.ingredient_id = l.ingredient_id
        WHERE l.recipe_id = ?1
        ORDER BY l.line_id
        "#,
    )?;
    let rows: Vec<RawLineRow> = stmt
        .query_map(params![recipe_id], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })?
        .collect::<SqliteResult<Vec<_>>>()?;

    let mut lines = Vec::with_capacity(rows.len());
    for (line_id, bakers_percent, id, ing_name, unit, quantity, tracked) in rows {
        let bakers_percent = match column::real(
            "recipe_ingredient.bakers_percent",
            &format!("line_id={}", line_id),
            &bakers_percent,
        ) {
            Ok(v) => v,
            Err(e) => return Ok(reject(e.to_string())),
        };
        if !bakers_percent.is_finite() || bakers_percent < 0.0 {
            return Ok(reject(format!(
                "line_id={} 烘焙百分比非法: {}",
                line_id, bakers_percent
            )));
        }
        let raw = match (id, ing_name, unit) {
            (Some(id), Some(n), Some(u)) => (id, n, u, quantity, tracked),
            _ => return Ok(reject(format!("line_id={} 引用的原料不存在", line_id))),
        };
        let ingredient = match ingredient_from_raw(raw) {
            Ok(i) => i,
            Err(e) => return Ok(reject(format!("line_id={}: {}", line_id, e))),
        };
        lines.push(FormulaLine {
            line_id,
            ingredient,
            bakers_percent,
        });
    }

    Ok(RecipeRef::Resolved(Arc::new(Recipe {
        recipe_id: recipe_id.to_string(),
        name,
        dough_weight_g,
        lines,
    })))
}

fn load_due_events(conn: &Connection, today: NaiveDate) -> RepositoryResult<DueEventBatch> {
    let mut batch = DueEventBatch::default();

    // 日期在 Rust 侧解析，无法解析的事件需要被看见而不是被字符串比较静默过滤
    let mut stmt = conn.prepare(
        "SELECT event_id, event_date FROM bake_event WHERE settled = 0 ORDER BY event_date, event_id",
    )?;
    let headers: Vec<(String, Value)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<SqliteResult<Vec<_>>>()?;

    let mut entry_stmt = conn.prepare(
        r#"
        SELECT entry_id, recipe_id, quantity
        FROM bake_event_recipe
        WHERE event_id = ?1
        ORDER BY entry_id
        "#,
    )?;

    // 同一轮内配方只加载一次
    let mut recipe_cache: HashMap<String, RecipeRef> = HashMap::new();

    for (event_id, raw_date) in headers {
        let parsed = column::text("bake_event.event_date", &format!("event_id={}", event_id), raw_date)
            .and_then(|text| {
                NaiveDate::parse_from_str(text.trim(), EVENT_DATE_FORMAT).map_err(|e| {
                    RepositoryError::FieldValueError {
                        field: "bake_event.event_date".to_string(),
                        message: format!("无法解析: {} ({})", text, e),
                    }
                })
            });
        let event_date = match parsed {
            Ok(d) => d,
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "事件日期无法解析，已隔离");
                batch.quarantined.push(QuarantinedRow {
                    table: "bake_event".to_string(),
                    row_id: event_id,
                    reason: format!("event_date 无法解析: {}", e),
                });
                continue;
            }
        };

        if event_date >= today {
            continue;
        }

        let raw_entries: Vec<(String, Option<String>, Value)> = entry_stmt
            .query_map(params![event_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut entries = Vec::with_capacity(raw_entries.len());
        for (entry_id, recipe_id, raw_quantity) in raw_entries {
            let quantity = column::integer(
                "bake_event_recipe.quantity",
                &format!("entry_id={}", entry_id),
                &raw_quantity,
            )
            .ok()
            .and_then(|q| u32::try_from(q).ok())
            .filter(|q| *q > 0);
            let quantity = match quantity {
                Some(q) => q,
                None => {
                    let shown = column::describe(&raw_quantity);
                    warn!(event_id = %event_id, entry_id = %entry_id, quantity = %shown, "条目批数非法，已隔离");
                    batch.quarantined.push(QuarantinedRow {
                        table: "bake_event_recipe".to_string(),
                        row_id: entry_id,
                        reason: format!("quantity 必须为正整数: {}", shown),
                    });
                    continue;
                }
            };

            let recipe = match recipe_id {
                None => RecipeRef::Missing,
                Some(rid) => match recipe_cache.get(&rid) {
                    Some(cached) => cached.clone(),
                    None => {
                        let loaded = load_recipe_ref(conn, &rid)?;
                        recipe_cache.insert(rid, loaded.clone());
                        loaded
                    }
                },
            };

            entries.push(EventRecipeEntry {
                entry_id,
                quantity,
                recipe,
            });
        }

        batch.events.push(BakeEvent {
            event_id,
            event_date,
            settled: false,
            entries,
        });
    }

    debug!(
        due_events = batch.events.len(),
        quarantined = batch.quarantined.len(),
        "到期事件加载完成"
    );
    Ok(batch)
}

/// 扣减单个原料（不限量原料不参与）
fn decrement_one(conn: &Connection, ingredient_id: &str, quantity: f64) -> RepositoryResult<()> {
    let affected = conn.execute(
        r#"
        UPDATE ingredient SET quantity = quantity - ?2
        WHERE ingredient_id = ?1 AND tracked = 1
        "#,
        params![ingredient_id, quantity],
    )?;
    if affected == 0 {
        warn!(ingredient_id = %ingredient_id, quantity, "原料不存在或不限量，跳过扣减");
    }
    Ok(())
}

// ==========================================
// SettlementStore Trait 实现
// ==========================================
#[async_trait]
impl SettlementStore for SqliteSettlementStore {
    async fn fetch_due_events(&self, today: NaiveDate) -> RepositoryResult<DueEventBatch> {
        let conn = self.get_conn()?;
        load_due_events(&conn, today)
    }

    async fn bulk_decrement(&self, deltas: &[(String, f64)]) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for (ingredient_id, quantity) in deltas {
            decrement_one(&tx, ingredient_id, *quantity)?;
        }
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(())
    }

    async fn mark_settled(&self, event_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE bake_event SET settled = 1, settled_at = datetime('now') WHERE event_id = ?1 AND settled = 0",
            params![event_id],
        )?;
        if affected == 1 {
            return Ok(());
        }

        let exists: Option<i64> = conn
            .query_row(
                "SELECT settled FROM bake_event WHERE event_id = ?1",
                params![event_id],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            None => Err(RepositoryError::NotFound {
                entity: "BakeEvent".to_string(),
                id: event_id.to_string(),
            }),
            Some(_) => Err(RepositoryError::InvalidStateTransition {
                from: "SETTLED".to_string(),
                to: "SETTLED".to_string(),
            }),
        }
    }

    async fn settle_atomically(
        &self,
        run_id: &str,
        claims: &[EventClaim],
    ) -> RepositoryResult<AtomicSettleReport> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut report = AtomicSettleReport::default();

        // 步骤1: 认领（settled 0 → 1 成功才计入本轮）
        for claim in claims {
            let claimed = tx.execute(
                "UPDATE bake_event SET settled = 1, settled_at = datetime('now') WHERE event_id = ?1 AND settled = 0",
                params![claim.event_id],
            )?;
            if claimed == 0 {
                report.already_settled_event_ids.push(claim.event_id.clone());
                continue;
            }

            // 步骤2: 台账
            for (ingredient_id, quantity) in claim.delta.iter() {
                tx.execute(
                    r#"
                    INSERT INTO settlement_ledger (event_id, ingredient_id, quantity, run_id)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                    params![claim.event_id, ingredient_id, quantity, run_id],
                )?;
            }
            report.claimed_event_ids.push(claim.event_id.clone());
            report.applied_delta.merge(&claim.delta);
        }

        // 步骤3: 扣减认领成功部分的合计
        for (ingredient_id, quantity) in report.applied_delta.iter() {
            decrement_one(&tx, ingredient_id, quantity)?;
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(report)
    }

    async fn record_run(&self, record: &SettlementRunRecord) -> RepositoryResult<()> {
        let detail = match &record.detail_json {
            Some(v) => Some(serde_json::to_string(v).map_err(|e| {
                RepositoryError::InternalError(format!("detail_json 序列化失败: {}", e))
            })?),
            None => None,
        };

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO settlement_run (
                run_id, started_at, finished_at, status, commit_mode,
                due_events, settled_events, failed_events,
                decremented_ingredients, detail_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.run_id,
                record.started_at.format(RUN_TIMESTAMP_FORMAT).to_string(),
                record.finished_at.format(RUN_TIMESTAMP_FORMAT).to_string(),
                record.status,
                record.commit_mode.to_db_str(),
                record.due_events,
                record.settled_events,
                record.failed_events,
                record.decremented_ingredients,
                detail,
            ],
        )?;
        Ok(())
    }
}
