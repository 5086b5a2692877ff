// ==========================================
// 烘焙运营管理系统 - 原料数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 不限量原料以 tracked = 0 存储，出入库时与 StockLevel 互转
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::ingredient::Ingredient;
use crate::domain::types::{StockLevel, StockUnit};
use crate::repository::column;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};

/// ingredient 表原始行: (ingredient_id, name, unit, quantity, tracked)
pub(crate) type RawIngredientRow = (String, String, String, Value, Value);

const SELECT_COLUMNS: &str = "ingredient_id, name, unit, quantity, tracked";

/// 原始行 → 领域对象（单位无法识别、数值列类型错误时报字段错误）
pub(crate) fn ingredient_from_raw(raw: RawIngredientRow) -> RepositoryResult<Ingredient> {
    let (ingredient_id, name, unit, quantity, tracked) = raw;
    let row = format!("ingredient_id={}", ingredient_id);

    let tracked = column::integer("ingredient.tracked", &row, &tracked)? != 0;
    // 不限量原料的 quantity 不参与任何计算
    let quantity = if tracked {
        column::real("ingredient.quantity", &row, &quantity)?
    } else {
        0.0
    };

    let unit = unit
        .parse::<StockUnit>()
        .map_err(|e| RepositoryError::FieldValueError {
            field: "ingredient.unit".to_string(),
            message: format!("ingredient_id={}: {}", ingredient_id, e),
        })?;

    Ok(Ingredient {
        ingredient_id,
        name,
        unit,
        stock: StockLevel::from_columns(tracked, quantity),
    })
}

// ==========================================
// IngredientRepository - 原料仓储
// ==========================================
/// 原料仓储
/// 职责: 管理 ingredient 表的 CRUD 操作
pub struct IngredientRepository {
    conn: Arc<Mutex<Connection>>,
}

impl IngredientRepository {
    /// 创建新的原料仓储实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入或更新原料
    pub fn upsert(&self, ingredient: &Ingredient) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let (tracked, quantity) = ingredient.stock.to_columns();
        conn.execute(
            r#"
            INSERT INTO ingredient (ingredient_id, name, unit, quantity, tracked)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(ingredient_id) DO UPDATE SET
                name = excluded.name,
                unit = excluded.unit,
                quantity = excluded.quantity,
                tracked = excluded.tracked
            "#,
            params![
                ingredient.ingredient_id,
                ingredient.name,
                ingredient.unit.to_db_str(),
                quantity,
                tracked,
            ],
        )?;
        Ok(())
    }

    /// 按 ingredient_id 查询
    ///
    /// # 返回
    /// - Ok(Some(Ingredient)): 找到记录
    /// - Ok(None): 未找到记录
    /// - Err: 数据库错误或单位无法识别
    pub fn find_by_id(&self, ingredient_id: &str) -> RepositoryResult<Option<Ingredient>> {
        let conn = self.get_conn()?;
        let raw: Option<RawIngredientRow> = conn
            .query_row(
                &format!("SELECT {} FROM ingredient WHERE ingredient_id = ?1", SELECT_COLUMNS),
                params![ingredient_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        raw.map(ingredient_from_raw).transpose()
    }

    /// 查询全部原料（按ID排序）
    pub fn list_all(&self) -> RepositoryResult<Vec<Ingredient>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM ingredient ORDER BY ingredient_id",
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<SqliteResult<Vec<RawIngredientRow>>>()?;

        rows.into_iter().map(ingredient_from_raw).collect()
    }

    /// 人工设置库存（库存盘点）
    pub fn set_stock(&self, ingredient_id: &str, stock: StockLevel) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let (tracked, quantity) = stock.to_columns();
        let affected = conn.execute(
            "UPDATE ingredient SET quantity = ?2, tracked = ?3 WHERE ingredient_id = ?1",
            params![ingredient_id, quantity, tracked],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Ingredient".to_string(),
                id: ingredient_id.to_string(),
            });
        }
        Ok(())
    }

    /// 删除原料
    pub fn delete(&self, ingredient_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "DELETE FROM ingredient WHERE ingredient_id = ?1",
            params![ingredient_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn memory_repo() -> IngredientRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        IngredientRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_upsert_and_find() {
        let repo = memory_repo();
        repo.upsert(&Ingredient::tracked("ING_FLOUR", "面粉", StockUnit::Kilogram, 25.0))
            .unwrap();
        repo.upsert(&Ingredient::untracked("ING_WATER", "水", StockUnit::Gram))
            .unwrap();

        let flour = repo.find_by_id("ING_FLOUR").unwrap().unwrap();
        assert_eq!(flour.stock, StockLevel::Tracked(25.0));
        assert_eq!(flour.unit, StockUnit::Kilogram);

        let water = repo.find_by_id("ING_WATER").unwrap().unwrap();
        assert!(water.is_untracked());

        assert!(repo.find_by_id("NOPE").unwrap().is_none());
        assert_eq!(repo.list_all().unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_unit_is_field_error() {
        let repo = memory_repo();
        {
            let conn = repo.get_conn().unwrap();
            conn.execute(
                "INSERT INTO ingredient (ingredient_id, name, unit, quantity) VALUES ('X', 'x', 'cup', 1)",
                [],
            )
            .unwrap();
        }
        let err = repo.find_by_id("X").unwrap_err();
        assert!(matches!(err, RepositoryError::FieldValueError { .. }));
    }

    #[test]
    fn test_text_quantity_is_field_error_only_when_tracked() {
        let repo = memory_repo();
        {
            let conn = repo.get_conn().unwrap();
            conn.execute_batch(
                r#"
                INSERT INTO ingredient VALUES ('SUGAR', '糖', 'kg', 'lots', 1);
                INSERT INTO ingredient VALUES ('ICE', '冰', 'g', 'n/a', 0);
                "#,
            )
            .unwrap();
        }
        assert!(matches!(
            repo.find_by_id("SUGAR").unwrap_err(),
            RepositoryError::FieldValueError { .. }
        ));
        assert!(repo.find_by_id("ICE").unwrap().unwrap().is_untracked());
    }

    #[test]
    fn test_open_failure_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("bakery.db");
        let result = IngredientRepository::new(path.to_str().unwrap());
        assert!(matches!(
            result.err(),
            Some(RepositoryError::DatabaseConnectionError(_))
        ));
    }

    #[test]
    fn test_set_stock_missing_is_not_found() {
        let repo = memory_repo();
        let err = repo.set_stock("NOPE", StockLevel::Tracked(1.0)).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
