// ==========================================
// 烘焙运营管理系统 - 配方数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 删除配方时保留排程条目，仅将其 recipe_id 置空
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::recipe::{FormulaLine, Recipe};
use crate::repository::column;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::ingredient_repo::ingredient_from_raw;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};

// ==========================================
// RecipeRepository - 配方仓储
// ==========================================
/// 配方仓储
/// 职责: 管理 recipe / recipe_ingredient 表
pub struct RecipeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RecipeRepository {
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

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入或更新配方（整体替换配方行）
    ///
    /// # 说明
    /// - 配方行只保存原料ID，原料本身由 IngredientRepository 维护
    /// - 使用事务确保配方与配方行一致
    pub fn upsert_recipe(&self, recipe: &Recipe) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO recipe (recipe_id, name, dough_weight_g)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(recipe_id) DO UPDATE SET
                name = excluded.name,
                dough_weight_g = excluded.dough_weight_g
            "#,
            params![recipe.recipe_id, recipe.name, recipe.dough_weight_g],
        )?;

        tx.execute(
            "DELETE FROM recipe_ingredient WHERE recipe_id = ?1",
            params![recipe.recipe_id],
        )?;

        for line in &recipe.lines {
            tx.execute(
                r#"
                INSERT INTO recipe_ingredient (line_id, recipe_id, ingredient_id, bakers_percent)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    line.line_id,
                    recipe.recipe_id,
                    line.ingredient.ingredient_id,
                    line.bakers_percent,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// 按 recipe_id 查询配方（含配方行与原料）
    ///
    /// # 返回
    /// - Ok(Some(Recipe)): 找到记录
    /// - Ok(None): 未找到记录
    /// - Err: 数据库错误，或配方行引用的原料缺失/单位无法识别
    pub fn find_by_id(&self, recipe_id: &str) -> RepositoryResult<Option<Recipe>> {
        let conn = self.get_conn()?;

        let header: Option<(String, String, Value)> = conn
            .query_row(
                "SELECT recipe_id, name, dough_weight_g FROM recipe WHERE recipe_id = ?1",
                params![recipe_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (recipe_id, name, dough_weight_g) = match header {
            Some(h) => h,
            None => return Ok(None),
        };
        let dough_weight_g = column::real(
            "recipe.dough_weight_g",
            &format!("recipe_id={}", recipe_id),
            &dough_weight_g,
        )?;

        let mut stmt = conn.prepare(
            r#"
            SELECT l.line_id, l.bakers_percent, l.ingredient_id,
                   i.ingredient_id, i.name, i.unit, i.quantity, i.tracked
            FROM recipe_ingredient l
            LEFT JOIN ingredient i ON i.ingredient_id = l.ingredient_id
            WHERE l.recipe_id = ?1
            ORDER BY l.line_id
            "#,
        )?;

        #[allow(clippy::type_complexity)]
        let rows: Vec<(String, Value, Option<String>, Option<String>, Option<String>, Option<String>, Value, Value)> = stmt
            .query_map(params![recipe_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut lines = Vec::with_capacity(rows.len());
        for (line_id, bakers_percent, ref_id, id, ing_name, unit, quantity, tracked) in rows {
            let bakers_percent = column::real(
                "recipe_ingredient.bakers_percent",
                &format!("line_id={}", line_id),
                &bakers_percent,
            )?;
            let raw = match (id, ing_name, unit) {
                (Some(id), Some(n), Some(u)) => (id, n, u, quantity, tracked),
                _ => {
                    return Err(RepositoryError::FieldValueError {
                        field: "recipe_ingredient.ingredient_id".to_string(),
                        message: format!(
                            "line_id={} 引用的原料不存在: {:?}",
                            line_id, ref_id
                        ),
                    })
                }
            };
            lines.push(FormulaLine {
                line_id,
                ingredient: ingredient_from_raw(raw)?,
                bakers_percent,
            });
        }

        Ok(Some(Recipe {
            recipe_id,
            name,
            dough_weight_g,
            lines,
        }))
    }

    /// 删除配方
    ///
    /// 已排程的事件条目保留，recipe_id 置空，结算时跳过。
    pub fn delete(&self, recipe_id: &str) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE bake_event_recipe SET recipe_id = NULL WHERE recipe_id = ?1",
            params![recipe_id],
        )?;
        tx.execute(
            "DELETE FROM recipe_ingredient WHERE recipe_id = ?1",
            params![recipe_id],
        )?;
        let affected = tx.execute("DELETE FROM recipe WHERE recipe_id = ?1", params![recipe_id])?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Recipe".to_string(),
                id: recipe_id.to_string(),
            });
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::domain::ingredient::Ingredient;
    use crate::domain::types::StockUnit;
    use crate::repository::ingredient_repo::IngredientRepository;

    fn shared_conn() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn bread(flour: &Ingredient, water: &Ingredient) -> Recipe {
        Recipe {
            recipe_id: "R_BREAD".to_string(),
            name: "白面包".to_string(),
            dough_weight_g: 1000.0,
            lines: vec![
                FormulaLine {
                    line_id: "R_BREAD-1".to_string(),
                    ingredient: flour.clone(),
                    bakers_percent: 100.0,
                },
                FormulaLine {
                    line_id: "R_BREAD-2".to_string(),
                    ingredient: water.clone(),
                    bakers_percent: 60.0,
                },
            ],
        }
    }

    #[test]
    fn test_upsert_and_find_roundtrip() {
        let conn = shared_conn();
        let ingredients = IngredientRepository::from_connection(conn.clone());
        let recipes = RecipeRepository::from_connection(conn);

        let flour = Ingredient::tracked("ING_FLOUR", "面粉", StockUnit::Kilogram, 20.0);
        let water = Ingredient::untracked("ING_WATER", "水", StockUnit::Gram);
        ingredients.upsert(&flour).unwrap();
        ingredients.upsert(&water).unwrap();

        let recipe = bread(&flour, &water);
        recipes.upsert_recipe(&recipe).unwrap();

        let loaded = recipes.find_by_id("R_BREAD").unwrap().unwrap();
        assert_eq!(loaded, recipe);
        assert!(recipes.find_by_id("R_NONE").unwrap().is_none());
    }

    #[test]
    fn test_find_with_missing_ingredient_fails() {
        let conn = shared_conn();
        let recipes = RecipeRepository::from_connection(conn);
        let flour = Ingredient::tracked("ING_GHOST", "幽灵面粉", StockUnit::Kilogram, 1.0);
        let water = Ingredient::untracked("ING_WATER", "水", StockUnit::Gram);
        recipes.upsert_recipe(&bread(&flour, &water)).unwrap();

        let err = recipes.find_by_id("R_BREAD").unwrap_err();
        assert!(matches!(err, RepositoryError::FieldValueError { .. }));
    }

    #[test]
    fn test_delete_missing_recipe() {
        let recipes = RecipeRepository::from_connection(shared_conn());
        assert!(matches!(
            recipes.delete("R_NONE").unwrap_err(),
            RepositoryError::NotFound { .. }
        ));
    }
}
