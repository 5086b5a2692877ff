// ==========================================
// 烘焙运营管理系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod bake_event_repo;
mod column;
pub mod error;
pub mod ingredient_repo;
pub mod recipe_repo;
pub mod settlement_repo;

// 重导出核心仓储
pub use bake_event_repo::{BakeEntryRow, BakeEventRepository, BakeEventRow, EVENT_DATE_FORMAT};
pub use error::{RepositoryError, RepositoryResult};
pub use ingredient_repo::IngredientRepository;
pub use recipe_repo::RecipeRepository;
pub use settlement_repo::{LedgerEntry, SqliteSettlementStore};
