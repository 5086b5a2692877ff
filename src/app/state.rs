// ==========================================
// 烘焙运营管理系统 - 应用状态
// ==========================================
// 职责: 打开共享连接、建库，装配仓储与结算引擎
// ==========================================

use std::sync::{Arc, Mutex};

use crate::config::config_manager::ConfigManager;
use crate::db::{init_schema, open_sqlite_connection};
use crate::engine::{SettlementEngine, SettlementEventPublisher};
use crate::repository::{
    BakeEventRepository, IngredientRepository, RecipeRepository, SqliteSettlementStore,
};

/// 应用状态
///
/// 所有仓储共享同一个连接，结算引擎串行使用该连接。
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    pub ingredient_repo: Arc<IngredientRepository>,
    pub recipe_repo: Arc<RecipeRepository>,
    pub bake_event_repo: Arc<BakeEventRepository>,
    pub settlement_store: Arc<SqliteSettlementStore>,
    pub config_manager: Arc<ConfigManager>,

    /// 结算引擎（会话启动时触发一次）
    pub settlement_engine: Arc<SettlementEngine<SqliteSettlementStore, ConfigManager>>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - publisher: 结算通知发布者（可选，用于刷新库存/排程视图）
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn new(
        db_path: String,
        publisher: Option<Arc<dyn SettlementEventPublisher>>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let settlement_store = Arc::new(SqliteSettlementStore::from_connection(conn.clone()));

        let mut engine = SettlementEngine::new(settlement_store.clone(), config_manager.clone());
        if let Some(publisher) = publisher {
            engine = engine.with_publisher(publisher);
        }

        Ok(Self {
            ingredient_repo: Arc::new(IngredientRepository::from_connection(conn.clone())),
            recipe_repo: Arc::new(RecipeRepository::from_connection(conn.clone())),
            bake_event_repo: Arc::new(BakeEventRepository::from_connection(conn)),
            settlement_store,
            config_manager,
            settlement_engine: Arc::new(engine),
            db_path,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: BAKERY_OPS_DB_PATH → 用户数据目录 → ./bakery_ops.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("BAKERY_OPS_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./bakery_ops.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        let dir = data_dir.join("bakery-ops-dev");

        #[cfg(not(debug_assertions))]
        let dir = data_dir.join("bakery-ops");

        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("bakery_ops.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_app_state_initializes_schema() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let db_path = file.path().to_str().unwrap().to_string();

        let state = AppState::new(db_path.clone(), None).unwrap();
        assert_eq!(state.db_path, db_path);
        assert!(state.ingredient_repo.list_all().unwrap().is_empty());
        assert_eq!(state.settlement_engine.status(), crate::domain::RunStatus::Idle);
    }
}
