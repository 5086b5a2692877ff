// ==========================================
// 烘焙运营管理系统 - 应用层
// ==========================================
// 职责: 装配仓储、配置与结算引擎
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
