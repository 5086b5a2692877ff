// ==========================================
// 烘焙运营管理系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 烘焙排程结算（按已完成烘焙事件自动扣减原料库存）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 缩放、聚合、结算
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// 应用层 - 装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{CommitMode, RunStatus, StockLevel, StockUnit};

// 领域实体
pub use domain::{
    AggregationResult, BakeEvent, EventRecipeEntry, FormulaLine, Ingredient, Recipe, RecipeRef,
    SettlementDelta, SettlementOutcome, SettlementPreview,
};

// 引擎
pub use engine::{
    to_stock_unit, BakersPercentScaler, ConsumptionAggregator, SettlementCommitter,
    SettlementEngine, SettlementError, SettlementStore,
};

// 仓储
pub use repository::{RepositoryError, RepositoryResult, SqliteSettlementStore};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "烘焙运营管理系统";
