// ==========================================
// 烘焙运营管理系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod bake_event;
pub mod ingredient;
pub mod recipe;
pub mod settlement;
pub mod types;

// 重导出核心类型
pub use bake_event::{BakeEvent, EventRecipeEntry, RecipeRef};
pub use ingredient::Ingredient;
pub use recipe::{FormulaLine, Recipe};
pub use settlement::{
    AggregationResult, AtomicSettleReport, DecrementOutcome, DueEventBatch, EventClaim,
    EventContribution, FlagFailure, QuarantinedRow, SettlementDelta, SettlementOutcome,
    SettlementPreview, SettlementRunRecord, Shortfall, SkipReason, SkippedEntry,
};
pub use types::{CommitMode, RunStatus, StockLevel, StockUnit, UnknownUnit, LEGACY_UNLIMITED_STOCK_SENTINEL};
