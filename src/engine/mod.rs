// ==========================================
// 烘焙运营管理系统 - 引擎层
// ==========================================
// 职责: 配方缩放、单位换算、消耗聚合、结算提交
// 红线: Engine 不拼 SQL, 所有跳过必须输出 reason
// ==========================================

pub mod aggregator;
pub mod committer;
pub mod events;
pub mod orchestrator;
pub mod scaler;
pub mod store;
pub mod unit_normalizer;

// 重导出核心引擎
pub use aggregator::ConsumptionAggregator;
pub use committer::SettlementCommitter;
pub use events::{
    OptionalEventPublisher, SettlementEventPublisher, SettlementNotice,
    SettlementNoticeType,
};
pub use orchestrator::{SettlementEngine, SettlementError};
pub use scaler::{BakersPercentScaler, ScaleError, ScaledLine, ScaledRecipe};
pub use store::SettlementStore;
pub use unit_normalizer::{to_stock_unit, GRAMS_PER_KILOGRAM};
