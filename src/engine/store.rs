// ==========================================
// 烘焙运营管理系统 - 结算存储边界
// ==========================================
// 职责: 定义结算引擎对持久化协作方的读/写接口
// 说明: Engine 层定义 trait，Repository 层实现 (SqliteSettlementStore)
// ==========================================

use crate::domain::settlement::{
    AtomicSettleReport, DueEventBatch, EventClaim, SettlementRunRecord,
};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use chrono::NaiveDate;

/// 结算存储接口
///
/// 跨越系统边界的调用只有这里的方法，引擎内部的缩放与聚合都是同步计算。
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// 读取到期事件: event_date < today AND settled = false
    ///
    /// 返回已在读边界校验过的事件（含条目、配方、原料），以及被隔离的不合法行。
    /// 失败时本轮结算中止，不发生任何写入。
    async fn fetch_due_events(&self, today: NaiveDate) -> RepositoryResult<DueEventBatch>;

    /// 批量扣减库存: stocked_quantity -= quantity
    ///
    /// 一次调用对应一次原子批量写入。
    async fn bulk_decrement(&self, deltas: &[(String, f64)]) -> RepositoryResult<()>;

    /// 标记单个事件已结算（各事件互相独立）
    async fn mark_settled(&self, event_id: &str) -> RepositoryResult<()>;

    /// 单事务结算: 认领事件 → 写入台账 → 扣减库存
    ///
    /// 已被其他运行认领的事件不产生任何扣减。
    async fn settle_atomically(
        &self,
        run_id: &str,
        claims: &[EventClaim],
    ) -> RepositoryResult<AtomicSettleReport>;

    /// 记录运行审计
    async fn record_run(&self, record: &SettlementRunRecord) -> RepositoryResult<()>;
}
