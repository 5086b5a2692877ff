// ==========================================
// 烘焙运营管理系统 - 消耗聚合引擎
// ==========================================
// 输入: 已过滤的到期事件 (date < today AND settled = false)
// 输出: 原料ID → 总扣减量 + 每个事件的贡献
// 红线: 只计算意图增量，不读取也不修改库存水位
// 红线: 聚合满足交换律与结合律，事件顺序不影响结果
// ==========================================

use crate::domain::bake_event::{BakeEvent, RecipeRef};
use crate::domain::settlement::{
    AggregationResult, EventContribution, SettlementDelta, SkipReason, SkippedEntry,
};
use crate::engine::scaler::BakersPercentScaler;
use crate::engine::unit_normalizer::to_stock_unit;
use tracing::{debug, instrument, warn};

// ==========================================
// ConsumptionAggregator - 消耗聚合引擎
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ConsumptionAggregator {
    scaler: BakersPercentScaler,
}

impl ConsumptionAggregator {
    pub fn new() -> Self {
        Self {
            scaler: BakersPercentScaler::new(),
        }
    }

    /// 聚合所有到期事件的原料消耗
    ///
    /// 规则：
    /// 1) 配方缺失 / 被拒绝 / 无法缩放 → 跳过该条目并告警，不中断本轮
    /// 2) 不限量原料不进入增量
    /// 3) 其余原料换算为库存单位后累加
    #[instrument(skip(self, events), fields(events_count = events.len()))]
    pub fn aggregate(&self, events: &[BakeEvent]) -> AggregationResult {
        let mut result = AggregationResult::default();

        for event in events {
            let contribution = self.contribution_of(event);
            result.delta.merge(&contribution.delta);
            result.contributions.push(contribution);
        }

        debug!(
            ingredients = result.delta.len(),
            skipped_entries = result.skipped_entry_count(),
            "消耗聚合完成"
        );
        result
    }

    /// 计算单个事件的贡献
    pub fn contribution_of(&self, event: &BakeEvent) -> EventContribution {
        let mut delta = SettlementDelta::new();
        let mut skipped = Vec::new();

        for entry in &event.entries {
            let recipe = match &entry.recipe {
                RecipeRef::Resolved(recipe) => recipe,
                RecipeRef::Missing => {
                    warn!(
                        event_id = %event.event_id,
                        entry_id = %entry.entry_id,
                        "配方已不存在，跳过该条目"
                    );
                    skipped.push(SkippedEntry {
                        entry_id: entry.entry_id.clone(),
                        recipe_id: None,
                        reason: SkipReason::MissingRecipe,
                    });
                    continue;
                }
                RecipeRef::Rejected { recipe_id, reason } => {
                    warn!(
                        event_id = %event.event_id,
                        entry_id = %entry.entry_id,
                        recipe_id = %recipe_id,
                        reason = %reason,
                        "配方数据不合法，跳过该条目"
                    );
                    skipped.push(SkippedEntry {
                        entry_id: entry.entry_id.clone(),
                        recipe_id: Some(recipe_id.clone()),
                        reason: SkipReason::Rejected(reason.clone()),
                    });
                    continue;
                }
            };

            let scaled = match self.scaler.scale(recipe, entry.quantity) {
                Ok(scaled) => scaled,
                Err(e) => {
                    warn!(
                        event_id = %event.event_id,
                        entry_id = %entry.entry_id,
                        recipe_id = %recipe.recipe_id,
                        error = %e,
                        "配方无法缩放，跳过该条目"
                    );
                    skipped.push(SkippedEntry {
                        entry_id: entry.entry_id.clone(),
                        recipe_id: Some(recipe.recipe_id.clone()),
                        reason: SkipReason::Unscalable(e.to_string()),
                    });
                    continue;
                }
            };

            for line in &scaled.lines {
                if line.ingredient.is_untracked() {
                    continue;
                }
                delta.add(
                    &line.ingredient.ingredient_id,
                    to_stock_unit(line.weight_g, line.ingredient.unit),
                );
            }
        }

        EventContribution {
            event_id: event.event_id.clone(),
            delta,
            skipped,
        }
    }
}
