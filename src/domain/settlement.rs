// ==========================================
// 烘焙运营管理系统 - 结算领域模型
// ==========================================
// 职责: 结算增量、事件贡献、提交结果、运行记录
// 说明: SettlementDelta 每次运行重新构建，不持久化
// ==========================================

use crate::domain::bake_event::BakeEvent;
use crate::domain::types::{CommitMode, StockUnit};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

// ==========================================
// SettlementDelta - 结算增量
// ==========================================
// 原料ID → 待扣减数量（库存单位）
// BTreeMap 保证批量写入顺序确定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettlementDelta(BTreeMap<String, f64>);

impl SettlementDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// 累加某原料的扣减量（首次出现时从 0 开始）
    pub fn add(&mut self, ingredient_id: &str, quantity: f64) {
        *self.0.entry(ingredient_id.to_string()).or_insert(0.0) += quantity;
    }

    /// 合并另一份增量
    pub fn merge(&mut self, other: &SettlementDelta) {
        for (id, qty) in other.iter() {
            self.add(id, qty);
        }
    }

    pub fn get(&self, ingredient_id: &str) -> Option<f64> {
        self.0.get(ingredient_id).copied()
    }

    pub fn contains(&self, ingredient_id: &str) -> bool {
        self.0.contains_key(ingredient_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// 转换为批量扣减请求 (ingredient_id, quantity)
    pub fn to_pairs(&self) -> Vec<(String, f64)> {
        self.0.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    /// 键集合相同且每个值在容差内相等
    pub fn approx_eq(&self, other: &SettlementDelta, tolerance: f64) -> bool {
        self.len() == other.len()
            && self.0.iter().all(|(id, qty)| {
                other
                    .get(id)
                    .map(|o| (o - qty).abs() <= tolerance)
                    .unwrap_or(false)
            })
    }
}

// ==========================================
// 跳过的条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    MissingRecipe,      // 配方已删除
    Unscalable(String), // 配方无法缩放（面团重量或百分比基数 <= 0）
    Rejected(String),   // 读边界拒绝的配方
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub entry_id: String,
    pub recipe_id: Option<String>,
    pub reason: SkipReason,
}

// ==========================================
// EventContribution - 单个事件的贡献
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContribution {
    pub event_id: String,
    pub delta: SettlementDelta,
    pub skipped: Vec<SkippedEntry>,
}

// ==========================================
// AggregationResult - 聚合结果
// ==========================================
// 不变量: delta == 所有 contributions.delta 之和
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub delta: SettlementDelta,
    pub contributions: Vec<EventContribution>,
}

impl AggregationResult {
    pub fn skipped_entry_count(&self) -> usize {
        self.contributions.iter().map(|c| c.skipped.len()).sum()
    }

    pub fn event_ids(&self) -> Vec<String> {
        self.contributions.iter().map(|c| c.event_id.clone()).collect()
    }
}

// ==========================================
// 读边界: 到期事件批次
// ==========================================
/// 被隔离的不合法数据行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantinedRow {
    pub table: String,
    pub row_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DueEventBatch {
    pub events: Vec<BakeEvent>,
    pub quarantined: Vec<QuarantinedRow>,
}

// ==========================================
// 原子提交
// ==========================================
/// 单事件认领请求（原子模式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventClaim {
    pub event_id: String,
    pub delta: SettlementDelta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtomicSettleReport {
    pub claimed_event_ids: Vec<String>,
    pub already_settled_event_ids: Vec<String>,
    pub applied_delta: SettlementDelta,
}

// ==========================================
// SettlementOutcome - 提交结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecrementOutcome {
    /// 增量为空，未发起扣减
    NothingToDeduct,
    Applied { ingredient_count: usize },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagFailure {
    pub event_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub run_id: String,
    pub commit_mode: CommitMode,
    pub due_event_count: usize,
    pub quarantined_count: usize,
    pub skipped_entry_count: usize,
    pub delta: SettlementDelta,
    pub decrement: DecrementOutcome,
    pub settled_event_ids: Vec<String>,
    pub already_settled_event_ids: Vec<String>,
    pub flag_failures: Vec<FlagFailure>,
}

impl SettlementOutcome {
    /// 扣减成功且所有事件均已标记
    pub fn is_clean(&self) -> bool {
        !matches!(self.decrement, DecrementOutcome::Failed { .. }) && self.flag_failures.is_empty()
    }

    /// 运行状态字符串（对齐 settlement_run.status）
    pub fn status_str(&self) -> &'static str {
        match (&self.decrement, self.flag_failures.is_empty()) {
            (DecrementOutcome::Failed { .. }, _) => "FAILED",
            (_, false) => "PARTIAL",
            _ => "SUCCESS",
        }
    }
}

// ==========================================
// 预演 (dry run)
// ==========================================
/// 库存不足提示（不阻断结算）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shortfall {
    pub ingredient_id: String,
    pub name: String,
    pub unit: StockUnit,
    pub stocked: f64,
    pub required: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementPreview {
    pub today: NaiveDate,
    pub due_event_count: usize,
    pub aggregation: AggregationResult,
    pub shortfalls: Vec<Shortfall>,
    pub quarantined: Vec<QuarantinedRow>,
}

// ==========================================
// SettlementRunRecord - 运行审计记录
// ==========================================
// 对齐: settlement_run 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRunRecord {
    pub run_id: String,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub status: String,
    pub commit_mode: CommitMode,
    pub due_events: i64,
    pub settled_events: i64,
    pub failed_events: i64,
    pub decremented_ingredients: i64,
    pub detail_json: Option<JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_add_and_merge() {
        let mut a = SettlementDelta::new();
        a.add("flour", 1.5);
        a.add("flour", 0.5);
        a.add("salt", 10.0);

        let mut b = SettlementDelta::new();
        b.add("salt", 2.0);
        b.add("yeast", 3.0);

        a.merge(&b);
        assert_eq!(a.get("flour"), Some(2.0));
        assert_eq!(a.get("salt"), Some(12.0));
        assert_eq!(a.get("yeast"), Some(3.0));
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_delta_pairs_are_sorted() {
        let mut d = SettlementDelta::new();
        d.add("c", 1.0);
        d.add("a", 1.0);
        d.add("b", 1.0);
        let ids: Vec<String> = d.to_pairs().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_delta_approx_eq() {
        let mut a = SettlementDelta::new();
        a.add("flour", 1.0);
        let mut b = SettlementDelta::new();
        b.add("flour", 1.0 + 1e-12);
        assert!(a.approx_eq(&b, 1e-9));

        b.add("salt", 1.0);
        assert!(!a.approx_eq(&b, 1e-9));
    }
}
