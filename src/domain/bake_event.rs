// ==========================================
// 烘焙运营管理系统 - 烘焙事件领域模型
// ==========================================
// 生命周期: 排程创建 (settled=false) → 结算引擎置为 true，之后永不再参与结算
// ==========================================

use crate::domain::recipe::Recipe;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ==========================================
// RecipeRef - 事件条目引用的配方
// ==========================================
// 读边界校验后的三种形态，避免 null 深入计算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipeRef {
    /// 配方完整可用
    Resolved(Arc<Recipe>),
    /// 配方在排程后被删除
    Missing,
    /// 配方数据不合法（原料缺失、单位无法识别等）
    Rejected { recipe_id: String, reason: String },
}

// ==========================================
// EventRecipeEntry - 事件配方条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecipeEntry {
    pub entry_id: String,
    pub quantity: u32, // 烘焙批数（整批倍数, > 0）
    pub recipe: RecipeRef,
}

impl EventRecipeEntry {
    pub fn recipe_id(&self) -> Option<&str> {
        match &self.recipe {
            RecipeRef::Resolved(r) => Some(r.recipe_id.as_str()),
            RecipeRef::Rejected { recipe_id, .. } => Some(recipe_id.as_str()),
            RecipeRef::Missing => None,
        }
    }
}

// ==========================================
// BakeEvent - 烘焙事件
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BakeEvent {
    pub event_id: String,
    pub event_date: NaiveDate,
    pub settled: bool,
    pub entries: Vec<EventRecipeEntry>,
}

impl BakeEvent {
    /// 是否到期: 日期早于今天且未结算
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.event_date < today && !self.settled
    }
}
