// ==========================================
// 烘焙运营管理系统 - 原料领域模型
// ==========================================
// 红线: 不限量原料 (Untracked) 永不进入扣减
// ==========================================

use crate::domain::types::{StockLevel, StockUnit};
use serde::{Deserialize, Serialize};

// ==========================================
// Ingredient - 原料
// ==========================================
// 对齐: ingredient 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub ingredient_id: String, // 原料ID
    pub name: String,          // 名称
    pub unit: StockUnit,       // 库存单位
    pub stock: StockLevel,     // 库存水位
}

impl Ingredient {
    /// 创建追踪库存的原料
    pub fn tracked(id: &str, name: &str, unit: StockUnit, quantity: f64) -> Self {
        Self {
            ingredient_id: id.to_string(),
            name: name.to_string(),
            unit,
            stock: StockLevel::Tracked(quantity),
        }
    }

    /// 创建不限量原料
    pub fn untracked(id: &str, name: &str, unit: StockUnit) -> Self {
        Self {
            ingredient_id: id.to_string(),
            name: name.to_string(),
            unit,
            stock: StockLevel::Untracked,
        }
    }

    pub fn is_untracked(&self) -> bool {
        !self.stock.is_tracked()
    }
}
