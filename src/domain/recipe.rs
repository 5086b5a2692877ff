// ==========================================
// 烘焙运营管理系统 - 配方领域模型
// ==========================================
// 配方以烘焙百分比 (baker's percentage) 表示
// 缩放基数 = 所有配方行百分比之和
// ==========================================

use crate::domain::ingredient::Ingredient;
use serde::{Deserialize, Serialize};

// ==========================================
// FormulaLine - 配方行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaLine {
    pub line_id: String,        // 配方行ID
    pub ingredient: Ingredient, // 引用的原料（含单位与库存）
    pub bakers_percent: f64,    // 烘焙百分比 (>= 0)
}

// ==========================================
// Recipe - 配方
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub recipe_id: String,
    pub name: String,
    pub dough_weight_g: f64, // 单批面团总重 (克, > 0)
    pub lines: Vec<FormulaLine>,
}

impl Recipe {
    /// 百分比基数（所有配方行百分比之和）
    pub fn percent_sum(&self) -> f64 {
        self.lines.iter().map(|l| l.bakers_percent).sum()
    }
}
