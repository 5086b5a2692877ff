// ==========================================
// 烘焙运营管理系统 - 烘焙百分比缩放引擎
// ==========================================
// 公式:
//   scale_factor = dough_weight_g / (percent_sum / 100)
//   weight_g     = (percent / 100) * scale_factor * multiplier
// 红线: 本阶段不做任何取整，全精度进入聚合
// ==========================================

use crate::domain::ingredient::Ingredient;
use crate::domain::recipe::Recipe;
use std::collections::BTreeMap;
use thiserror::Error;

/// 配方无法缩放
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScaleError {
    #[error("面团重量必须大于0: recipe_id={recipe_id}, dough_weight_g={dough_weight_g}")]
    NonPositiveDoughWeight { recipe_id: String, dough_weight_g: f64 },

    #[error("百分比基数必须大于0: recipe_id={recipe_id}, percent_sum={percent_sum}")]
    NonPositivePercentBasis { recipe_id: String, percent_sum: f64 },

    #[error("烘焙百分比不能为负: recipe_id={recipe_id}, line_id={line_id}, percent={percent}")]
    NegativePercent {
        recipe_id: String,
        line_id: String,
        percent: f64,
    },
}

/// 单行缩放结果
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledLine<'a> {
    pub ingredient: &'a Ingredient,
    pub weight_g: f64,
}

/// 配方缩放结果
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledRecipe<'a> {
    pub recipe_id: &'a str,
    pub scale_factor: f64,
    pub lines: Vec<ScaledLine<'a>>,
}

impl ScaledRecipe<'_> {
    /// 原料ID → 克重（同一原料出现多行时合并）
    pub fn weights_by_ingredient(&self) -> BTreeMap<String, f64> {
        let mut weights = BTreeMap::new();
        for line in &self.lines {
            *weights
                .entry(line.ingredient.ingredient_id.clone())
                .or_insert(0.0) += line.weight_g;
        }
        weights
    }

    pub fn total_weight_g(&self) -> f64 {
        self.lines.iter().map(|l| l.weight_g).sum()
    }
}

// ==========================================
// BakersPercentScaler - 缩放引擎
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct BakersPercentScaler {
    // 无状态引擎
}

impl BakersPercentScaler {
    pub fn new() -> Self {
        Self {}
    }

    /// 将配方按批数缩放为各原料绝对克重
    ///
    /// # 参数
    /// - `recipe`: 配方（面团重量 + 烘焙百分比）
    /// - `multiplier`: 烘焙批数
    ///
    /// # 返回
    /// - Ok(ScaledRecipe): 各配方行克重
    /// - Err(ScaleError): 面团重量或百分比基数 <= 0，或存在负百分比
    pub fn scale<'a>(
        &self,
        recipe: &'a Recipe,
        multiplier: u32,
    ) -> Result<ScaledRecipe<'a>, ScaleError> {
        // NaN 也视为不合法
        if recipe.dough_weight_g.is_nan() || recipe.dough_weight_g <= 0.0 {
            return Err(ScaleError::NonPositiveDoughWeight {
                recipe_id: recipe.recipe_id.clone(),
                dough_weight_g: recipe.dough_weight_g,
            });
        }

        if let Some(line) = recipe.lines.iter().find(|l| l.bakers_percent < 0.0) {
            return Err(ScaleError::NegativePercent {
                recipe_id: recipe.recipe_id.clone(),
                line_id: line.line_id.clone(),
                percent: line.bakers_percent,
            });
        }

        let percent_sum = recipe.percent_sum();
        if percent_sum.is_nan() || percent_sum <= 0.0 {
            return Err(ScaleError::NonPositivePercentBasis {
                recipe_id: recipe.recipe_id.clone(),
                percent_sum,
            });
        }

        let scale_factor = recipe.dough_weight_g / (percent_sum / 100.0);
        let multiplier = f64::from(multiplier);

        let lines = recipe
            .lines
            .iter()
            .map(|line| ScaledLine {
                ingredient: &line.ingredient,
                weight_g: (line.bakers_percent / 100.0) * scale_factor * multiplier,
            })
            .collect();

        Ok(ScaledRecipe {
            recipe_id: &recipe.recipe_id,
            scale_factor,
            lines,
        })
    }
}
