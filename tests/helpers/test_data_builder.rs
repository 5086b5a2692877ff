// ==========================================
// 测试数据构建器 - 用于集成测试
// ==========================================

use bakery_ops::domain::ingredient::Ingredient;
use bakery_ops::domain::recipe::{FormulaLine, Recipe};
use bakery_ops::domain::types::StockUnit;

// ==========================================
// 原料
// ==========================================

pub fn flour(stock_kg: f64) -> Ingredient {
    Ingredient::tracked("ING_FLOUR", "高筋面粉", StockUnit::Kilogram, stock_kg)
}

pub fn water() -> Ingredient {
    Ingredient::untracked("ING_WATER", "水", StockUnit::Gram)
}

pub fn salt(stock_g: f64) -> Ingredient {
    Ingredient::tracked("ING_SALT", "海盐", StockUnit::Gram, stock_g)
}

pub fn yeast(stock_g: f64) -> Ingredient {
    Ingredient::tracked("ING_YEAST", "干酵母", StockUnit::Gram, stock_g)
}

// ==========================================
// Recipe 构建器
// ==========================================

pub struct RecipeBuilder {
    recipe_id: String,
    name: String,
    dough_weight_g: f64,
    lines: Vec<FormulaLine>,
}

impl RecipeBuilder {
    pub fn new(recipe_id: &str) -> Self {
        Self {
            recipe_id: recipe_id.to_string(),
            name: recipe_id.to_string(),
            dough_weight_g: 1000.0,
            lines: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn dough_weight_g(mut self, grams: f64) -> Self {
        self.dough_weight_g = grams;
        self
    }

    pub fn line(mut self, ingredient: Ingredient, bakers_percent: f64) -> Self {
        let line_id = format!("{}-{}", self.recipe_id, self.lines.len() + 1);
        self.lines.push(FormulaLine {
            line_id,
            ingredient,
            bakers_percent,
        });
        self
    }

    pub fn build(self) -> Recipe {
        Recipe {
            recipe_id: self.recipe_id,
            name: self.name,
            dough_weight_g: self.dough_weight_g,
            lines: self.lines,
        }
    }
}

/// 酸面包: 900g, [面粉 100, 水 75, 盐 2, 酵母 1]，基数 178
pub fn sourdough(flour_kg: f64) -> Recipe {
    RecipeBuilder::new("R_SOURDOUGH")
        .name("酸面包")
        .dough_weight_g(900.0)
        .line(flour(flour_kg), 100.0)
        .line(water(), 75.0)
        .line(salt(1000.0), 2.0)
        .line(yeast(500.0), 1.0)
        .build()
}
