// ==========================================
// 烘焙运营管理系统 - 单位归一化
// ==========================================
// 职责: 克重 → 原料库存单位
// 说明: 无法识别的单位在读边界 (StockUnit::from_str) 已被拒绝，
//       此处只接受已识别的枚举值
// ==========================================

use crate::domain::types::StockUnit;

/// 每千克克数
pub const GRAMS_PER_KILOGRAM: f64 = 1000.0;

/// 将克重换算为库存单位数量
///
/// - Kilogram: 除以 1000
/// - Gram: 原样返回
pub fn to_stock_unit(weight_g: f64, unit: StockUnit) -> f64 {
    match unit {
        StockUnit::Kilogram => weight_g / GRAMS_PER_KILOGRAM,
        StockUnit::Gram => weight_g,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kilogram_conversion() {
        assert_eq!(to_stock_unit(1500.0, StockUnit::Kilogram), 1.5);
        assert_eq!(to_stock_unit(0.0, StockUnit::Kilogram), 0.0);
    }

    #[test]
    fn test_gram_is_identity() {
        for x in [0.0, 1.0, 12.345_679, 2528.089_887, 1e9, -3.5] {
            assert_eq!(to_stock_unit(x, StockUnit::Gram), x);
        }
    }
}
