// ==========================================
// 烘焙运营管理系统 - 领域类型定义
// ==========================================
// 职责: 库存单位、库存水位、提交模式、运行状态
// 红线: 不限量原料不参与任何扣减
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 旧版库存表中"不限量/不追踪"原料的哨兵值（例如水）
///
/// 只在 schema 迁移时识别一次；迁移后由 ingredient.tracked 列表达，
/// 追踪原料的库存可以是任意值（包括 -1000）。
pub const LEGACY_UNLIMITED_STOCK_SENTINEL: f64 = -1000.0;

// ==========================================
// 库存单位 (Stock Unit)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockUnit {
    Kilogram, // 千克
    Gram,     // 克
}

impl StockUnit {
    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            StockUnit::Kilogram => "kg",
            StockUnit::Gram => "g",
        }
    }
}

impl fmt::Display for StockUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

/// 无法识别的库存单位
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("无法识别的库存单位: {0:?}")]
pub struct UnknownUnit(pub String);

impl FromStr for StockUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kg" | "kgs" | "kilogram" | "kilograms" => Ok(StockUnit::Kilogram),
            "g" | "gr" | "gram" | "grams" => Ok(StockUnit::Gram),
            _ => Err(UnknownUnit(s.to_string())),
        }
    }
}

// ==========================================
// 库存水位 (Stock Level)
// ==========================================
// 用显式状态替代 -1000 魔法数（库中对应 tracked 列）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "quantity", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockLevel {
    Tracked(f64), // 追踪库存（库存单位）
    Untracked,    // 不限量
}

impl StockLevel {
    /// 从数据库列 (tracked, quantity) 解析
    pub fn from_columns(tracked: bool, quantity: f64) -> Self {
        if tracked {
            StockLevel::Tracked(quantity)
        } else {
            StockLevel::Untracked
        }
    }

    /// 转换为数据库列 (tracked, quantity)；不限量原料数量列存 0
    pub fn to_columns(&self) -> (bool, f64) {
        match self {
            StockLevel::Tracked(q) => (true, *q),
            StockLevel::Untracked => (false, 0.0),
        }
    }

    pub fn is_tracked(&self) -> bool {
        matches!(self, StockLevel::Tracked(_))
    }
}

// ==========================================
// 结算提交模式 (Commit Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitMode {
    /// 单事务: 认领事件 + 写台账 + 扣减库存，恰好一次
    Atomic,
    /// 两阶段: 批量扣减后逐个标记，至少一次
    TwoPhase,
}

impl CommitMode {
    /// 从字符串解析，未知值回退到 ATOMIC
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "TWO_PHASE" => CommitMode::TwoPhase,
            _ => CommitMode::Atomic,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            CommitMode::Atomic => "ATOMIC",
            CommitMode::TwoPhase => "TWO_PHASE",
        }
    }
}

impl fmt::Display for CommitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 结算运行状态 (Run Status)
// ==========================================
// 供调用方展示"正在更新"提示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Idle,
    Running,
    Error(String),
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "IDLE"),
            RunStatus::Running => write!(f, "RUNNING"),
            RunStatus::Error(msg) => write!(f, "ERROR({})", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_unit_parse() {
        assert_eq!("kg".parse::<StockUnit>().unwrap(), StockUnit::Kilogram);
        assert_eq!(" Kilogram ".parse::<StockUnit>().unwrap(), StockUnit::Kilogram);
        assert_eq!("G".parse::<StockUnit>().unwrap(), StockUnit::Gram);
        assert_eq!("grams".parse::<StockUnit>().unwrap(), StockUnit::Gram);
        assert!("cups".parse::<StockUnit>().is_err());
        assert!("".parse::<StockUnit>().is_err());
    }

    #[test]
    fn test_stock_level_columns() {
        assert_eq!(StockLevel::from_columns(false, 0.0), StockLevel::Untracked);
        assert_eq!(StockLevel::from_columns(true, 12.5), StockLevel::Tracked(12.5));
        assert_eq!(StockLevel::Untracked.to_columns(), (false, 0.0));
        // 追踪原料恰好落在旧哨兵值上仍然是追踪状态
        assert_eq!(
            StockLevel::from_columns(true, LEGACY_UNLIMITED_STOCK_SENTINEL),
            StockLevel::Tracked(-1000.0)
        );
    }

    #[test]
    fn test_commit_mode_parse() {
        assert_eq!(CommitMode::from_str("two_phase"), CommitMode::TwoPhase);
        assert_eq!(CommitMode::from_str("ATOMIC"), CommitMode::Atomic);
        assert_eq!(CommitMode::from_str("garbage"), CommitMode::Atomic);
    }
}
