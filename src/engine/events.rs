// ==========================================
// 烘焙运营管理系统 - 引擎层事件发布
// ==========================================
// 职责: 定义结算通知发布 trait，实现依赖倒置
// 说明: Engine 层定义 trait，UI/刷新层实现适配器
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 结算通知类型
// ==========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementNoticeType {
    /// 库存已扣减
    InventoryDecremented,
    /// 事件已结算
    EventsSettled,
}

impl SettlementNoticeType {
    pub fn as_str(&self) -> &str {
        match self {
            SettlementNoticeType::InventoryDecremented => "InventoryDecremented",
            SettlementNoticeType::EventsSettled => "EventsSettled",
        }
    }
}

/// 结算通知
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementNotice {
    /// 运行 ID
    pub run_id: String,
    pub notice_type: SettlementNoticeType,
    /// 受影响的原料ID或事件ID
    pub affected_ids: Vec<String>,
}

impl SettlementNotice {
    pub fn inventory_decremented(run_id: &str, ingredient_ids: Vec<String>) -> Self {
        Self {
            run_id: run_id.to_string(),
            notice_type: SettlementNoticeType::InventoryDecremented,
            affected_ids: ingredient_ids,
        }
    }

    pub fn events_settled(run_id: &str, event_ids: Vec<String>) -> Self {
        Self {
            run_id: run_id.to_string(),
            notice_type: SettlementNoticeType::EventsSettled,
            affected_ids: event_ids,
        }
    }
}

// ==========================================
// 通知发布 Trait
// ==========================================

/// 结算通知发布者
///
/// 发布失败只记录日志，不影响已提交的结算。
pub trait SettlementEventPublisher: Send + Sync {
    fn publish(&self, notice: SettlementNotice) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 可选的发布者包装
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn SettlementEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn SettlementEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn publish(&self, notice: SettlementNotice) -> Result<(), Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(publisher) => publisher.publish(notice),
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过通知 - run_id={}, notice_type={}",
                    notice.run_id,
                    notice.notice_type.as_str()
                );
                Ok(())
            }
        }
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}
