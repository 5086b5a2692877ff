// ==========================================
// 烘焙运营管理系统 - 结算编排器
// ==========================================
// 用途: 协调一次结算运行的完整流程
// 流程: 读取到期事件 → 聚合消耗 → 提交 → 记录运行 → 发布通知
// 约束: 同一引擎实例上的运行互斥（重叠调用直接拒绝）
// ==========================================

use crate::config::SettlementConfigReader;
use crate::domain::bake_event::{BakeEvent, RecipeRef};
use crate::domain::ingredient::Ingredient;
use crate::domain::settlement::{
    DecrementOutcome, SettlementOutcome, SettlementPreview, SettlementRunRecord, Shortfall,
    SkippedEntry,
};
use crate::domain::types::{RunStatus, StockLevel};
use crate::engine::aggregator::ConsumptionAggregator;
use crate::engine::committer::SettlementCommitter;
use crate::engine::events::{OptionalEventPublisher, SettlementEventPublisher, SettlementNotice};
use crate::engine::store::SettlementStore;
use crate::repository::error::RepositoryError;
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// SettlementError - 结算运行错误
// ==========================================
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("读取到期事件失败: {0}")]
    Fetch(#[source] RepositoryError),

    #[error("已有结算运行进行中")]
    AlreadyRunning,

    #[error("配置读取失败: {0}")]
    Config(String),
}

// ==========================================
// SettlementEngine - 结算编排器
// ==========================================
pub struct SettlementEngine<S, C>
where
    S: SettlementStore,
    C: SettlementConfigReader,
{
    store: Arc<S>,
    config: Arc<C>,
    aggregator: ConsumptionAggregator,
    committer: SettlementCommitter<S>,
    publisher: OptionalEventPublisher,
    status_tx: watch::Sender<RunStatus>,
    run_lock: Mutex<()>,
}

impl<S, C> SettlementEngine<S, C>
where
    S: SettlementStore,
    C: SettlementConfigReader,
{
    /// 创建新的编排器实例
    ///
    /// # 参数
    /// - store: 结算存储
    /// - config: 配置读取器
    pub fn new(store: Arc<S>, config: Arc<C>) -> Self {
        let (status_tx, _status_rx) = watch::channel(RunStatus::Idle);
        Self {
            aggregator: ConsumptionAggregator::new(),
            committer: SettlementCommitter::new(store.clone()),
            publisher: OptionalEventPublisher::none(),
            store,
            config,
            status_tx,
            run_lock: Mutex::new(()),
        }
    }

    /// 配置通知发布者
    pub fn with_publisher(mut self, publisher: Arc<dyn SettlementEventPublisher>) -> Self {
        self.publisher = OptionalEventPublisher::with_publisher(publisher);
        self
    }

    /// 当前运行状态
    pub fn status(&self) -> RunStatus {
        self.status_tx.borrow().clone()
    }

    /// 订阅运行状态变化（UI "正在更新" 提示）
    pub fn subscribe_status(&self) -> watch::Receiver<RunStatus> {
        self.status_tx.subscribe()
    }

    /// 执行一次结算
    ///
    /// # 参数
    /// - today: 结算基准日（事件日期严格早于该日才到期）
    ///
    /// # 返回
    /// - Ok(SettlementOutcome): 提交结果（扣减/标记失败已吸收在结果中）
    /// - Err(Fetch): 读取失败，本轮未发生任何写入
    /// - Err(AlreadyRunning): 同一引擎上已有运行
    #[instrument(skip(self))]
    pub async fn run(&self, today: NaiveDate) -> Result<SettlementOutcome, SettlementError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| SettlementError::AlreadyRunning)?;

        let run_id = Uuid::new_v4().to_string();
        let started_at = Local::now().naive_local();
        self.status_tx.send_replace(RunStatus::Running);
        info!(run_id = %run_id, "开始结算运行");

        // ==========================================
        // 步骤1: 读取配置
        // ==========================================
        let mode = match self.config.get_commit_mode().await {
            Ok(mode) => mode,
            Err(e) => {
                let err = SettlementError::Config(e.to_string());
                self.status_tx.send_replace(RunStatus::Error(err.to_string()));
                return Err(err);
            }
        };

        // ==========================================
        // 步骤2: 读取到期事件（失败则整轮中止，无写入）
        // ==========================================
        let batch = match self.store.fetch_due_events(today).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "读取到期事件失败，本轮中止");
                let err = SettlementError::Fetch(e);
                self.status_tx.send_replace(RunStatus::Error(err.to_string()));
                return Err(err);
            }
        };

        // ==========================================
        // 步骤3: 聚合
        // ==========================================
        let aggregation = self.aggregator.aggregate(&batch.events);

        // ==========================================
        // 步骤4: 提交
        // ==========================================
        let mut outcome = self.committer.commit(&run_id, &aggregation, mode).await;
        outcome.quarantined_count = batch.quarantined.len();

        // ==========================================
        // 步骤5: 运行审计
        // ==========================================
        let record_runs = self.config.get_record_runs().await.unwrap_or_else(|e| {
            warn!(error = %e, "读取 record_runs 配置失败，按默认开启");
            true
        });
        if record_runs {
            let skipped: Vec<&SkippedEntry> = aggregation
                .contributions
                .iter()
                .flat_map(|c| c.skipped.iter())
                .collect();
            let detail = json!({
                "today": today,
                "delta": outcome.delta,
                "decrement": outcome.decrement,
                "already_settled": outcome.already_settled_event_ids,
                "flag_failures": outcome.flag_failures,
                "skipped_entries": skipped,
                "quarantined": batch.quarantined,
            });
            let record = build_run_record(&outcome, started_at, Local::now().naive_local(), detail);
            if let Err(e) = self.store.record_run(&record).await {
                warn!(run_id = %run_id, error = %e, "运行审计写入失败");
            }
        }

        // ==========================================
        // 步骤6: 发布通知
        // ==========================================
        self.publish_notices(&outcome);

        if outcome.is_clean() {
            self.status_tx.send_replace(RunStatus::Idle);
        } else {
            self.status_tx.send_replace(RunStatus::Error(format!(
                "结算运行 {} 状态 {}",
                run_id,
                outcome.status_str()
            )));
        }

        info!(
            run_id = %run_id,
            status = outcome.status_str(),
            due_events = outcome.due_event_count,
            settled_events = outcome.settled_event_ids.len(),
            quarantined = outcome.quarantined_count,
            skipped_entries = outcome.skipped_entry_count,
            "结算运行完成"
        );
        Ok(outcome)
    }

    /// 预演（不写入）
    ///
    /// 额外报告库存不足的原料；库存不足不阻断真实结算。
    #[instrument(skip(self))]
    pub async fn preview(&self, today: NaiveDate) -> Result<SettlementPreview, SettlementError> {
        let batch = self
            .store
            .fetch_due_events(today)
            .await
            .map_err(SettlementError::Fetch)?;

        let aggregation = self.aggregator.aggregate(&batch.events);
        let ingredients = referenced_ingredients(&batch.events);

        let shortfalls: Vec<Shortfall> = aggregation
            .delta
            .iter()
            .filter_map(|(id, required)| {
                let ingredient = ingredients.get(id)?;
                match ingredient.stock {
                    StockLevel::Tracked(stocked) if stocked < required => Some(Shortfall {
                        ingredient_id: id.to_string(),
                        name: ingredient.name.clone(),
                        unit: ingredient.unit,
                        stocked,
                        required,
                    }),
                    _ => None,
                }
            })
            .collect();

        Ok(SettlementPreview {
            today,
            due_event_count: batch.events.len(),
            aggregation,
            shortfalls,
            quarantined: batch.quarantined,
        })
    }

    fn publish_notices(&self, outcome: &SettlementOutcome) {
        let mut notices = Vec::new();
        if matches!(outcome.decrement, DecrementOutcome::Applied { .. }) {
            let ids = outcome.delta.iter().map(|(id, _)| id.to_string()).collect();
            notices.push(SettlementNotice::inventory_decremented(&outcome.run_id, ids));
        }
        if !outcome.settled_event_ids.is_empty() {
            notices.push(SettlementNotice::events_settled(
                &outcome.run_id,
                outcome.settled_event_ids.clone(),
            ));
        }

        for notice in notices {
            let notice_type = notice.notice_type.as_str().to_string();
            if let Err(e) = self.publisher.publish(notice) {
                warn!(run_id = %outcome.run_id, notice_type = %notice_type, error = %e, "结算通知发布失败");
            }
        }
    }
}

/// 到期事件引用到的全部原料（按ID去重）
fn referenced_ingredients(events: &[BakeEvent]) -> BTreeMap<String, Ingredient> {
    let mut map = BTreeMap::new();
    for event in events {
        for entry in &event.entries {
            if let RecipeRef::Resolved(recipe) = &entry.recipe {
                for line in &recipe.lines {
                    map.entry(line.ingredient.ingredient_id.clone())
                        .or_insert_with(|| line.ingredient.clone());
                }
            }
        }
    }
    map
}

fn build_run_record(
    outcome: &SettlementOutcome,
    started_at: NaiveDateTime,
    finished_at: NaiveDateTime,
    detail: serde_json::Value,
) -> SettlementRunRecord {
    let settled = outcome.settled_event_ids.len();
    let failed = outcome
        .due_event_count
        .saturating_sub(settled + outcome.already_settled_event_ids.len());
    let decremented = match outcome.decrement {
        DecrementOutcome::Applied { ingredient_count } => ingredient_count,
        _ => 0,
    };

    SettlementRunRecord {
        run_id: outcome.run_id.clone(),
        started_at,
        finished_at,
        status: outcome.status_str().to_string(),
        commit_mode: outcome.commit_mode,
        due_events: outcome.due_event_count as i64,
        settled_events: settled as i64,
        failed_events: failed as i64,
        decremented_ingredients: decremented as i64,
        detail_json: Some(detail),
    }
}
