// ==========================================
// 烘焙运营管理系统 - 结算提交器
// ==========================================
// 两种提交模式:
// - TWO_PHASE: 一次批量扣减 → 逐个标记事件（至少一次）
//   * 扣减失败: 本轮不再标记任何事件，增量下次从未结算事件重算
//   * 单个标记失败: 记录日志，不影响其他事件
//   * 扣减后、标记前崩溃: 下次会重复扣减（已知弱点，见 ATOMIC）
// - ATOMIC: 单事务认领 + 台账 + 扣减（恰好一次）
// 红线: 扣减必须先于任何事件标记
// ==========================================

use crate::domain::settlement::{
    AggregationResult, DecrementOutcome, EventClaim, FlagFailure, SettlementDelta,
    SettlementOutcome,
};
use crate::domain::types::CommitMode;
use crate::engine::store::SettlementStore;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

// ==========================================
// SettlementCommitter - 结算提交器
// ==========================================
pub struct SettlementCommitter<S>
where
    S: SettlementStore,
{
    store: Arc<S>,
}

impl<S> SettlementCommitter<S>
where
    S: SettlementStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// 提交聚合结果
    ///
    /// # 参数
    /// - `run_id`: 本轮运行ID
    /// - `aggregation`: 聚合结果（每个到期事件对应一个 contribution）
    /// - `mode`: 提交模式
    ///
    /// # 返回
    /// 提交结果（失败被吸收进结果，不向上抛出）
    #[instrument(skip(self, aggregation, mode), fields(
        events_count = aggregation.contributions.len(),
        ingredients = aggregation.delta.len(),
        mode = %mode
    ))]
    pub async fn commit(
        &self,
        run_id: &str,
        aggregation: &AggregationResult,
        mode: CommitMode,
    ) -> SettlementOutcome {
        let mut outcome = SettlementOutcome {
            run_id: run_id.to_string(),
            commit_mode: mode,
            due_event_count: aggregation.contributions.len(),
            quarantined_count: 0,
            skipped_entry_count: aggregation.skipped_entry_count(),
            delta: SettlementDelta::new(),
            decrement: DecrementOutcome::NothingToDeduct,
            settled_event_ids: Vec::new(),
            already_settled_event_ids: Vec::new(),
            flag_failures: Vec::new(),
        };

        match mode {
            CommitMode::TwoPhase => self.commit_two_phase(aggregation, &mut outcome).await,
            CommitMode::Atomic => self.commit_atomic(run_id, aggregation, &mut outcome).await,
        }

        info!(
            run_id = %run_id,
            status = outcome.status_str(),
            settled = outcome.settled_event_ids.len(),
            already_settled = outcome.already_settled_event_ids.len(),
            flag_failures = outcome.flag_failures.len(),
            "结算提交完成"
        );
        outcome
    }

    async fn commit_two_phase(&self, aggregation: &AggregationResult, outcome: &mut SettlementOutcome) {
        outcome.delta = aggregation.delta.clone();

        // 步骤1: 一次批量扣减
        if !aggregation.delta.is_empty() {
            let pairs = aggregation.delta.to_pairs();
            match self.store.bulk_decrement(&pairs).await {
                Ok(()) => {
                    outcome.decrement = DecrementOutcome::Applied {
                        ingredient_count: pairs.len(),
                    };
                }
                Err(e) => {
                    error!(error = %e, ingredients = pairs.len(), "批量扣减失败，本轮不标记任何事件");
                    outcome.decrement = DecrementOutcome::Failed {
                        message: e.to_string(),
                    };
                    return;
                }
            }
        }

        // 步骤2: 逐个标记，互不阻塞
        for contribution in &aggregation.contributions {
            match self.store.mark_settled(&contribution.event_id).await {
                Ok(()) => outcome.settled_event_ids.push(contribution.event_id.clone()),
                Err(e) => {
                    warn!(event_id = %contribution.event_id, error = %e, "事件结算标记失败");
                    outcome.flag_failures.push(FlagFailure {
                        event_id: contribution.event_id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    async fn commit_atomic(
        &self,
        run_id: &str,
        aggregation: &AggregationResult,
        outcome: &mut SettlementOutcome,
    ) {
        if aggregation.contributions.is_empty() {
            return;
        }

        let claims: Vec<EventClaim> = aggregation
            .contributions
            .iter()
            .map(|c| EventClaim {
                event_id: c.event_id.clone(),
                delta: c.delta.clone(),
            })
            .collect();

        match self.store.settle_atomically(run_id, &claims).await {
            Ok(report) => {
                if !report.already_settled_event_ids.is_empty() {
                    warn!(
                        events = ?report.already_settled_event_ids,
                        "部分事件已被其他结算认领，跳过其扣减"
                    );
                }
                if !report.applied_delta.is_empty() {
                    outcome.decrement = DecrementOutcome::Applied {
                        ingredient_count: report.applied_delta.len(),
                    };
                }
                outcome.delta = report.applied_delta;
                outcome.settled_event_ids = report.claimed_event_ids;
                outcome.already_settled_event_ids = report.already_settled_event_ids;
            }
            Err(e) => {
                error!(error = %e, "原子结算事务失败，已整体回滚");
                outcome.delta = aggregation.delta.clone();
                outcome.decrement = DecrementOutcome::Failed {
                    message: e.to_string(),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::settlement::{
        AtomicSettleReport, DueEventBatch, EventContribution, SettlementRunRecord,
    };
    use crate::repository::error::{RepositoryError, RepositoryResult};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    // ==========================================
    // 内存存储桩
    // ==========================================

    #[derive(Default)]
    struct MemoryState {
        stock: HashMap<String, f64>,
        settled: HashSet<String>,
        calls: Vec<String>,
        fail_bulk: bool,
        fail_atomic: bool,
        fail_mark: HashSet<String>,
    }

    #[derive(Default)]
    struct MemoryStore {
        state: Mutex<MemoryState>,
    }

    impl MemoryStore {
        fn with_stock(items: &[(&str, f64)]) -> Self {
            let store = MemoryStore::default();
            {
                let mut s = store.state.lock().unwrap();
                for (id, q) in items {
                    s.stock.insert(id.to_string(), *q);
                }
            }
            store
        }
    }

    #[async_trait]
    impl SettlementStore for MemoryStore {
        async fn fetch_due_events(&self, _today: NaiveDate) -> RepositoryResult<DueEventBatch> {
            Ok(DueEventBatch::default())
        }

        async fn bulk_decrement(&self, deltas: &[(String, f64)]) -> RepositoryResult<()> {
            let mut s = self.state.lock().unwrap();
            s.calls.push("bulk".to_string());
            if s.fail_bulk {
                return Err(RepositoryError::DatabaseQueryError("bulk down".to_string()));
            }
            for (id, q) in deltas {
                *s.stock.entry(id.clone()).or_insert(0.0) -= q;
            }
            Ok(())
        }

        async fn mark_settled(&self, event_id: &str) -> RepositoryResult<()> {
            let mut s = self.state.lock().unwrap();
            s.calls.push(format!("mark:{}", event_id));
            if s.fail_mark.contains(event_id) {
                return Err(RepositoryError::DatabaseQueryError("flag down".to_string()));
            }
            s.settled.insert(event_id.to_string());
            Ok(())
        }

        async fn settle_atomically(
            &self,
            _run_id: &str,
            claims: &[EventClaim],
        ) -> RepositoryResult<AtomicSettleReport> {
            let mut s = self.state.lock().unwrap();
            s.calls.push("atomic".to_string());
            if s.fail_atomic {
                return Err(RepositoryError::DatabaseTransactionError("tx down".to_string()));
            }
            let mut report = AtomicSettleReport::default();
            for claim in claims {
                if !s.settled.insert(claim.event_id.clone()) {
                    report.already_settled_event_ids.push(claim.event_id.clone());
                    continue;
                }
                report.claimed_event_ids.push(claim.event_id.clone());
                report.applied_delta.merge(&claim.delta);
            }
            for (id, q) in report.applied_delta.iter() {
                *s.stock.entry(id.to_string()).or_insert(0.0) -= q;
            }
            Ok(report)
        }

        async fn record_run(&self, _record: &SettlementRunRecord) -> RepositoryResult<()> {
            Ok(())
        }
    }

    fn contribution(event_id: &str, items: &[(&str, f64)]) -> EventContribution {
        let mut delta = SettlementDelta::new();
        for (id, q) in items {
            delta.add(id, *q);
        }
        EventContribution {
            event_id: event_id.to_string(),
            delta,
            skipped: Vec::new(),
        }
    }

    fn aggregation(contributions: Vec<EventContribution>) -> AggregationResult {
        let mut result = AggregationResult::default();
        for c in contributions {
            result.delta.merge(&c.delta);
            result.contributions.push(c);
        }
        result
    }

    // ==========================================
    // TWO_PHASE
    // ==========================================

    #[tokio::test]
    async fn test_two_phase_decrements_once_then_flags_each_event() {
        let store = Arc::new(MemoryStore::with_stock(&[("flour", 10.0), ("salt", 500.0)]));
        let committer = SettlementCommitter::new(store.clone());
        let agg = aggregation(vec![
            contribution("E1", &[("flour", 1.0), ("salt", 20.0)]),
            contribution("E2", &[("flour", 2.0)]),
        ]);

        let outcome = committer.commit("RUN1", &agg, CommitMode::TwoPhase).await;

        assert!(outcome.is_clean());
        assert_eq!(outcome.decrement, DecrementOutcome::Applied { ingredient_count: 2 });
        assert_eq!(outcome.settled_event_ids, vec!["E1", "E2"]);

        let s = store.state.lock().unwrap();
        assert_eq!(s.calls, vec!["bulk", "mark:E1", "mark:E2"]);
        assert_eq!(s.stock["flour"], 7.0);
        assert_eq!(s.stock["salt"], 480.0);
    }

    #[tokio::test]
    async fn test_two_phase_bulk_failure_stops_all_flags() {
        let store = Arc::new(MemoryStore::default());
        store.state.lock().unwrap().fail_bulk = true;
        let committer = SettlementCommitter::new(store.clone());
        let agg = aggregation(vec![contribution("E1", &[("flour", 1.0)])]);

        let outcome = committer.commit("RUN1", &agg, CommitMode::TwoPhase).await;

        assert!(matches!(outcome.decrement, DecrementOutcome::Failed { .. }));
        assert!(outcome.settled_event_ids.is_empty());
        assert_eq!(outcome.status_str(), "FAILED");
        let s = store.state.lock().unwrap();
        assert_eq!(s.calls, vec!["bulk"]);
        assert!(s.settled.is_empty());
    }

    #[tokio::test]
    async fn test_two_phase_flag_failure_does_not_block_others() {
        let store = Arc::new(MemoryStore::default());
        store.state.lock().unwrap().fail_mark.insert("E2".to_string());
        let committer = SettlementCommitter::new(store.clone());
        let agg = aggregation(vec![
            contribution("E1", &[("flour", 1.0)]),
            contribution("E2", &[("flour", 1.0)]),
            contribution("E3", &[("flour", 1.0)]),
        ]);

        let outcome = committer.commit("RUN1", &agg, CommitMode::TwoPhase).await;

        assert_eq!(outcome.settled_event_ids, vec!["E1", "E3"]);
        assert_eq!(outcome.flag_failures.len(), 1);
        assert_eq!(outcome.flag_failures[0].event_id, "E2");
        assert_eq!(outcome.status_str(), "PARTIAL");
    }

    #[tokio::test]
    async fn test_two_phase_empty_delta_skips_bulk_but_flags_events() {
        let store = Arc::new(MemoryStore::default());
        let committer = SettlementCommitter::new(store.clone());
        let agg = aggregation(vec![contribution("E_EMPTY", &[])]);

        let outcome = committer.commit("RUN1", &agg, CommitMode::TwoPhase).await;

        assert_eq!(outcome.decrement, DecrementOutcome::NothingToDeduct);
        assert_eq!(outcome.settled_event_ids, vec!["E_EMPTY"]);
        assert_eq!(store.state.lock().unwrap().calls, vec!["mark:E_EMPTY"]);
    }

    // ==========================================
    // ATOMIC
    // ==========================================

    #[tokio::test]
    async fn test_atomic_applies_claimed_contributions_only() {
        let store = Arc::new(MemoryStore::with_stock(&[("flour", 10.0)]));
        store.state.lock().unwrap().settled.insert("E2".to_string());
        let committer = SettlementCommitter::new(store.clone());
        let agg = aggregation(vec![
            contribution("E1", &[("flour", 1.0)]),
            contribution("E2", &[("flour", 4.0)]),
        ]);

        let outcome = committer.commit("RUN1", &agg, CommitMode::Atomic).await;

        assert!(outcome.is_clean());
        assert_eq!(outcome.settled_event_ids, vec!["E1"]);
        assert_eq!(outcome.already_settled_event_ids, vec!["E2"]);
        assert_eq!(outcome.delta.get("flour"), Some(1.0));
        assert_eq!(store.state.lock().unwrap().stock["flour"], 9.0);
    }

    #[tokio::test]
    async fn test_atomic_failure_settles_nothing() {
        let store = Arc::new(MemoryStore::default());
        store.state.lock().unwrap().fail_atomic = true;
        let committer = SettlementCommitter::new(store.clone());
        let agg = aggregation(vec![contribution("E1", &[("flour", 1.0)])]);

        let outcome = committer.commit("RUN1", &agg, CommitMode::Atomic).await;

        assert!(matches!(outcome.decrement, DecrementOutcome::Failed { .. }));
        assert!(outcome.settled_event_ids.is_empty());
        assert!(store.state.lock().unwrap().settled.is_empty());
    }

    #[tokio::test]
    async fn test_atomic_no_events_is_noop() {
        let store = Arc::new(MemoryStore::default());
        let committer = SettlementCommitter::new(store.clone());

        let outcome = committer
            .commit("RUN1", &AggregationResult::default(), CommitMode::Atomic)
            .await;

        assert_eq!(outcome.due_event_count, 0);
        assert_eq!(outcome.decrement, DecrementOutcome::NothingToDeduct);
        assert!(store.state.lock().unwrap().calls.is_empty());
    }
}
