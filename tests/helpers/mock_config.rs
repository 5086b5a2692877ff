// ==========================================
// Mock 配置实现 - 用于集成测试
// ==========================================

use async_trait::async_trait;
use bakery_ops::config::{ConfigResult, SettlementConfigReader};
use bakery_ops::domain::types::CommitMode;

/// Mock 配置结构
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub commit_mode: CommitMode,
    pub record_runs: bool,
    pub fail_commit_mode: bool,
}

impl MockConfig {
    /// 创建默认配置（原子提交 + 记录运行）
    pub fn default() -> Self {
        Self {
            commit_mode: CommitMode::Atomic,
            record_runs: true,
            fail_commit_mode: false,
        }
    }

    /// 两阶段提交配置
    pub fn two_phase() -> Self {
        let mut config = Self::default();
        config.commit_mode = CommitMode::TwoPhase;
        config
    }

    /// 不记录运行审计
    pub fn without_run_records() -> Self {
        let mut config = Self::default();
        config.record_runs = false;
        config
    }

    /// 配置读取失败
    pub fn broken() -> Self {
        let mut config = Self::default();
        config.fail_commit_mode = true;
        config
    }
}

#[async_trait]
impl SettlementConfigReader for MockConfig {
    async fn get_commit_mode(&self) -> ConfigResult<CommitMode> {
        if self.fail_commit_mode {
            return Err("config store unavailable".into());
        }
        Ok(self.commit_mode)
    }

    async fn get_record_runs(&self) -> ConfigResult<bool> {
        Ok(self.record_runs)
    }
}
