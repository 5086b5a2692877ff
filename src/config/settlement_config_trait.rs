// ==========================================
// 烘焙运营管理系统 - 结算配置读取 Trait
// ==========================================
// 职责: 定义结算引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::CommitMode;
use async_trait::async_trait;
use std::error::Error;

/// 配置读取结果
pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// SettlementConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait SettlementConfigReader: Send + Sync {
    /// 获取结算提交模式
    ///
    /// # 默认值
    /// - ATOMIC
    async fn get_commit_mode(&self) -> ConfigResult<CommitMode>;

    /// 是否写入 settlement_run 审计记录
    ///
    /// # 默认值
    /// - true
    async fn get_record_runs(&self) -> ConfigResult<bool>;
}
