//! 编排错误类型
//!
//! 分支内的 Agent 故障不在此处：它们由策略边界捕获为 BranchOutcome::Fault，
//! 只影响自己的分支。这里只枚举会翻转整次运行 status 的编排级故障，
//! 以及软性拦截后续工作的预算超限。

use thiserror::Error;

/// 编排级错误（WorkflowFault / BudgetExceeded）
#[derive(Error, Debug)]
pub enum OrchestrateError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("Merge error: {0}")]
    Merge(String),

    /// 硬上限已触顶：不回滚在途工作，只拦截后续运行
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),
}

/// 持久化错误（检查点 / 账本落盘）：记日志即可，绝不升级为编排错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
