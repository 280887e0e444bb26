//! 扇出策略：三种可互换的执行引擎
//!
//! graph（声明式 DAG）、pool（有界工作线程）、cooperative（协作式异步）
//! 实现同一个 FanoutStrategy trait，共享同一个 ResultMerger，因此满足
//! 相同的合并与隔离契约：每个分支拿到 base 的独立深拷贝，合并只发生在
//! 批次屏障之后的单线程阶段。

pub mod cooperative;
pub mod graph;
pub mod merge;
pub mod pool;

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::Agent;
use crate::core::SharedState;

pub use cooperative::CooperativeStrategy;
pub use graph::GraphStrategy;
pub use merge::ResultMerger;
pub use pool::PoolStrategy;

/// 单个分支的类型化结果：成功携带分支状态，故障携带 Agent 名与错误串。
/// 用枚举替代「捕获一切异常」，失败路径可枚举。
#[derive(Debug)]
pub enum BranchOutcome {
    Done { agent: String, state: SharedState },
    Fault { agent: String, error: String },
}

impl BranchOutcome {
    pub fn agent(&self) -> &str {
        match self {
            BranchOutcome::Done { agent, .. } => agent,
            BranchOutcome::Fault { agent, .. } => agent,
        }
    }
}

/// 合并后的每分支摘要（观测与账本用）
#[derive(Debug, Clone)]
pub struct BranchNote {
    pub agent: String,
    pub ok: bool,
    pub error: Option<String>,
    /// 相对扇出前 base 的成本增量
    pub cost_delta: f64,
    pub elapsed_ms: u64,
}

/// 一次扇出批次的产物：合并后的规范状态 + 每分支摘要
#[derive(Debug)]
pub struct FanoutResult {
    pub state: SharedState,
    pub branches: Vec<BranchNote>,
}

/// 扇出策略 trait：接收扇出成员与扇出前的 base 状态，返回合并结果。
/// 批次是 gather 语义：等待全部成员完成，不支持取消与超时。
#[async_trait]
pub trait FanoutStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run_fanout(
        &self,
        agents: Vec<Arc<dyn Agent>>,
        base: SharedState,
        merger: &ResultMerger,
    ) -> FanoutResult;
}

/// 构建期选择的调度模型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Graph,
    Pool,
    Cooperative,
}

impl StrategyKind {
    /// 从配置串解析；未知值回落 graph 并告警
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "graph" => StrategyKind::Graph,
            "pool" => StrategyKind::Pool,
            "cooperative" | "async" => StrategyKind::Cooperative,
            other => {
                tracing::warn!("Unknown strategy '{}', falling back to graph", other);
                StrategyKind::Graph
            }
        }
    }

    pub fn build(self) -> Arc<dyn FanoutStrategy> {
        match self {
            StrategyKind::Graph => Arc::new(GraphStrategy),
            StrategyKind::Pool => Arc::new(PoolStrategy),
            StrategyKind::Cooperative => Arc::new(CooperativeStrategy),
        }
    }
}

/// 把 panic 载荷转成人类可读的错误串（pool 与异步兜底共用）
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "agent panicked".to_string()
    }
}
