//! Agent 接口与内置处理单元
//!
//! 所有处理单元实现 Agent trait（name / execute / execute_async），由
//! AgentRegistry 按名注册与查找。Agent 约定：内部失败自行捕获并通过
//! record_failure 写在返回副本上，绝不向兄弟分支抛出未捕获的故障；
//! 逃逸的 panic 由策略边界兜底转成分支故障。

pub mod collector;
#[cfg(feature = "harvest")]
pub mod harvest;
pub mod intake;
pub mod pattern;
pub mod registry;
pub mod scorer;
pub mod synthesize;

use async_trait::async_trait;

use crate::core::SharedState;

pub use registry::{builtin_registry, AgentRegistry};

/// 众所周知的 Agent 名称（执行计划按名接线）
pub mod names {
    /// 入口：参数归一化
    pub const INTAKE: &str = "intake";
    /// 汇聚：聚合摘要
    pub const SYNTHESIZE: &str = "synthesize";
    pub const PATTERN: &str = "pattern";
    pub const SCORER: &str = "scorer";
    pub const COLLECTOR: &str = "collector";
    /// 采集组（仅由 harvest 路由覆盖调用，不进入通用扇出）
    pub const FETCH: &str = "fetch";
    pub const SCRAPE: &str = "scrape";
}

/// 处理单元 trait：消费并返回 SharedState
///
/// 同步 execute 是契约本体；execute_async 语义完全一致，默认委托同步实现，
/// 真正有异步工作的 Agent（如 fetch）自行覆盖。
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent 名称（注册与计划接线用）
    fn name(&self) -> &str;

    /// 一句话描述
    fn description(&self) -> &str {
        ""
    }

    /// 执行：写 items / context / results / cost，这是唯一可观察输出
    fn execute(&self, state: SharedState) -> SharedState;

    /// 异步变体，语义与 execute 相同
    async fn execute_async(&self, state: SharedState) -> SharedState {
        self.execute(state)
    }
}
