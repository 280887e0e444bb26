//! 执行计划：入口 / 扇出 / 汇聚接线与 context 合并规则
//!
//! 计划在编排器构建时生成一次（进程级，不按次运行重建）；扇出集合则是
//! (注册表内容, task.kind) 的纯函数，每次运行现算。context 键冲突不做
//! 隐式覆盖：计划携带显式的 per-key reducer 表，由合并器执行。

use std::collections::{HashMap, HashSet};

use crate::agents::{names, AgentRegistry};

/// context 键的合并规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextReducer {
    /// 后合并者覆盖（默认）
    Overwrite,
    /// 数组尾段拼接（累加键，如 sources / symbols）
    Concat,
    /// 数值取较大者（高水位键，如 max_score）
    Max,
}

/// 有 harvest 路由覆盖的任务 kind
pub const HARVEST_KIND: &str = "harvest";

/// 执行计划：一个入口节点、运行时算出的扇出集合、一个汇聚节点、一个终点
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub entry: String,
    pub converge: String,
    /// 永不进入通用扇出的名称：入口、汇聚自身，及只走路由覆盖的采集组
    pub excluded: HashSet<String>,
    reducers: HashMap<String, ContextReducer>,
}

impl ExecutionPlan {
    /// 标准接线：intake -> 扇出 -> synthesize，采集组排除在通用扇出之外
    pub fn standard() -> Self {
        let mut excluded = HashSet::new();
        excluded.insert(names::INTAKE.to_string());
        excluded.insert(names::SYNTHESIZE.to_string());
        excluded.insert(names::FETCH.to_string());
        excluded.insert(names::SCRAPE.to_string());

        let mut reducers = HashMap::new();
        reducers.insert("sources".to_string(), ContextReducer::Concat);
        reducers.insert("symbols".to_string(), ContextReducer::Concat);
        reducers.insert("warnings".to_string(), ContextReducer::Concat);
        reducers.insert("max_score".to_string(), ContextReducer::Max);

        Self {
            entry: names::INTAKE.to_string(),
            converge: names::SYNTHESIZE.to_string(),
            excluded,
            reducers,
        }
    }

    /// 通用扇出集合：已注册且未被排除的全部 Agent（排序保证派发顺序稳定；
    /// 完成顺序仍由运行时决定）。(registry, kind) 的纯函数。
    pub fn fanout_for(&self, registry: &AgentRegistry, kind: &str) -> Vec<String> {
        // kind 目前不改变通用扇出的成员，但保留在签名里：路由覆盖
        // （is_harvest）与未来按 kind 的裁剪都从这里走
        let _ = kind;
        registry
            .names()
            .into_iter()
            .filter(|name| !self.excluded.contains(name))
            .collect()
    }

    /// harvest 路由覆盖的专用并行组（注册了谁就用谁）
    pub fn harvest_group(&self, registry: &AgentRegistry) -> Vec<String> {
        [names::FETCH, names::SCRAPE]
            .iter()
            .filter(|name| registry.contains(name))
            .map(|name| name.to_string())
            .collect()
    }

    /// 此 kind 是否绕过通用扇出、直接路由到采集组
    pub fn is_harvest(&self, kind: &str) -> bool {
        kind == HARVEST_KIND
    }

    pub fn reducer_for(&self, key: &str) -> ContextReducer {
        self.reducers
            .get(key)
            .copied()
            .unwrap_or(ContextReducer::Overwrite)
    }

    /// reducer 表快照（合并器持有自己的副本）
    pub fn reducers(&self) -> HashMap<String, ContextReducer> {
        self.reducers.clone()
    }

    /// 覆盖或追加某个键的合并规则
    pub fn set_reducer(&mut self, key: impl Into<String>, reducer: ContextReducer) {
        self.reducers.insert(key.into(), reducer);
    }
}
