//! Agent 能力注册表
//!
//! 启动时尝试实例化每个已知 Agent；可选依赖不可用的（feature 未开或配置
//! 关闭）直接跳过并记一条 info，不让启动失败。扇出集合是
//! (注册表内容, task.kind) 的纯函数，见 core::plan。

use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::{collector::CollectorAgent, intake::IntakeAgent, pattern::PatternAgent,
    scorer::ScorerAgent, synthesize::SynthesizeAgent, Agent};
use crate::config::AppConfig;

/// 按名称存储 Arc<dyn Agent>，支持 register / get / names / contains
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: impl Agent + 'static) {
        let name = agent.name().to_string();
        self.agents.insert(name, Arc::new(agent));
    }

    /// 共享所有权注册（测试注入 mock 时常用）
    pub fn register_arc(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.name().to_string(), agent);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// 已注册名称（排序后返回，保证调度顺序稳定）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// 构建内置 Agent 注册表（能力注册：可选 Agent 缺席不报错）
pub fn builtin_registry(cfg: &AppConfig) -> AgentRegistry {
    let mut registry = AgentRegistry::new();

    registry.register(IntakeAgent);
    registry.register(PatternAgent::new());
    registry.register(ScorerAgent::new());
    registry.register(CollectorAgent::new());
    registry.register(SynthesizeAgent);

    #[cfg(feature = "harvest")]
    if cfg.agents.enable_harvest {
        registry.register(crate::agents::harvest::FetchAgent::new(&cfg.agents.harvest));
        registry.register(crate::agents::harvest::ScrapeAgent::new(&cfg.agents.harvest));
        tracing::info!("Harvest agents registered (fetch, scrape)");
    } else {
        tracing::info!("Harvest agents disabled by config, skipping");
    }

    #[cfg(not(feature = "harvest"))]
    {
        let _ = &cfg.agents;
        tracing::info!("Harvest feature not compiled in, skipping fetch/scrape");
    }

    registry
}
