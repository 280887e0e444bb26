//! 编排器构建器：显式构造 + 依赖注入
//!
//! 注册表、检查点存储、账本、观测汇都可注入（测试给 fake，进程间不共享
//! 任何全局单例）；未注入的部分按配置给默认实现。

use std::sync::Arc;

use crate::agents::{builtin_registry, AgentRegistry};
use crate::config::AppConfig;
use crate::core::plan::ExecutionPlan;
use crate::core::Orchestrator;
use crate::observability::ObservationSink;
use crate::store::{CheckpointStore, CostLedger, MemoryCheckpointStore, SqliteCheckpointStore};
use crate::strategy::{FanoutStrategy, StrategyKind};

pub struct OrchestratorBuilder {
    config: AppConfig,
    registry: Option<AgentRegistry>,
    plan: Option<ExecutionPlan>,
    strategy: Option<Arc<dyn FanoutStrategy>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    ledger: Option<Arc<CostLedger>>,
    observations: Option<Arc<ObservationSink>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            registry: None,
            plan: None,
            strategy: None,
            checkpoints: None,
            ledger: None,
            observations: None,
        }
    }

    /// 注入自定义注册表（测试 mock 的主要入口）
    pub fn with_registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_plan(mut self, plan: ExecutionPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn FanoutStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_strategy_kind(mut self, kind: StrategyKind) -> Self {
        self.strategy = Some(kind.build());
        self
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<CostLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_observations(mut self, observations: Arc<ObservationSink>) -> Self {
        self.observations = Some(observations);
        self
    }

    /// 组装编排器。SQLite 打不开时退回内存存储（尽力而为的持久性），
    /// 构建本身不失败。
    pub fn build(self) -> Orchestrator {
        let cfg = self.config;

        let registry = self
            .registry
            .unwrap_or_else(|| builtin_registry(&cfg));

        let plan = self.plan.unwrap_or_else(ExecutionPlan::standard);

        let strategy = self
            .strategy
            .unwrap_or_else(|| StrategyKind::parse(&cfg.orchestrator.strategy).build());

        let ttl = cfg.orchestrator.checkpoint_ttl_secs;
        let checkpoints: Arc<dyn CheckpointStore> = match self.checkpoints {
            Some(store) => store,
            None => match &cfg.app.checkpoint_db {
                Some(path) => match SqliteCheckpointStore::open(path, ttl) {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        tracing::warn!(
                            "checkpoint db open failed ({e}), falling back to in-memory store"
                        );
                        Arc::new(MemoryCheckpointStore::new(ttl))
                    }
                },
                None => Arc::new(MemoryCheckpointStore::new(ttl)),
            },
        };

        let ledger = self.ledger.unwrap_or_else(|| {
            Arc::new(CostLedger::new(cfg.budget.alert_threshold, cfg.budget.hard_cap))
        });

        let observations = self
            .observations
            .unwrap_or_else(|| Arc::new(ObservationSink::default()));

        tracing::info!(
            agents = registry.len(),
            "orchestrator built"
        );

        Orchestrator::new(registry.into(), plan, strategy, checkpoints, ledger, observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_defaults() {
        let orchestrator = OrchestratorBuilder::new(AppConfig::default()).build();
        assert!(orchestrator.registry().contains("intake"));
        assert!(orchestrator.registry().contains("synthesize"));
    }

    #[test]
    fn test_two_builders_share_no_state() {
        let a = OrchestratorBuilder::new(AppConfig::default()).build();
        let b = OrchestratorBuilder::new(AppConfig::default()).build();
        a.ledger().track("x", "op", 5.0, serde_json::json!({}));
        assert_eq!(b.ledger().period_total(), 0.0);
    }
}
