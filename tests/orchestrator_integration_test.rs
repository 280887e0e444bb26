//! 编排器集成测试
//!
//! 用注入的 mock 注册表与存储验证编排契约：屏障正确性、故障隔离、
//! 成本单调、检查点终态、预算闸门、三策略等价。

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;

use colony::agents::{names, Agent, AgentRegistry};
use colony::config::AppConfig;
use colony::core::{AgentReport, OrchestrateError, RunStatus, SharedState};
use colony::observability::ObservationSink;
use colony::store::{CheckpointStore, CostLedger, MemoryCheckpointStore};
use colony::{Orchestrator, OrchestratorBuilder, StrategyKind, Task};

/// 固定产出一条报告与一个符号的桩 Agent
struct StubAgent {
    name: &'static str,
    cost: f64,
}

impl Agent for StubAgent {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, mut state: SharedState) -> SharedState {
        state.push_context_list("symbols", json!(self.name.to_uppercase()));
        state.record(
            AgentReport::ok(self.name, "stub work")
                .with_produced(1)
                .with_cost(self.cost)
                .with_elapsed_ms(1),
        );
        state
    }
}

/// 总是内部失败的 Agent（按契约自己捕获并记在返回副本上）
struct FaultyAgent;

impl Agent for FaultyAgent {
    fn name(&self) -> &str {
        "gamma"
    }

    fn execute(&self, mut state: SharedState) -> SharedState {
        state.record_failure("gamma", "simulated internal failure");
        state
    }
}

/// 入口 / 汇聚 / 三个扇出成员（gamma 总是失败）的注册表
fn mock_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register(StubAgent { name: names::INTAKE, cost: 0.01 });
    registry.register(StubAgent { name: names::SYNTHESIZE, cost: 0.01 });
    registry.register(StubAgent { name: "alpha", cost: 0.1 });
    registry.register(StubAgent { name: "beta", cost: 0.2 });
    registry.register(FaultyAgent);
    registry
}

fn build_orchestrator(kind: StrategyKind) -> Orchestrator {
    OrchestratorBuilder::new(AppConfig::default())
        .with_registry(mock_registry())
        .with_strategy_kind(kind)
        .build()
}

fn fanout_reports(state: &SharedState) -> Vec<&str> {
    state
        .results
        .iter()
        .map(|r| r.agent.as_str())
        .filter(|a| *a != names::INTAKE && *a != names::SYNTHESIZE)
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_faulting_branch_does_not_suppress_siblings() {
    for kind in [StrategyKind::Graph, StrategyKind::Pool, StrategyKind::Cooperative] {
        let orchestrator = build_orchestrator(kind);
        let state = orchestrator.execute_async(&Task::new("generic")).await;

        assert_eq!(state.status, RunStatus::Completed, "strategy {:?}", kind);
        let mut fanout: Vec<&str> = fanout_reports(&state);
        fanout.sort();
        // gamma 的失败报告不进合并；alpha / beta 完好
        assert_eq!(fanout, vec!["alpha", "beta"], "strategy {:?}", kind);
        assert!(state.error.is_none());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cost_is_monotonic() {
    let orchestrator = build_orchestrator(StrategyKind::Graph);
    let state = orchestrator.execute_async(&Task::new("generic")).await;
    // intake 0.01 + alpha 0.1 + beta 0.2 + synthesize 0.01
    assert!(state.cost >= 0.0);
    assert!((state.cost - 0.32).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_barrier_observes_every_branch() {
    let sink = Arc::new(ObservationSink::new(64));
    let orchestrator = OrchestratorBuilder::new(AppConfig::default())
        .with_registry(mock_registry())
        .with_strategy_kind(StrategyKind::Pool)
        .with_observations(sink.clone())
        .build();

    orchestrator.execute_async(&Task::new("generic")).await;

    let stats = sink.agent_stats();
    // 三个扇出成员都到达过合并屏障，故障也占一席
    for agent in ["alpha", "beta", "gamma"] {
        assert_eq!(stats[agent].executions, 1, "agent {agent}");
    }
    assert_eq!(stats["gamma"].faults, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_checkpoint_update_carries_terminal_status() {
    let store = Arc::new(MemoryCheckpointStore::new(86_400));
    let orchestrator = OrchestratorBuilder::new(AppConfig::default())
        .with_registry(mock_registry())
        .with_checkpoint_store(store.clone())
        .build();

    let state = orchestrator.execute_async(&Task::new("generic")).await;
    let id = state.checkpoint_ref.clone().expect("pre-save should set checkpoint_ref");

    let record = store.load(&id).await.unwrap().unwrap();
    assert!(record.state.status.is_terminal());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rerun_produces_distinct_checkpoint_ids() {
    let store = Arc::new(MemoryCheckpointStore::new(86_400));
    let orchestrator = OrchestratorBuilder::new(AppConfig::default())
        .with_registry(mock_registry())
        .with_checkpoint_store(store.clone())
        .build();

    let task = Task::new("generic");
    let a = orchestrator.execute_async(&task).await;
    let b = orchestrator.execute_async(&task).await;
    assert_ne!(a.checkpoint_ref, b.checkpoint_ref);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_expired_checkpoint_still_readable() {
    // ttl 0：立即过期，过期是建议性的，读取仍返回记录
    let store = Arc::new(MemoryCheckpointStore::new(0));
    let orchestrator = OrchestratorBuilder::new(AppConfig::default())
        .with_registry(mock_registry())
        .with_checkpoint_store(store.clone())
        .build();

    let state = orchestrator.execute_async(&Task::new("generic")).await;
    let id = state.checkpoint_ref.unwrap();

    let record = store.load(&id).await.unwrap().unwrap();
    assert!(record.is_expired(chrono::Utc::now().timestamp()));
    assert!(record.state.status.is_terminal());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_budget_cap_gates_subsequent_runs() {
    let ledger = Arc::new(CostLedger::new(0.2, 0.25));
    let orchestrator = OrchestratorBuilder::new(AppConfig::default())
        .with_registry(mock_registry())
        .with_ledger(ledger.clone())
        .build();

    // 第一轮正常跑完并把当期总额顶过硬上限
    let first = orchestrator.execute_async(&Task::new("generic")).await;
    assert_eq!(first.status, RunStatus::Completed);

    let (ok, reason) = ledger.can_proceed();
    assert!(!ok);
    assert!(reason.unwrap().contains("hard cap"));

    // 第二轮在入口就被拒绝
    let second = orchestrator.execute_async(&Task::new("generic")).await;
    assert_eq!(second.status, RunStatus::Failed);
    assert!(second.error.as_deref().unwrap().contains("Budget exceeded"));
    assert!(second.results.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_strategies_produce_equivalent_results() {
    let mut merged: Vec<(f64, BTreeSet<String>, Vec<String>)> = Vec::new();

    for kind in [StrategyKind::Graph, StrategyKind::Pool, StrategyKind::Cooperative] {
        let orchestrator = build_orchestrator(kind);
        let state = orchestrator.execute_async(&Task::new("generic")).await;
        assert_eq!(state.status, RunStatus::Completed);

        let symbols: BTreeSet<String> = state.context["symbols"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        let mut agents: Vec<String> =
            state.results.iter().map(|r| r.agent.clone()).collect();
        agents.sort();
        merged.push((state.cost, symbols, agents));
    }

    let (cost0, symbols0, agents0) = &merged[0];
    for (cost, symbols, agents) in &merged[1..] {
        assert!((cost - cost0).abs() < 1e-9);
        assert_eq!(symbols, symbols0);
        assert_eq!(agents, agents0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_execute_single_agent_bypasses_plan() {
    let orchestrator = build_orchestrator(StrategyKind::Graph);
    let state = orchestrator
        .execute_single_agent("alpha", &Task::new("generic"))
        .await
        .unwrap();

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.results.len(), 1);
    assert_eq!(state.results[0].agent, "alpha");
    // 计划没有参与：没有入口 / 汇聚报告，也没有检查点
    assert!(state.checkpoint_ref.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_execute_single_agent_unknown_name() {
    let orchestrator = build_orchestrator(StrategyKind::Graph);
    let err = orchestrator
        .execute_single_agent("nonexistent", &Task::new("generic"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrateError::UnknownAgent(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_harvest_kind_without_harvest_agents_fails_run() {
    // 默认构建不含采集组：harvest 路由覆盖找不到专用组属于计划错误
    let orchestrator = build_orchestrator(StrategyKind::Graph);
    let state = orchestrator.execute_async(&Task::new("harvest")).await;
    assert_eq!(state.status, RunStatus::Failed);
    assert!(state.error.as_deref().unwrap().contains("harvest"));
}

#[test]
fn test_sync_execute_outside_runtime_matches_async_semantics() {
    let orchestrator = build_orchestrator(StrategyKind::Cooperative);
    let state = orchestrator.execute(&Task::new("generic"));

    assert_eq!(state.status, RunStatus::Completed);
    let mut fanout = fanout_reports(&state);
    fanout.sort();
    assert_eq!(fanout, vec!["alpha", "beta"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_builtin_roster_end_to_end() {
    // 真实内置 Agent 走一遍：文本进、符号 / 评分 / 关键词出
    let orchestrator = OrchestratorBuilder::new(AppConfig::default()).build();
    let task = Task::new("generic").with_param(
        "text",
        json!("Breakout earnings surge: $TSLA overtakes NVDA in quarterly deliveries"),
    );
    let state = orchestrator.execute_async(&task).await;

    assert_eq!(state.status, RunStatus::Completed);
    assert!(state.cost > 0.0);
    assert!(state.context["symbols"].as_array().unwrap().len() >= 2);
    assert!(state.context["max_score"].as_f64().unwrap() > 0.0);
    assert!(state.context.get("summary").is_some());
    // intake + pattern + scorer + collector + synthesize
    assert_eq!(state.results.len(), 5);
}
