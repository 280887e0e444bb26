//! 编排器：主流程
//!
//! 负责：任务 → 初始 SharedState → 运行前检查点 → 入口 Agent（单独）→
//! 扇出批次（构建期选定的策略）→ 合并 → 汇聚 Agent（单独）→ 终态 →
//! 检查点更新 → 记账 → 返回调用方。入口与汇聚两侧各有一道屏障，只有
//! 扇出集合并发执行；批次启动后不支持取消与超时。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::json;

use crate::agents::{Agent, AgentRegistry};
use crate::core::plan::ExecutionPlan;
use crate::core::{OrchestrateError, RunStatus, SharedState, Task};
use crate::observability::sink::events;
use crate::observability::ObservationSink;
use crate::store::{CheckpointStore, CostLedger};
use crate::strategy::{panic_message, BranchNote, FanoutStrategy, ResultMerger};

pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    plan: ExecutionPlan,
    strategy: Arc<dyn FanoutStrategy>,
    merger: ResultMerger,
    checkpoints: Arc<dyn CheckpointStore>,
    ledger: Arc<CostLedger>,
    observations: Arc<ObservationSink>,
}

impl Orchestrator {
    pub(crate) fn new(
        registry: Arc<AgentRegistry>,
        plan: ExecutionPlan,
        strategy: Arc<dyn FanoutStrategy>,
        checkpoints: Arc<dyn CheckpointStore>,
        ledger: Arc<CostLedger>,
        observations: Arc<ObservationSink>,
    ) -> Self {
        let merger = ResultMerger::from_plan(&plan);
        Self {
            registry,
            plan,
            strategy,
            merger,
            checkpoints,
            ledger,
            observations,
        }
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    pub fn observations(&self) -> &ObservationSink {
        &self.observations
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    /// 运行入口（异步）。调用方总是拿到带 status 的终态，绝不拿到未
    /// 处理的故障；失败时 error 携带人类可读的原因。
    pub async fn execute_async(&self, task: &Task) -> SharedState {
        let mut state = SharedState::new(task.clone());

        // 预算闸门：触顶只拦截新工作
        let (can_proceed, reason) = self.ledger.can_proceed();
        if !can_proceed {
            let reason = reason.unwrap_or_else(|| "budget exceeded".to_string());
            state.status = RunStatus::Failed;
            state.error = Some(OrchestrateError::BudgetExceeded(reason.clone()).to_string());
            self.observations.observe(
                events::RUN_REJECTED,
                json!({ "kind": task.kind, "reason": reason }),
                "orchestrator",
            );
            return state;
        }

        // 运行前快照（尽力而为：失败只告警）
        match self.checkpoints.save(task, &state).await {
            Ok(id) => state.checkpoint_ref = Some(id),
            Err(e) => tracing::warn!("checkpoint pre-save failed: {e}"),
        }

        state.status = RunStatus::Running;
        self.observations.observe(
            events::RUN_STARTED,
            json!({ "kind": task.kind, "strategy": self.strategy.name() }),
            "orchestrator",
        );

        let (mut state, outcome) = self.run_plan(state).await;
        match outcome {
            Ok(()) => {
                // 扇出分支的局部失败不算运行失败
                state.status = RunStatus::Completed;
                self.observations.observe(
                    events::RUN_COMPLETED,
                    json!({ "kind": task.kind, "cost": state.cost, "results": state.results.len() }),
                    "orchestrator",
                );
            }
            Err(e) => {
                state.status = RunStatus::Failed;
                state.error = Some(e.to_string());
                self.observations.observe(
                    events::RUN_FAILED,
                    json!({ "kind": task.kind, "error": e.to_string() }),
                    "orchestrator",
                );
            }
        }

        // 运行后快照：终态写回同一 run id
        if let Some(id) = state.checkpoint_ref.clone() {
            if let Err(e) = self.checkpoints.update(&id, &state).await {
                tracing::warn!("checkpoint post-update failed: {e}");
            }
        }

        state
    }

    /// 运行入口（同步变体，可观察结果与异步版一致）。
    /// 已在运行时内则 block_in_place，否则自建运行时。
    pub fn execute(&self, task: &Task) -> SharedState {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tokio::task::block_in_place(|| handle.block_on(self.execute_async(task)))
            }
            Err(_) => match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
                Ok(rt) => rt.block_on(self.execute_async(task)),
                Err(e) => {
                    let mut state = SharedState::new(task.clone());
                    state.status = RunStatus::Failed;
                    state.error = Some(format!("runtime build failed: {e}"));
                    state
                }
            },
        }
    }

    /// 定向调用：绕过执行计划，单跑一个 Agent
    pub async fn execute_single_agent(
        &self,
        name: &str,
        task: &Task,
    ) -> Result<SharedState, OrchestrateError> {
        let agent = self
            .registry
            .get(name)
            .ok_or_else(|| OrchestrateError::UnknownAgent(name.to_string()))?;

        let mut state = SharedState::new(task.clone());
        state.status = RunStatus::Running;
        let cost_before = state.cost;

        let mut state = match AssertUnwindSafe(agent.execute_async(state))
            .catch_unwind()
            .await
        {
            Ok(state) => state,
            Err(payload) => {
                let mut state = SharedState::new(task.clone());
                state.record_failure(name, panic_message(payload));
                state
            }
        };

        let ok = state.error.is_none();
        let delta = (state.cost - cost_before).max(0.0);
        state.status = if ok { RunStatus::Completed } else { RunStatus::Failed };

        self.ledger
            .track(name, &task.kind, delta, json!({ "direct": true }));
        self.observations
            .observe_agent(name, ok, delta, 0, state.error.as_deref());

        Ok(state)
    }

    /// 计划主体：入口屏障 → 扇出（含 harvest 路由覆盖）→ 汇聚屏障。
    /// 编排级故障通过 Err 翻转整次运行；分支级故障在批次内消化。
    async fn run_plan(
        &self,
        state: SharedState,
    ) -> (SharedState, Result<(), OrchestrateError>) {
        let kind = state.task.kind.clone();
        let entry = self.plan.entry.clone();
        let converge = self.plan.converge.clone();

        // 入口 Agent，单独运行
        let state = match self.run_barrier_agent(&entry, state).await {
            Ok(state) => state,
            Err((state, e)) => return (state, Err(e)),
        };

        // 扇出：harvest kind 先走专用采集组，产出了数据再进通用扇出
        let state = if self.plan.is_harvest(&kind) {
            let group = self.plan.harvest_group(&self.registry);
            if group.is_empty() {
                return (
                    state,
                    Err(OrchestrateError::Plan(
                        "harvest task but no harvest agents registered".to_string(),
                    )),
                );
            }
            let items_before = state.items.len();
            let state = self.run_batch(&group, state).await;
            if state.items.len() > items_before {
                let general = self.plan.fanout_for(&self.registry, &kind);
                self.run_batch(&general, state).await
            } else {
                tracing::info!("harvest group produced no items, skipping general fan-out");
                state
            }
        } else {
            let general = self.plan.fanout_for(&self.registry, &kind);
            self.run_batch(&general, state).await
        };

        // 汇聚 Agent，单独运行
        match self.run_barrier_agent(&converge, state).await {
            Ok(state) => (state, Ok(())),
            Err((state, e)) => (state, Err(e)),
        }
    }

    /// 屏障段的单 Agent 执行（入口 / 汇聚）。这里的故障属于编排级：
    /// 没有入口产物或汇聚产物，整次运行没有意义。
    async fn run_barrier_agent(
        &self,
        name: &str,
        state: SharedState,
    ) -> Result<SharedState, (SharedState, OrchestrateError)> {
        let agent = match self.registry.get(name) {
            Some(agent) => agent,
            None => {
                return Err((state, OrchestrateError::UnknownAgent(name.to_string())));
            }
        };

        let kind = state.task.kind.clone();
        let cost_before = state.cost;
        let fallback = state.clone();

        let state = match AssertUnwindSafe(agent.execute_async(state))
            .catch_unwind()
            .await
        {
            Ok(state) => state,
            Err(payload) => {
                let message = panic_message(payload);
                self.observations
                    .observe_agent(name, false, 0.0, 0, Some(&message));
                return Err((
                    fallback,
                    OrchestrateError::Plan(format!("agent '{name}' panicked: {message}")),
                ));
            }
        };

        if let Some(error) = state.error.clone() {
            self.observations
                .observe_agent(name, false, 0.0, 0, Some(&error));
            return Err((state, OrchestrateError::Plan(format!("agent '{name}' failed: {error}"))));
        }

        let delta = (state.cost - cost_before).max(0.0);
        let elapsed = state.results.last().map(|r| r.elapsed_ms).unwrap_or(0);
        self.ledger.track(name, &kind, delta, json!({ "phase": "barrier" }));
        self.observations.observe_agent(name, true, delta, elapsed, None);

        Ok(state)
    }

    /// 一个扇出批次：解析成员、交给策略执行并合并、记账与观测。
    /// 屏障正确性：策略对 N 个成员必产出 N 条分支摘要。
    async fn run_batch(&self, names: &[String], state: SharedState) -> SharedState {
        if names.is_empty() {
            return state;
        }

        let agents: Vec<Arc<dyn Agent>> = names
            .iter()
            .filter_map(|name| {
                let agent = self.registry.get(name);
                if agent.is_none() {
                    tracing::warn!(agent = %name, "fan-out member missing from registry, skipping");
                }
                agent
            })
            .collect();

        let kind = state.task.kind.clone();
        let expected = agents.len();
        let result = self
            .strategy
            .run_fanout(agents, state, &self.merger)
            .await;
        debug_assert_eq!(result.branches.len(), expected, "merge barrier lost a branch");

        for note in &result.branches {
            self.account_branch(&kind, note);
        }

        result.state
    }

    fn account_branch(&self, kind: &str, note: &BranchNote) {
        if note.ok {
            self.ledger.track(
                &note.agent,
                kind,
                note.cost_delta,
                json!({ "phase": "fanout", "strategy": self.strategy.name() }),
            );
        }
        self.observations.observe_agent(
            &note.agent,
            note.ok,
            note.cost_delta,
            note.elapsed_ms,
            note.error.as_deref(),
        );
    }
}
