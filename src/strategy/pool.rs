//! pool 策略：有界工作线程扇出（graph 引擎不可用时的命令式回退）
//!
//! 作用域线程池按扇出成员数定容，每个工作线程先拿到 SharedState 的
//! 独立深拷贝再调用 Agent（隔离要求：绝不共享同一份 items / context /
//! results 容器）。工作线程通过 mpsc 通道按完成顺序上报；panic 在
//! 工作线程内捕获并转成分支故障，不取消也不阻塞其余线程。

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::Agent;
use crate::core::SharedState;
use crate::strategy::{
    panic_message, BranchOutcome, FanoutResult, FanoutStrategy, ResultMerger,
};

pub struct PoolStrategy;

/// 扇出本体：同步世界里的 scoped 线程 + 通道收集
fn pool_fanout(agents: Vec<Arc<dyn Agent>>, base: &SharedState) -> Vec<BranchOutcome> {
    let (tx, rx) = std::sync::mpsc::channel::<BranchOutcome>();

    std::thread::scope(|scope| {
        for agent in &agents {
            let tx = tx.clone();
            let agent = Arc::clone(agent);
            let snapshot = base.clone();
            scope.spawn(move || {
                let name = agent.name().to_string();
                let outcome =
                    match catch_unwind(AssertUnwindSafe(|| agent.execute(snapshot))) {
                        Ok(state) => BranchOutcome::Done { agent: name, state },
                        Err(payload) => BranchOutcome::Fault {
                            agent: name,
                            error: panic_message(payload),
                        },
                    };
                let _ = tx.send(outcome);
            });
        }
    });
    drop(tx);

    // scope 退出即全员汇合（屏障）；通道里是完成顺序
    rx.into_iter().collect()
}

#[async_trait]
impl FanoutStrategy for PoolStrategy {
    fn name(&self) -> &'static str {
        "pool"
    }

    async fn run_fanout(
        &self,
        agents: Vec<Arc<dyn Agent>>,
        base: SharedState,
        merger: &ResultMerger,
    ) -> FanoutResult {
        let pool_base = base.clone();
        let outcomes = match tokio::task::spawn_blocking(move || {
            pool_fanout(agents, &pool_base)
        })
        .await
        {
            Ok(outcomes) => outcomes,
            Err(e) => {
                tracing::error!("thread pool fan-out failed to join: {e}");
                Vec::new()
            }
        };

        merger.merge(base, outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AgentReport, Task};

    struct TagAgent(&'static str);

    impl Agent for TagAgent {
        fn name(&self) -> &str {
            self.0
        }

        fn execute(&self, mut state: SharedState) -> SharedState {
            state.record(AgentReport::ok(self.0, "tagged").with_cost(0.1));
            state
        }
    }

    struct PanicAgent;

    impl Agent for PanicAgent {
        fn name(&self) -> &str {
            "panicky"
        }

        fn execute(&self, _state: SharedState) -> SharedState {
            panic!("deliberate test panic");
        }
    }

    #[test]
    fn test_pool_fanout_isolates_and_collects_all() {
        let base = SharedState::new(Task::new("generic"));
        let agents: Vec<Arc<dyn Agent>> =
            vec![Arc::new(TagAgent("a")), Arc::new(TagAgent("b")), Arc::new(TagAgent("c"))];
        let outcomes = pool_fanout(agents, &base);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, BranchOutcome::Done { state, .. } if state.results.len() == 1)));
        // base 未被任何工作线程改动
        assert!(base.results.is_empty());
    }

    #[test]
    fn test_pool_fanout_catches_worker_panic() {
        let base = SharedState::new(Task::new("generic"));
        let agents: Vec<Arc<dyn Agent>> = vec![Arc::new(TagAgent("a")), Arc::new(PanicAgent)];
        let outcomes = pool_fanout(agents, &base);
        assert_eq!(outcomes.len(), 2);
        let faults = outcomes
            .iter()
            .filter(|o| matches!(o, BranchOutcome::Fault { .. }))
            .count();
        assert_eq!(faults, 1);
    }
}
