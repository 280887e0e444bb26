//! cooperative 策略：协作式异步扇出
//!
//! 每个 Agent 的同步 execute 包进 spawn_blocking，调用方协程永不被
//! 阻塞；全部包装调用一起入队、整批等待（gather 语义：等全员，不是
//! 先到先走）。包装内的 panic 以 JoinError 浮出并打成分支故障标签，
//! 单个 Agent 的故障不会中止批次。合并规则与 pool 策略完全一致。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{FuturesUnordered, StreamExt};

use crate::agents::Agent;
use crate::core::SharedState;
use crate::strategy::{
    panic_message, BranchOutcome, FanoutResult, FanoutStrategy, ResultMerger,
};

pub struct CooperativeStrategy;

#[async_trait]
impl FanoutStrategy for CooperativeStrategy {
    fn name(&self) -> &'static str {
        "cooperative"
    }

    async fn run_fanout(
        &self,
        agents: Vec<Arc<dyn Agent>>,
        base: SharedState,
        merger: &ResultMerger,
    ) -> FanoutResult {
        let mut pending = FuturesUnordered::new();

        for agent in agents {
            let snapshot = base.clone();
            let name = agent.name().to_string();
            pending.push(async move {
                match tokio::task::spawn_blocking(move || agent.execute(snapshot)).await {
                    Ok(state) => BranchOutcome::Done { agent: name, state },
                    Err(e) if e.is_panic() => BranchOutcome::Fault {
                        agent: name,
                        error: panic_message(e.into_panic()),
                    },
                    Err(e) => BranchOutcome::Fault {
                        agent: name,
                        error: e.to_string(),
                    },
                }
            });
        }

        // FuturesUnordered 按完成顺序产出，耗尽即屏障
        let mut outcomes = Vec::new();
        while let Some(outcome) = pending.next().await {
            outcomes.push(outcome);
        }

        merger.merge(base, outcomes)
    }
}
