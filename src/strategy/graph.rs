//! graph 策略：声明式 DAG 执行
//!
//! 用邻接表 + 入度表描述计划图：虚拟源节点对每个扇出成员各一条出边，
//! 每个成员一条入边进汇合节点。节点只有在全部前驱完成后才执行
//! （标准 DAG join）；每个成员由引擎递交 base 的独立副本，输出在汇合
//! 节点由共享合并器归并，之后才轮到汇聚 Agent。

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::task::JoinSet;

use crate::agents::Agent;
use crate::core::SharedState;
use crate::strategy::{
    panic_message, BranchOutcome, FanoutResult, FanoutStrategy, ResultMerger,
};

type NodeId = String;

/// 虚拟源 / 汇合节点名（不会与 Agent 名冲突的保留名）
const SOURCE: &str = "__source";
const JOIN: &str = "__join";

/// 计划图：任务 ID -> 后继列表 与 未完成前驱计数
pub(crate) struct PlanGraph {
    adjacency: HashMap<NodeId, Vec<NodeId>>,
    in_degree: HashMap<NodeId, usize>,
}

impl PlanGraph {
    pub(crate) fn new(members: &[String]) -> Self {
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();

        in_degree.insert(SOURCE.to_string(), 0);
        in_degree.insert(JOIN.to_string(), 0);
        adjacency.insert(SOURCE.to_string(), Vec::new());
        adjacency.insert(JOIN.to_string(), Vec::new());

        if members.is_empty() {
            // 退化图：源直接汇合
            adjacency
                .entry(SOURCE.to_string())
                .or_default()
                .push(JOIN.to_string());
            *in_degree.entry(JOIN.to_string()).or_insert(0) += 1;
            return Self { adjacency, in_degree };
        }

        for member in members {
            adjacency
                .entry(SOURCE.to_string())
                .or_default()
                .push(member.clone());
            in_degree.insert(member.clone(), 1);

            adjacency
                .entry(member.clone())
                .or_default()
                .push(JOIN.to_string());
            *in_degree.entry(JOIN.to_string()).or_insert(0) += 1;
        }

        Self { adjacency, in_degree }
    }

    /// 入度为 0 且尚未启动的节点
    pub(crate) fn ready(&self, started: &HashSet<NodeId>) -> Vec<NodeId> {
        self.in_degree
            .iter()
            .filter(|(node, degree)| **degree == 0 && !started.contains(*node))
            .map(|(node, _)| node.clone())
            .collect()
    }

    /// 标记节点完成，返回因此而就绪的后继
    pub(crate) fn mark_done(&mut self, node: &str) -> Vec<NodeId> {
        let mut newly_ready = Vec::new();
        if let Some(successors) = self.adjacency.get(node).cloned() {
            for next in successors {
                if let Some(degree) = self.in_degree.get_mut(&next) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        newly_ready.push(next);
                    }
                }
            }
        }
        newly_ready
    }
}

pub struct GraphStrategy;

#[async_trait]
impl FanoutStrategy for GraphStrategy {
    fn name(&self) -> &'static str {
        "graph"
    }

    async fn run_fanout(
        &self,
        agents: Vec<Arc<dyn Agent>>,
        base: SharedState,
        merger: &ResultMerger,
    ) -> FanoutResult {
        let members: Vec<String> = agents.iter().map(|a| a.name().to_string()).collect();
        let by_name: HashMap<String, Arc<dyn Agent>> = agents
            .into_iter()
            .map(|a| (a.name().to_string(), a))
            .collect();

        let mut graph = PlanGraph::new(&members);
        let mut started: HashSet<NodeId> = HashSet::new();
        let mut join_set: JoinSet<BranchOutcome> = JoinSet::new();
        let mut outcomes: Vec<BranchOutcome> = Vec::new();

        // 源节点：本身无工作，完成后把 base 的独立副本递给每个就绪后继
        for node in graph.ready(&started) {
            started.insert(node.clone());
            if node == SOURCE {
                for next in graph.mark_done(SOURCE) {
                    if next == JOIN {
                        continue; // 退化图：无成员
                    }
                    started.insert(next.clone());
                    if let Some(agent) = by_name.get(&next) {
                        let agent = Arc::clone(agent);
                        let snapshot = base.clone();
                        let name = next.clone();
                        join_set.spawn(async move {
                            match AssertUnwindSafe(agent.execute_async(snapshot))
                                .catch_unwind()
                                .await
                            {
                                Ok(state) => BranchOutcome::Done { agent: name, state },
                                Err(payload) => BranchOutcome::Fault {
                                    agent: name,
                                    error: panic_message(payload),
                                },
                            }
                        });
                    }
                }
            }
        }

        // 完成顺序收集；每个成员完成都会推进汇合节点的入度
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => {
                    graph.mark_done(outcome.agent());
                    outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::error!("graph node failed to join: {e}");
                }
            }
        }

        // 汇合节点就绪（全部前驱完成），执行引擎自己的合并步骤
        merger.merge(base, outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_construction_in_degrees() {
        let members = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let graph = PlanGraph::new(&members);
        assert_eq!(graph.in_degree.get(SOURCE), Some(&0));
        assert_eq!(graph.in_degree.get("a"), Some(&1));
        assert_eq!(graph.in_degree.get(JOIN), Some(&3));
    }

    #[test]
    fn test_ready_progression_source_to_join() {
        let members = vec!["a".to_string(), "b".to_string()];
        let mut graph = PlanGraph::new(&members);
        let started = HashSet::new();

        let ready = graph.ready(&started);
        assert_eq!(ready, vec![SOURCE.to_string()]);

        let mut newly = graph.mark_done(SOURCE);
        newly.sort();
        assert_eq!(newly, vec!["a".to_string(), "b".to_string()]);

        assert!(graph.mark_done("a").is_empty());
        assert_eq!(graph.mark_done("b"), vec![JOIN.to_string()]);
    }

    #[test]
    fn test_degenerate_graph_without_members() {
        let mut graph = PlanGraph::new(&[]);
        assert_eq!(graph.mark_done(SOURCE), vec![JOIN.to_string()]);
    }
}
