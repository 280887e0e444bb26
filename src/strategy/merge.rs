//! 结果合并器
//!
//! 扇出屏障之后的单线程归并：results 按完成顺序尾段拼接、context 按
//! 计划的 per-key reducer 表裁决、cost 累加各分支增量。故障分支（策略
//! 捕获的 panic，或 Agent 自记的内部失败）只记日志与摘要，不进入合并，
//! 也绝不拖累兄弟分支。

use std::collections::HashMap;

use serde_json::Value;

use crate::core::plan::{ContextReducer, ExecutionPlan};
use crate::core::SharedState;
use crate::strategy::{BranchNote, BranchOutcome, FanoutResult};

pub struct ResultMerger {
    reducers: HashMap<String, ContextReducer>,
}

impl ResultMerger {
    pub fn new(reducers: HashMap<String, ContextReducer>) -> Self {
        Self { reducers }
    }

    pub fn from_plan(plan: &ExecutionPlan) -> Self {
        Self::new(plan.reducers())
    }

    fn reducer_for(&self, key: &str) -> ContextReducer {
        self.reducers
            .get(key)
            .copied()
            .unwrap_or(ContextReducer::Overwrite)
    }

    /// 归并一批分支结果。输入多少个 outcome 就产出多少条 BranchNote
    /// （屏障正确性：故障也占一席）。
    pub fn merge(&self, base: SharedState, outcomes: Vec<BranchOutcome>) -> FanoutResult {
        let base_results = base.results.len();
        let base_items = base.items.len();
        let base_cost = base.cost;
        let base_context = base.context.clone();

        let mut merged = base;
        let mut branches = Vec::with_capacity(outcomes.len());

        for outcome in outcomes {
            match outcome {
                BranchOutcome::Fault { agent, error } => {
                    tracing::warn!(agent = %agent, error = %error, "fan-out branch faulted");
                    branches.push(BranchNote {
                        agent,
                        ok: false,
                        error: Some(error),
                        cost_delta: 0.0,
                        elapsed_ms: 0,
                    });
                }
                BranchOutcome::Done { agent, state } => {
                    if let Some(error) = state.error.clone() {
                        // Agent 自记失败：按契约只影响本分支
                        tracing::warn!(agent = %agent, error = %error, "agent recorded internal failure");
                        branches.push(BranchNote {
                            agent,
                            ok: false,
                            error: Some(error),
                            cost_delta: 0.0,
                            elapsed_ms: 0,
                        });
                        continue;
                    }

                    let cost_delta = (state.cost - base_cost).max(0.0);
                    let appended = state.results.get(base_results..).unwrap_or(&[]);
                    let elapsed_ms = appended.iter().map(|r| r.elapsed_ms).max().unwrap_or(0);

                    self.merge_items(&mut merged, &state, base_items, &agent);
                    self.merge_context(&mut merged, &state, &base_context);
                    merged.results.extend_from_slice(appended);
                    merged.cost += cost_delta;

                    branches.push(BranchNote {
                        agent,
                        ok: true,
                        error: None,
                        cost_delta,
                        elapsed_ms,
                    });
                }
            }
        }

        FanoutResult {
            state: merged,
            branches,
        }
    }

    /// items：采集类分支追加的尾段拼接；整体替换（变短）按后写者赢并告警
    fn merge_items(
        &self,
        merged: &mut SharedState,
        branch: &SharedState,
        base_items: usize,
        agent: &str,
    ) {
        if branch.items.len() >= base_items {
            merged
                .items
                .extend_from_slice(&branch.items[base_items..]);
        } else {
            tracing::warn!(agent = %agent, "fan-out branch replaced items wholesale, last writer wins");
            merged.items = branch.items.clone();
        }
    }

    /// context：只归并分支真正改动过的键（与扇出前 base 比较），
    /// 避免后到分支用未改动的 base 值覆盖先到分支的归并成果
    fn merge_context(
        &self,
        merged: &mut SharedState,
        branch: &SharedState,
        base_context: &HashMap<String, Value>,
    ) {
        for (key, value) in &branch.context {
            if base_context.get(key) == Some(value) {
                continue;
            }
            match self.reducer_for(key) {
                ContextReducer::Overwrite => {
                    merged.context.insert(key.clone(), value.clone());
                }
                ContextReducer::Concat => match value {
                    Value::Array(branch_arr) => {
                        let base_len = base_context
                            .get(key)
                            .and_then(|v| v.as_array())
                            .map(|a| a.len())
                            .unwrap_or(0);
                        let tail = branch_arr[base_len.min(branch_arr.len())..].to_vec();
                        match merged.context.get_mut(key) {
                            Some(Value::Array(acc)) => acc.extend(tail),
                            _ => {
                                let mut acc = base_context
                                    .get(key)
                                    .and_then(|v| v.as_array())
                                    .cloned()
                                    .unwrap_or_default();
                                acc.extend(tail);
                                merged.context.insert(key.clone(), Value::Array(acc));
                            }
                        }
                    }
                    other => {
                        tracing::warn!(key = %key, "concat reducer on non-array value, overwriting");
                        merged.context.insert(key.clone(), other.clone());
                    }
                },
                ContextReducer::Max => {
                    let branch_num = value.as_f64();
                    let merged_num = merged.context.get(key).and_then(|v| v.as_f64());
                    match (branch_num, merged_num) {
                        (Some(b), Some(m)) if b <= m => {}
                        (Some(_), _) => {
                            merged.context.insert(key.clone(), value.clone());
                        }
                        (None, _) => {
                            tracing::warn!(key = %key, "max reducer on non-numeric value, overwriting");
                            merged.context.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
        }
    }
}
