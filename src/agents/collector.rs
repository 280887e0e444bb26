//! Collector Agent：关键词采集
//!
//! 采集类 Agent 的代表：从已有 items 的文本里挑出长词作为新 item 追加，
//! 演示「追加而非整体替换」的 items 写法（合并器按尾段拼接）。

use std::collections::BTreeSet;

use serde_json::json;

use crate::agents::{names, Agent};
use crate::core::{AgentReport, SharedState};

const UNIT_COST: f64 = 0.0003;
const MIN_KEYWORD_LEN: usize = 7;

pub struct CollectorAgent {
    min_len: usize,
}

impl CollectorAgent {
    pub fn new() -> Self {
        Self {
            min_len: MIN_KEYWORD_LEN,
        }
    }
}

impl Default for CollectorAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for CollectorAgent {
    fn name(&self) -> &str {
        names::COLLECTOR
    }

    fn description(&self) -> &str {
        "Harvest long keywords from item text as new items"
    }

    fn execute(&self, mut state: SharedState) -> SharedState {
        let started = std::time::Instant::now();

        // BTreeSet 去重并给出稳定顺序
        let keywords: BTreeSet<String> = state
            .item_texts("text")
            .iter()
            .flat_map(|t| t.split_whitespace())
            .filter(|w| w.len() >= self.min_len && w.chars().all(|c| c.is_alphanumeric()))
            .map(|w| w.to_lowercase())
            .collect();

        let produced = keywords.len();
        for kw in keywords {
            state.items.push(json!({ "keyword": kw }));
        }
        state.push_context_list("sources", json!("collector:keywords"));

        state.record(
            AgentReport::ok(names::COLLECTOR, format!("collected {} keywords", produced))
                .with_produced(produced)
                .with_cost(UNIT_COST)
                .with_elapsed_ms(started.elapsed().as_millis() as u64),
        );
        state
    }
}
