//! 汇聚 Agent：聚合摘要
//!
//! 扇出合并完成后单独运行，把本次运行的产出（items / 符号 / 最高分 /
//! 各分支报告）压成一条 context["summary"]。

use serde_json::json;

use crate::agents::{names, Agent};
use crate::core::{AgentReport, SharedState};

const UNIT_COST: f64 = 0.0002;

pub struct SynthesizeAgent;

impl Agent for SynthesizeAgent {
    fn name(&self) -> &str {
        names::SYNTHESIZE
    }

    fn description(&self) -> &str {
        "Fold the merged run output into a summary"
    }

    fn execute(&self, mut state: SharedState) -> SharedState {
        let started = std::time::Instant::now();

        let symbol_count = state
            .context
            .get("symbols")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0);
        let max_score = state
            .context
            .get("max_score")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let failed = state.results.iter().filter(|r| r.failed).count();

        state.set_context(
            "summary",
            json!({
                "items": state.items.len(),
                "symbols": symbol_count,
                "max_score": max_score,
                "reports": state.results.len(),
                "failed_reports": failed,
            }),
        );

        state.record(
            AgentReport::ok(
                names::SYNTHESIZE,
                format!(
                    "synthesized {} items / {} symbols into summary",
                    state.items.len(),
                    symbol_count
                ),
            )
            .with_cost(UNIT_COST)
            .with_elapsed_ms(started.elapsed().as_millis() as u64),
        );
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Task;

    #[test]
    fn test_synthesize_writes_summary() {
        let mut state = SharedState::new(Task::new("generic"));
        state.items.push(json!({ "text": "x" }));
        state.set_context("symbols", json!(["AAPL", "TSLA"]));
        state.set_context("max_score", json!(0.7));
        let state = SynthesizeAgent.execute(state);
        let summary = &state.context["summary"];
        assert_eq!(summary["items"], 1);
        assert_eq!(summary["symbols"], 2);
        assert_eq!(summary["max_score"], 0.7);
    }
}
