//! 入口 Agent：参数归一化
//!
//! 把 task.params 里的输入（text 字符串 / items 数组）搬进 state.items，
//! 后续扇出 Agent 统一按 items 工作。入口总是单独运行（扇出前屏障）。

use serde_json::{json, Value};

use crate::agents::{names, Agent};
use crate::core::{AgentReport, SharedState};

const UNIT_COST: f64 = 0.0002;

pub struct IntakeAgent;

impl Agent for IntakeAgent {
    fn name(&self) -> &str {
        names::INTAKE
    }

    fn description(&self) -> &str {
        "Normalize task params into the working item set"
    }

    fn execute(&self, mut state: SharedState) -> SharedState {
        let started = std::time::Instant::now();
        let mut produced = 0usize;

        if let Some(Value::Array(items)) = state.task.param("items").cloned() {
            produced += items.len();
            state.items.extend(items);
        }

        if let Some(text) = state.task.param("text").and_then(|v| v.as_str()) {
            state.items.push(json!({ "text": text }));
            produced += 1;
        }

        state.set_context("kind", json!(state.task.kind.clone()));

        state.record(
            AgentReport::ok(names::INTAKE, format!("normalized {} input items", produced))
                .with_produced(produced)
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
    fn test_intake_moves_text_param_into_items() {
        let task = Task::new("generic").with_param("text", json!("hello colony"));
        let state = IntakeAgent.execute(SharedState::new(task));
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0]["text"], "hello colony");
        assert_eq!(state.results.len(), 1);
        assert!(state.cost > 0.0);
    }

    #[test]
    fn test_intake_extends_items_param() {
        let task = Task::new("generic")
            .with_param("items", json!([{"text": "a"}, {"text": "b"}]));
        let state = IntakeAgent.execute(SharedState::new(task));
        assert_eq!(state.items.len(), 2);
        assert_eq!(state.results[0].produced, 2);
    }
}
