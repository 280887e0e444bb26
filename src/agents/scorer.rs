//! Scorer Agent：数值打分启发式
//!
//! 按文本长度与信号词密度给每个 item 打 0-1 分，最高分写入
//! context["max_score"]（高水位键，合并时取 Max）。

use serde_json::json;

use crate::agents::{names, Agent};
use crate::core::{AgentReport, SharedState};

const UNIT_COST: f64 = 0.0004;

/// 信号词（出现即加权）
const SIGNAL_WORDS: &[&str] = &["surge", "crash", "breakout", "merger", "earnings", "launch"];

pub struct ScorerAgent {
    signal_words: Vec<String>,
}

impl ScorerAgent {
    pub fn new() -> Self {
        Self {
            signal_words: SIGNAL_WORDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn score(&self, text: &str) -> f64 {
        let lower = text.to_lowercase();
        let hits = self
            .signal_words
            .iter()
            .filter(|w| lower.contains(w.as_str()))
            .count();
        let length_factor = (text.len() as f64 / 280.0).min(1.0);
        let signal_factor = (hits as f64 / 3.0).min(1.0);
        (0.4 * length_factor + 0.6 * signal_factor).clamp(0.0, 1.0)
    }
}

impl Default for ScorerAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for ScorerAgent {
    fn name(&self) -> &str {
        names::SCORER
    }

    fn description(&self) -> &str {
        "Score items by length and signal-word density"
    }

    fn execute(&self, mut state: SharedState) -> SharedState {
        let started = std::time::Instant::now();

        let scores: Vec<f64> = state
            .item_texts("text")
            .iter()
            .map(|t| self.score(t))
            .collect();
        let max_score = scores.iter().cloned().fold(0.0_f64, f64::max);
        let produced = scores.len();

        state.set_context("max_score", json!(max_score));
        state.push_context_list("sources", json!("scorer:heuristic"));

        state.record(
            AgentReport::ok(
                names::SCORER,
                format!("scored {} items, max {:.3}", produced, max_score),
            )
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
    fn test_signal_words_raise_score() {
        let agent = ScorerAgent::new();
        let dull = agent.score("nothing going on here");
        let hot = agent.score("earnings surge before the merger breakout");
        assert!(hot > dull);
    }

    #[test]
    fn test_scorer_writes_max_score_context() {
        let mut state = SharedState::new(Task::new("generic"));
        state.items.push(json!({ "text": "earnings surge incoming" }));
        state.items.push(json!({ "text": "quiet day" }));
        let state = ScorerAgent::new().execute(state);
        let max = state.context["max_score"].as_f64().unwrap();
        assert!(max > 0.0 && max <= 1.0);
        assert_eq!(state.results[0].produced, 2);
    }
}
