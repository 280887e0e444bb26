//! Pattern Agent：文本符号提取
//!
//! 用正则从 items 的 text 字段里抽符号（$TSLA 式代码与全大写词），
//! 写入 context["symbols"] 累加键。提取规则是领域启发式，编排核心
//! 不关心其质量。

use serde_json::json;

use crate::agents::{names, Agent};
use crate::core::{AgentReport, SharedState};

const UNIT_COST: f64 = 0.0005;

/// 符号模式：$ 前缀代码 或 2-6 位全大写词
const SYMBOL_PATTERN: &str = r"\$[A-Z]{1,6}\b|\b[A-Z]{2,6}\b";

pub struct PatternAgent {
    pattern: String,
}

impl PatternAgent {
    pub fn new() -> Self {
        Self {
            pattern: SYMBOL_PATTERN.to_string(),
        }
    }
}

impl Default for PatternAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for PatternAgent {
    fn name(&self) -> &str {
        names::PATTERN
    }

    fn description(&self) -> &str {
        "Extract symbol-like tokens from item text"
    }

    fn execute(&self, mut state: SharedState) -> SharedState {
        let started = std::time::Instant::now();

        // 内部失败（编译失败的模式）走 record_failure，不向外抛
        let regex = match regex::Regex::new(&self.pattern) {
            Ok(r) => r,
            Err(e) => {
                state.record_failure(names::PATTERN, format!("bad symbol pattern: {e}"));
                return state;
            }
        };

        let mut symbols: Vec<String> = Vec::new();
        for text in state.item_texts("text") {
            for m in regex.find_iter(text) {
                let sym = m.as_str().to_string();
                if !symbols.contains(&sym) {
                    symbols.push(sym);
                }
            }
        }

        let produced = symbols.len();
        for sym in symbols {
            state.push_context_list("symbols", json!(sym));
        }
        state.push_context_list("sources", json!("pattern:text"));

        state.record(
            AgentReport::ok(names::PATTERN, format!("extracted {} symbols", produced))
                .with_produced(produced)
                .with_cost(UNIT_COST)
                .with_elapsed_ms(started.elapsed().as_millis() as u64),
        );
        state
    }
}
