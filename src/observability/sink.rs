//! 观测事件汇
//!
//! observe 追加结构化、带时间戳的事件记录（运行内只增不删），滚动窗口
//! 保留最近 N 条原始事件，计数器长期累积。由此导出健康视图：成功率
//! （completed / total）、每 Agent 平均成本与耗时、最近事件切片。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 事件类型常量（计数器按这些值归类）
pub mod events {
    pub const RUN_STARTED: &str = "run_started";
    pub const RUN_COMPLETED: &str = "run_completed";
    pub const RUN_FAILED: &str = "run_failed";
    pub const RUN_REJECTED: &str = "run_rejected";
    pub const AGENT_COMPLETED: &str = "agent_completed";
    pub const AGENT_FAULTED: &str = "agent_faulted";
}

/// 单条观测记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    /// epoch 毫秒
    pub timestamp: i64,
    pub event_type: String,
    pub source: String,
    pub data: Value,
}

/// 每 Agent 聚合统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentStats {
    pub executions: u64,
    pub faults: u64,
    pub total_cost: f64,
    pub total_elapsed_ms: u64,
}

impl AgentStats {
    pub fn avg_cost(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.total_cost / self.executions as f64
        }
    }

    pub fn avg_elapsed_ms(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.total_elapsed_ms as f64 / self.executions as f64
        }
    }
}

struct SinkInner {
    window: VecDeque<Observation>,
    runs_completed: u64,
    runs_failed: u64,
    per_agent: HashMap<String, AgentStats>,
}

pub struct ObservationSink {
    window_size: usize,
    inner: Mutex<SinkInner>,
}

impl ObservationSink {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            inner: Mutex::new(SinkInner {
                window: VecDeque::new(),
                runs_completed: 0,
                runs_failed: 0,
                per_agent: HashMap::new(),
            }),
        }
    }

    /// 追加一条观测事件（纯追加，窗口满了只淘汰最旧的原始记录，计数器不回退）
    pub fn observe(&self, event_type: &str, data: Value, source: &str) {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        match event_type {
            events::RUN_COMPLETED => inner.runs_completed += 1,
            events::RUN_FAILED | events::RUN_REJECTED => inner.runs_failed += 1,
            _ => {}
        }

        if inner.window.len() == self.window_size {
            inner.window.pop_front();
        }
        inner.window.push_back(Observation {
            id: format!("obs_{}", uuid::Uuid::new_v4()),
            timestamp: chrono::Utc::now().timestamp_millis(),
            event_type: event_type.to_string(),
            source: source.to_string(),
            data,
        });
    }

    /// Agent 粒度的观测：更新聚合统计并追加事件
    pub fn observe_agent(&self, agent: &str, ok: bool, cost: f64, elapsed_ms: u64, error: Option<&str>) {
        {
            let mut inner = match self.inner.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            let stats = inner.per_agent.entry(agent.to_string()).or_default();
            stats.executions += 1;
            if ok {
                stats.total_cost += cost;
                stats.total_elapsed_ms += elapsed_ms;
            } else {
                stats.faults += 1;
            }
        }

        let (event_type, data) = if ok {
            (
                events::AGENT_COMPLETED,
                serde_json::json!({ "cost": cost, "elapsed_ms": elapsed_ms }),
            )
        } else {
            (
                events::AGENT_FAULTED,
                serde_json::json!({ "error": error.unwrap_or("unknown") }),
            )
        };
        self.observe(event_type, data, agent);
    }

    /// 成功率：completed / (completed + failed)；无样本时按 1.0 处理
    pub fn success_rate(&self) -> f64 {
        let inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let total = inner.runs_completed + inner.runs_failed;
        if total == 0 {
            1.0
        } else {
            inner.runs_completed as f64 / total as f64
        }
    }

    pub fn agent_stats(&self) -> HashMap<String, AgentStats> {
        let inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.per_agent.clone()
    }

    /// 最近 n 条事件（新的在后）
    pub fn recent(&self, n: usize) -> Vec<Observation> {
        let inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner
            .window
            .iter()
            .rev()
            .take(n)
            .rev()
            .cloned()
            .collect()
    }
}

impl Default for ObservationSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_rate_tracks_run_events() {
        let sink = ObservationSink::new(16);
        assert_eq!(sink.success_rate(), 1.0);
        sink.observe(events::RUN_COMPLETED, json!({}), "orchestrator");
        sink.observe(events::RUN_COMPLETED, json!({}), "orchestrator");
        sink.observe(events::RUN_FAILED, json!({}), "orchestrator");
        assert!((sink.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_agent_stats_averages() {
        let sink = ObservationSink::new(16);
        sink.observe_agent("pattern", true, 0.4, 10, None);
        sink.observe_agent("pattern", true, 0.2, 30, None);
        sink.observe_agent("pattern", false, 0.0, 0, Some("boom"));
        let stats = sink.agent_stats();
        let p = &stats["pattern"];
        assert_eq!(p.executions, 3);
        assert_eq!(p.faults, 1);
        assert!((p.avg_cost() - 0.2).abs() < 1e-9);
        assert!((p.avg_elapsed_ms() - 40.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rolling_window_bounds_raw_events() {
        let sink = ObservationSink::new(2);
        sink.observe("a", json!({}), "s");
        sink.observe("b", json!({}), "s");
        sink.observe("c", json!({}), "s");
        let recent = sink.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_type, "b");
        assert_eq!(recent[1].event_type, "c");
    }
}
