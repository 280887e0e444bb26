//! 共享状态：任务记录与贯穿一次运行的可变状态
//!
//! SharedState 是唯一在 Agent 之间流转的数据载体；并发分支各持有自己的
//! Clone（深拷贝），只有编排器在单线程合并阶段写回规范副本。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 任务记录：kind + 自由参数，对一次运行不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

impl Task {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: serde_json::Map::new(),
        }
    }

    /// 链式设置参数
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// 运行状态：编排器在入口设 Running、出口设 Completed / Failed；Agent 不直接改
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// 是否为终止态
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// 单个 Agent 执行后追加的记录（results 逻辑上只增不改）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    pub agent: String,
    pub summary: String,
    /// 新增 item / 符号等产出计数
    pub produced: usize,
    /// 本次执行新增成本（USD）
    pub cost: f64,
    pub elapsed_ms: u64,
    pub failed: bool,
    pub error: Option<String>,
}

impl AgentReport {
    pub fn ok(agent: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            summary: summary.into(),
            produced: 0,
            cost: 0.0,
            elapsed_ms: 0,
            failed: false,
            error: None,
        }
    }

    pub fn with_produced(mut self, produced: usize) -> Self {
        self.produced = produced;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}

/// 贯穿一次运行的共享状态
///
/// - `items`: 工作数据集，Agent 可整体替换（变换类）或追加（采集类）
/// - `context`: 开放键值袋，冲突由执行计划的 reducer 表在合并时裁决
/// - `results`: 每个 Agent 追加一条 AgentReport
/// - `cost`: 单次运行内单调不减
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedState {
    pub task: Task,
    pub items: Vec<Value>,
    pub context: HashMap<String, Value>,
    pub results: Vec<AgentReport>,
    pub cost: f64,
    pub status: RunStatus,
    pub error: Option<String>,
    pub checkpoint_ref: Option<String>,
}

impl SharedState {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            items: Vec::new(),
            context: HashMap::new(),
            results: Vec::new(),
            cost: 0.0,
            status: RunStatus::Pending,
            error: None,
            checkpoint_ref: None,
        }
    }

    /// Agent 成功路径：追加报告并把报告成本计入运行成本
    pub fn record(&mut self, report: AgentReport) {
        self.cost += report.cost;
        self.results.push(report);
    }

    /// Agent 内部失败路径：追加失败报告并携带人类可读的错误串。
    /// 运行级 status 仍由编排器裁决。
    pub fn record_failure(&mut self, agent: impl Into<String>, error: impl Into<String>) {
        let agent = agent.into();
        let error = error.into();
        self.error = Some(error.clone());
        self.results.push(AgentReport {
            agent: agent.clone(),
            summary: format!("{} failed", agent),
            produced: 0,
            cost: 0.0,
            elapsed_ms: 0,
            failed: true,
            error: Some(error),
        });
    }

    /// context 写入便捷方法
    pub fn set_context(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
    }

    /// 把字符串追加进 context 中的数组累加键（不存在则建数组）
    pub fn push_context_list(&mut self, key: &str, value: Value) {
        match self.context.get_mut(key) {
            Some(Value::Array(arr)) => arr.push(value),
            _ => {
                self.context.insert(key.to_string(), Value::Array(vec![value]));
            }
        }
    }

    /// items 中每个对象的指定字符串字段（pattern / scorer 等按文本工作的 Agent 共用）
    pub fn item_texts(&self, field: &str) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| item.get(field).and_then(|v| v.as_str()))
            .collect()
    }
}
