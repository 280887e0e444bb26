//! Colony - Rust 多智能体数据处理编排器
//!
//! 模块划分：
//! - **agents**: Agent 接口、能力注册表与内置处理单元（intake / pattern / scorer / collector / synthesize / harvest）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 共享状态、执行计划、编排主流程与构建器
//! - **observability**: 日志初始化与结构化观测事件（成功率 / 每 Agent 统计）
//! - **store**: 检查点存储（内存 / SQLite）与成本账本（软告警 + 硬上限）
//! - **strategy**: 三种可互换的扇出引擎（graph / pool / cooperative）与结果合并器

pub mod agents;
pub mod config;
pub mod core;
pub mod observability;
pub mod store;
pub mod strategy;

pub use crate::core::{Orchestrator, OrchestratorBuilder, RunStatus, SharedState, Task};
pub use crate::strategy::StrategyKind;
