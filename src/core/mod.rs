//! 核心编排层：共享状态、执行计划、错误分类、主流程与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod state;

pub use builder::OrchestratorBuilder;
pub use error::{OrchestrateError, StoreError};
pub use orchestrator::Orchestrator;
pub use plan::{ContextReducer, ExecutionPlan};
pub use state::{AgentReport, RunStatus, SharedState, Task};
