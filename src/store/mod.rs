//! 持久层：检查点存储与成本账本
//!
//! 两者都是追加为主的共享资源，写入预期发生在编排器的单线程阶段
//! （运行前快照 / 合并后更新），而非扇出阶段。落盘失败记日志即可，
//! 绝不升级为编排错误（尽力而为的持久性）。

pub mod checkpoint;
pub mod ledger;

pub use checkpoint::{
    CheckpointRecord, CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore,
};
pub use ledger::{BudgetCheck, CostEntry, CostLedger};
