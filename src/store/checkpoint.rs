//! 检查点存储
//!
//! 运行前 save 拿到 run id，运行后 update 写入终态快照。记录创建后
//! 24 小时（可配）过期，但过期是建议性的：没有删除路径，读取方拿到
//! 记录后自行校验 expires_at。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::{SharedState, StoreError, Task};

/// 持久化的检查点记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub id: String,
    /// 任务快照（序列化串）
    pub task_context: String,
    pub state: SharedState,
    /// epoch 秒
    pub created_at: i64,
    /// created_at + ttl
    pub expires_at: i64,
}

impl CheckpointRecord {
    /// 建议性过期校验：读取方在拿到记录后调用
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

fn new_run_id() -> String {
    format!("run_{}", uuid::Uuid::new_v4())
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// 检查点存储契约：save 前快照 / update 后快照 / load 原样返回（含已过期记录）
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, task: &Task, state: &SharedState) -> Result<String, StoreError>;
    async fn update(&self, id: &str, state: &SharedState) -> Result<(), StoreError>;
    async fn load(&self, id: &str) -> Result<Option<CheckpointRecord>, StoreError>;
}

/// 内存实现（默认与测试用）
pub struct MemoryCheckpointStore {
    ttl_secs: i64,
    records: RwLock<HashMap<String, CheckpointRecord>>,
}

impl MemoryCheckpointStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs: ttl_secs as i64,
            records: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, task: &Task, state: &SharedState) -> Result<String, StoreError> {
        let id = new_run_id();
        let created_at = now_epoch();
        let record = CheckpointRecord {
            id: id.clone(),
            task_context: serde_json::to_string(task)?,
            state: state.clone(),
            created_at,
            expires_at: created_at + self.ttl_secs,
        };
        self.records.write().await.insert(id.clone(), record);
        Ok(id)
    }

    async fn update(&self, id: &str, state: &SharedState) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(id) {
            Some(record) => {
                record.state = state.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn load(&self, id: &str) -> Result<Option<CheckpointRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }
}

/// SQLite 实现（rusqlite，连接用 Mutex 串行；写入都在单线程阶段，足够）
pub struct SqliteCheckpointStore {
    conn: Mutex<rusqlite::Connection>,
    ttl_secs: i64,
}

impl SqliteCheckpointStore {
    pub fn open(path: impl AsRef<Path>, ttl_secs: u64) -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                id TEXT PRIMARY KEY,
                task_context TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_checkpoints_expires ON checkpoints(expires_at)",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl_secs: ttl_secs as i64,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, task: &Task, state: &SharedState) -> Result<String, StoreError> {
        let id = new_run_id();
        let created_at = now_epoch();
        let task_context = serde_json::to_string(task)?;
        let state_json = serde_json::to_string(state)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO checkpoints (id, task_context, state, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id, task_context, state_json, created_at, created_at + self.ttl_secs],
        )?;
        Ok(id)
    }

    async fn update(&self, id: &str, state: &SharedState) -> Result<(), StoreError> {
        let state_json = serde_json::to_string(state)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE checkpoints SET state = ?1 WHERE id = ?2",
            rusqlite::params![state_json, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<CheckpointRecord>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, task_context, state, created_at, expires_at
                 FROM checkpoints WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, task_context, state_json, created_at, expires_at)) => {
                let state: SharedState = serde_json::from_str(&state_json)?;
                Ok(Some(CheckpointRecord {
                    id,
                    task_context,
                    state,
                    created_at,
                    expires_at,
                }))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunStatus;

    fn sample() -> (Task, SharedState) {
        let task = Task::new("generic");
        let state = SharedState::new(task.clone());
        (task, state)
    }

    #[tokio::test]
    async fn test_memory_save_update_load() {
        let store = MemoryCheckpointStore::new(86_400);
        let (task, mut state) = sample();
        let id = store.save(&task, &state).await.unwrap();

        state.status = RunStatus::Completed;
        store.update(&id, &state).await.unwrap();

        let record = store.load(&id).await.unwrap().unwrap();
        assert_eq!(record.state.status, RunStatus::Completed);
        assert!(!record.is_expired(record.created_at));
    }

    #[tokio::test]
    async fn test_two_saves_two_distinct_ids() {
        let store = MemoryCheckpointStore::new(86_400);
        let (task, state) = sample();
        let a = store.save(&task, &state).await.unwrap();
        let b = store.save(&task, &state).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_expiry_is_advisory_not_enforced() {
        // ttl 0：记录立即过期，但 load 仍原样返回
        let store = MemoryCheckpointStore::new(0);
        let (task, state) = sample();
        let id = store.save(&task, &state).await.unwrap();

        let record = store.load(&id).await.unwrap().unwrap();
        assert!(record.is_expired(chrono::Utc::now().timestamp()));
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let store = MemoryCheckpointStore::new(86_400);
        let (_, state) = sample();
        let err = store.update("run_missing", &state).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SqliteCheckpointStore::open(dir.path().join("colony.db"), 86_400).unwrap();
        let (task, mut state) = sample();
        state.cost = 1.5;
        let id = store.save(&task, &state).await.unwrap();

        state.status = RunStatus::Failed;
        state.error = Some("oops".to_string());
        store.update(&id, &state).await.unwrap();

        let record = store.load(&id).await.unwrap().unwrap();
        assert_eq!(record.state.status, RunStatus::Failed);
        assert_eq!(record.state.error.as_deref(), Some("oops"));
        assert!((record.state.cost - 1.5).abs() < f64::EPSILON);
        assert_eq!(record.expires_at, record.created_at + 86_400);
    }
}
