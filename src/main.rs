//! Colony - 无界面入口
//!
//! 用法：colony <kind> [params-json]
//! 初始化日志、加载配置、构建编排器、跑一个任务并把终态打成 JSON。

use anyhow::Context;
use colony::config::load_config;
use colony::{OrchestratorBuilder, Task};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    colony::observability::init();

    let mut args = std::env::args().skip(1);
    let kind = args.next().unwrap_or_else(|| "generic".to_string());
    let params = match args.next() {
        Some(raw) => serde_json::from_str(&raw).context("params must be a JSON object")?,
        None => serde_json::Map::new(),
    };

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        colony::config::AppConfig::default()
    });

    let orchestrator = OrchestratorBuilder::new(cfg).build();

    let task = Task { kind, params };
    let final_state = orchestrator.execute_async(&task).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&final_state).context("serialize final state")?
    );
    Ok(())
}
