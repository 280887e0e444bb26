//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `COLONY__*` 覆盖（双下划线表示嵌套，如 `COLONY__ORCHESTRATOR__STRATEGY=pool`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub budget: BudgetSection,
    #[serde(default)]
    pub agents: AgentsSection,
}

/// [app] 段：应用名、检查点数据库路径
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// SQLite 检查点库路径，未设置时用内存存储
    pub checkpoint_db: Option<PathBuf>,
}

/// [orchestrator] 段：扇出策略与检查点 TTL
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// 扇出引擎：graph / pool / cooperative
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// 检查点记录有效期（秒），到期为建议性过期（读取方自行校验）
    #[serde(default = "default_checkpoint_ttl_secs")]
    pub checkpoint_ttl_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            checkpoint_ttl_secs: default_checkpoint_ttl_secs(),
        }
    }
}

fn default_strategy() -> String {
    "graph".to_string()
}

fn default_checkpoint_ttl_secs() -> u64 {
    86_400
}

/// [budget] 段：当期软告警线与硬上限（USD）
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetSection {
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    #[serde(default = "default_hard_cap")]
    pub hard_cap: f64,
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            alert_threshold: default_alert_threshold(),
            hard_cap: default_hard_cap(),
        }
    }
}

fn default_alert_threshold() -> f64 {
    8.0
}

fn default_hard_cap() -> f64 {
    10.0
}

/// [agents] 段：可选 Agent 的启用开关与采集组参数
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AgentsSection {
    /// 是否注册 fetch / scrape 采集组（还需 harvest feature）
    #[serde(default)]
    pub enable_harvest: bool,
    #[serde(default)]
    pub harvest: HarvestSection,
}

/// [agents.harvest] 段：抓取 URL 的超时、最大字符数、允许的域名白名单
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HarvestSection {
    #[serde(default = "default_harvest_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,
}

fn default_harvest_timeout_secs() -> u64 {
    15
}

fn default_max_result_chars() -> usize {
    8000
}

fn default_allowed_domains() -> Vec<String> {
    vec![
        "en.wikipedia.org".into(),
        "zh.wikipedia.org".into(),
        "github.com".into(),
        "raw.githubusercontent.com".into(),
        "stackoverflow.com".into(),
        "docs.rs".into(),
        "crates.io".into(),
        "arxiv.org".into(),
        "news.ycombinator.com".into(),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            orchestrator: OrchestratorSection::default(),
            budget: BudgetSection::default(),
            agents: AgentsSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 COLONY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 COLONY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("COLONY")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestrator.strategy, "graph");
        assert_eq!(cfg.orchestrator.checkpoint_ttl_secs, 86_400);
        assert!(cfg.budget.alert_threshold < cfg.budget.hard_cap);
        assert!(!cfg.agents.enable_harvest);
    }

    #[test]
    fn test_load_config_without_files_uses_defaults() {
        let cfg = load_config(None).expect("env-only load should succeed");
        assert_eq!(cfg.orchestrator.checkpoint_ttl_secs, 86_400);
    }
}
