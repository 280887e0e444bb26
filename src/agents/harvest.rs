//! 采集组：fetch + scrape（harvest feature）
//!
//! 仅由 "harvest" 任务的路由覆盖作为两元并行组调用，不进入通用扇出。
//! fetch 抓取白名单域名的 URL 原文；scrape 把任务携带的 HTML 提取成可读
//! 文本。两者并行，互不依赖对方的输出。

use std::collections::HashSet;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::Client;
use serde_json::json;

use crate::agents::{names, Agent};
use crate::config::HarvestSection;
use crate::core::{AgentReport, SharedState};

const FETCH_COST: f64 = 0.002;
const SCRAPE_COST: f64 = 0.0008;

/// 从 URL 中提取 host（不含端口与路径）
fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = url.split('/').next()?;
    let host = host.split(':').next()?;
    Some(host.to_lowercase())
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20 && s.contains('<') && (s.contains("</") || s.contains("<head") || s.contains("<title")))
}

fn truncate_chars(body: String, max_chars: usize) -> String {
    if body.chars().count() > max_chars {
        body.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        body
    }
}

/// 在无运行时的同步线程上跑异步体（pool 策略的工作线程走这条路）
fn block_on_here<F: std::future::Future>(fut: F) -> Result<F::Output, String> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("runtime build failed: {e}"))?;
    Ok(rt.block_on(fut))
}

/// Fetch Agent：抓取 task.params["url"]，仅允许白名单域名
pub struct FetchAgent {
    client: Client,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

impl FetchAgent {
    pub fn new(cfg: &HarvestSection) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .user_agent("colony/0.1")
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains: cfg
                .allowed_domains
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            max_result_chars: cfg.max_result_chars,
        }
    }

    fn is_allowed(&self, url: &str) -> Result<(), String> {
        let domain =
            extract_domain(url).ok_or_else(|| "Invalid or missing URL".to_string())?;
        if self.allowed_domains.contains(&domain) {
            return Ok(());
        }
        Err(format!("Domain not in allowlist: {}", domain))
    }

    async fn fetch(&self, url: &str) -> Result<String, String> {
        self.is_allowed(url)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let mut body = resp
            .text()
            .await
            .map_err(|e| format!("Read body: {}", e))?;
        if body.starts_with('\u{FEFF}') {
            body = body[1..].to_string();
        }
        Ok(truncate_chars(body, self.max_result_chars))
    }
}

#[async_trait]
impl Agent for FetchAgent {
    fn name(&self) -> &str {
        names::FETCH
    }

    fn description(&self) -> &str {
        "Fetch a URL from the domain allowlist into the item set"
    }

    fn execute(&self, state: SharedState) -> SharedState {
        match block_on_here(self.execute_async(state.clone())) {
            Ok(out) => out,
            Err(e) => {
                let mut state = state;
                state.record_failure(names::FETCH, e);
                state
            }
        }
    }

    async fn execute_async(&self, mut state: SharedState) -> SharedState {
        let started = std::time::Instant::now();

        let url = match state.task.param("url").and_then(|v| v.as_str()) {
            Some(u) if !u.trim().is_empty() => u.trim().to_string(),
            _ => {
                state.record_failure(names::FETCH, "Missing url param");
                return state;
            }
        };

        tracing::info!(url = %url, "fetch agent request");
        match self.fetch(&url).await {
            Ok(body) => {
                state.items.push(json!({ "url": url, "raw": body }));
                state.push_context_list("sources", json!(format!("fetch:{url}")));
                state.record(
                    AgentReport::ok(names::FETCH, format!("fetched {}", url))
                        .with_produced(1)
                        .with_cost(FETCH_COST)
                        .with_elapsed_ms(started.elapsed().as_millis() as u64),
                );
            }
            Err(e) => state.record_failure(names::FETCH, e),
        }
        state
    }
}

/// Scrape Agent：把 task.params["html"] 提取成可读文本 item
pub struct ScrapeAgent {
    max_result_chars: usize,
}

impl ScrapeAgent {
    pub fn new(cfg: &HarvestSection) -> Self {
        Self {
            max_result_chars: cfg.max_result_chars,
        }
    }

    fn html_to_text(&self, html: &str) -> Option<String> {
        if !looks_like_html(html) {
            return Some(html.to_string());
        }
        match from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}

impl Agent for ScrapeAgent {
    fn name(&self) -> &str {
        names::SCRAPE
    }

    fn description(&self) -> &str {
        "Extract readable text from task-supplied HTML"
    }

    fn execute(&self, mut state: SharedState) -> SharedState {
        let started = std::time::Instant::now();

        let html = match state.task.param("html").and_then(|v| v.as_str()) {
            Some(h) if !h.trim().is_empty() => h.to_string(),
            _ => {
                // 没有 HTML 输入不算故障：采集组里 fetch 可能才是本次的主角
                state.record(
                    AgentReport::ok(names::SCRAPE, "no html param, nothing to scrape")
                        .with_cost(0.0)
                        .with_elapsed_ms(started.elapsed().as_millis() as u64),
                );
                return state;
            }
        };

        match self.html_to_text(&html) {
            Some(text) => {
                let text = truncate_chars(text, self.max_result_chars);
                state.items.push(json!({ "text": text }));
                state.push_context_list("sources", json!("scrape:html"));
                state.record(
                    AgentReport::ok(names::SCRAPE, "scraped html into text item")
                        .with_produced(1)
                        .with_cost(SCRAPE_COST)
                        .with_elapsed_ms(started.elapsed().as_millis() as u64),
                );
            }
            None => state.record_failure(names::SCRAPE, "html2text produced no output"),
        }
        state
    }
}
