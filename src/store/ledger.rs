//! 成本账本
//!
//! track 追加一条支出并对当期总额复核两道水位：软告警线（只告警）与
//! 硬上限（此后 can_proceed 返回 false，直到会计期翻转清零）。触顶不
//! 回滚在途工作。会计期按月（UTC，YYYY-MM）。

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 追加式支出条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub source: String,
    pub operation: String,
    pub amount: f64,
    pub currency: String,
    pub metadata: Value,
    /// epoch 毫秒
    pub tracked_at: i64,
    /// 记账期（YYYY-MM）
    pub period: String,
}

/// 水位复核结果（track / check 共用）
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetCheck {
    Ok,
    /// 已过软告警线：百分比为当期总额 / 硬上限
    Warning { percentage: f64 },
    Exceeded { reason: String },
}

struct LedgerInner {
    entries: Vec<CostEntry>,
    period: String,
    period_total: f64,
}

pub struct CostLedger {
    alert_threshold: f64,
    hard_cap: f64,
    inner: Mutex<LedgerInner>,
}

fn current_period() -> String {
    chrono::Utc::now().format("%Y-%m").to_string()
}

impl CostLedger {
    pub fn new(alert_threshold: f64, hard_cap: f64) -> Self {
        Self {
            alert_threshold,
            hard_cap,
            inner: Mutex::new(LedgerInner {
                entries: Vec::new(),
                period: current_period(),
                period_total: 0.0,
            }),
        }
    }

    /// 会计期翻转：当期总额清零（历史条目保留各自 period）
    fn roll_period(inner: &mut LedgerInner) {
        let now = current_period();
        if inner.period != now {
            tracing::info!(from = %inner.period, to = %now, "accounting period rolled over");
            inner.period = now;
            inner.period_total = 0.0;
        }
    }

    fn evaluate(&self, period_total: f64) -> BudgetCheck {
        if period_total >= self.hard_cap {
            BudgetCheck::Exceeded {
                reason: format!(
                    "period total {:.4} reached hard cap {:.4}",
                    period_total, self.hard_cap
                ),
            }
        } else if period_total >= self.alert_threshold {
            BudgetCheck::Warning {
                percentage: period_total / self.hard_cap,
            }
        } else {
            BudgetCheck::Ok
        }
    }

    /// 追加支出并复核水位
    pub fn track(
        &self,
        source: &str,
        operation: &str,
        amount: f64,
        metadata: Value,
    ) -> BudgetCheck {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        Self::roll_period(&mut inner);

        let period = inner.period.clone();
        inner.entries.push(CostEntry {
            source: source.to_string(),
            operation: operation.to_string(),
            amount,
            currency: "USD".to_string(),
            metadata,
            tracked_at: chrono::Utc::now().timestamp_millis(),
            period,
        });
        inner.period_total += amount;

        let check = self.evaluate(inner.period_total);
        match &check {
            BudgetCheck::Warning { percentage } => {
                tracing::warn!(
                    "Budget warning: period total at {:.0}% of hard cap",
                    percentage * 100.0
                );
            }
            BudgetCheck::Exceeded { reason } => {
                tracing::warn!(reason = %reason, "Budget hard cap crossed");
            }
            BudgetCheck::Ok => {}
        }
        check
    }

    pub fn check(&self) -> BudgetCheck {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        Self::roll_period(&mut inner);
        self.evaluate(inner.period_total)
    }

    /// 是否允许继续新工作；false 时携带原因
    pub fn can_proceed(&self) -> (bool, Option<String>) {
        match self.check() {
            BudgetCheck::Exceeded { reason } => (false, Some(reason)),
            _ => (true, None),
        }
    }

    pub fn period_total(&self) -> f64 {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        Self::roll_period(&mut inner);
        inner.period_total
    }

    pub fn entries_for_period(&self, period: &str) -> Vec<CostEntry> {
        let inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner
            .entries
            .iter()
            .filter(|e| e.period == period)
            .cloned()
            .collect()
    }

    #[cfg(test)]
    fn force_period(&self, period: &str, total: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.period = period.to_string();
        inner.period_total = total;
    }
}
