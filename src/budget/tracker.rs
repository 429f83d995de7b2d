use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BudgetConfig;
use crate::error::{GateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Safe,
    Warning,
    Halt,
}

impl BudgetStatus {
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halt)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Halt => "halt",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLimits {
    pub tokens_per_minute: u64,
    pub daily_cost_limit: f64,
    pub alert_threshold: f64,
}

impl From<&BudgetConfig> for BudgetLimits {
    fn from(config: &BudgetConfig) -> Self {
        Self {
            tokens_per_minute: config.tokens_per_minute,
            daily_cost_limit: config.daily_cost_limit,
            alert_threshold: config.alert_threshold,
        }
    }
}

/// Rolling accounting window for token rate and daily cost.
///
/// Usage is monotonically non-decreasing within a window; the token counter
/// resets when the wall-clock minute rolls over and the cost counter resets
/// at the day boundary. All mutation happens through `record_at`, so the
/// reset-and-accumulate sequence stays a single atomic step under the
/// tracker's lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetWindow {
    pub window_started_at: DateTime<Utc>,
    pub tokens_used_in_window: u64,
    pub cost_day: NaiveDate,
    pub cost_used_today: f64,
    pub limits: BudgetLimits,
}

impl BudgetWindow {
    pub fn new(limits: BudgetLimits) -> Self {
        Self::new_at(Utc::now(), limits)
    }

    pub fn new_at(now: DateTime<Utc>, limits: BudgetLimits) -> Self {
        Self {
            window_started_at: now,
            tokens_used_in_window: 0,
            cost_day: now.date_naive(),
            cost_used_today: 0.0,
            limits,
        }
    }

    fn minute_bucket(at: DateTime<Utc>) -> i64 {
        at.timestamp().div_euclid(60)
    }

    fn minute_rolled_over(&self, now: DateTime<Utc>) -> bool {
        Self::minute_bucket(now) != Self::minute_bucket(self.window_started_at)
    }

    fn day_rolled_over(&self, now: DateTime<Utc>) -> bool {
        now.date_naive() != self.cost_day
    }

    /// Apply window resets, then accumulate. Resets happen before the add so
    /// usage from window N is never counted into window N+1.
    pub fn record_at(&mut self, now: DateTime<Utc>, tokens: u64, cost: f64) {
        if self.minute_rolled_over(now) {
            debug!(
                previous_tokens = self.tokens_used_in_window,
                "Token window rolled over"
            );
            self.tokens_used_in_window = 0;
            self.window_started_at = now;
        }
        if self.day_rolled_over(now) {
            debug!(
                previous_cost = self.cost_used_today,
                "Cost window rolled over"
            );
            self.cost_used_today = 0.0;
            self.cost_day = now.date_naive();
        }

        self.tokens_used_in_window = self.tokens_used_in_window.saturating_add(tokens);
        self.cost_used_today += cost.max(0.0);
    }

    /// Token usage as observed at `now`: an expired window reads as empty
    /// even before the next `record_at` resets it.
    pub fn effective_tokens_at(&self, now: DateTime<Utc>) -> u64 {
        if self.minute_rolled_over(now) {
            0
        } else {
            self.tokens_used_in_window
        }
    }

    pub fn effective_cost_at(&self, now: DateTime<Utc>) -> f64 {
        if self.day_rolled_over(now) {
            0.0
        } else {
            self.cost_used_today
        }
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> BudgetStatus {
        let token_fraction = if self.limits.tokens_per_minute == 0 {
            0.0
        } else {
            self.effective_tokens_at(now) as f64 / self.limits.tokens_per_minute as f64
        };
        let cost_fraction = if self.limits.daily_cost_limit <= 0.0 {
            0.0
        } else {
            self.effective_cost_at(now) / self.limits.daily_cost_limit
        };

        let worst = token_fraction.max(cost_fraction);
        if worst >= 1.0 {
            BudgetStatus::Halt
        } else if worst >= self.limits.alert_threshold {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Safe
        }
    }
}

/// Shared budget accounting across every agent working under one project.
///
/// Methods take `&self`; the reset-and-accumulate sequence is serialized on
/// an internal lock so concurrent workers never lose updates across a window
/// rollover.
pub struct BudgetTracker {
    window: Mutex<BudgetWindow>,
}

impl BudgetTracker {
    pub fn new(config: &BudgetConfig) -> Self {
        Self {
            window: Mutex::new(BudgetWindow::new(config.into())),
        }
    }

    pub fn from_window(window: BudgetWindow) -> Self {
        Self {
            window: Mutex::new(window),
        }
    }

    /// Record usage and return the budget status after accumulation.
    pub fn record_usage(&self, tokens: u64, cost: f64) -> BudgetStatus {
        self.record_usage_at(Utc::now(), tokens, cost)
    }

    pub fn record_usage_at(&self, now: DateTime<Utc>, tokens: u64, cost: f64) -> BudgetStatus {
        let mut window = self.window.lock();
        window.record_at(now, tokens, cost);
        let status = window.status_at(now);
        if status != BudgetStatus::Safe {
            warn!(
                tokens_used = window.tokens_used_in_window,
                cost_used = window.cost_used_today,
                status = status.as_str(),
                "Budget threshold crossed"
            );
        }
        status
    }

    pub fn check_budget(&self) -> BudgetStatus {
        self.check_budget_at(Utc::now())
    }

    pub fn check_budget_at(&self, now: DateTime<Utc>) -> BudgetStatus {
        self.window.lock().status_at(now)
    }

    /// Fail with `BudgetHalt` when usage-incurring work must not proceed.
    pub fn ensure_not_halted(&self) -> Result<()> {
        self.ensure_not_halted_at(Utc::now())
    }

    pub fn ensure_not_halted_at(&self, now: DateTime<Utc>) -> Result<()> {
        let window = self.window.lock();
        match window.status_at(now) {
            BudgetStatus::Halt => {
                let reason = if window.effective_tokens_at(now) >= window.limits.tokens_per_minute {
                    format!(
                        "{} tokens in window exceeds {}/min",
                        window.effective_tokens_at(now),
                        window.limits.tokens_per_minute
                    )
                } else {
                    format!(
                        "${:.2} today exceeds ${:.2} daily limit",
                        window.effective_cost_at(now),
                        window.limits.daily_cost_limit
                    )
                };
                Err(GateError::BudgetHalt { reason })
            }
            _ => Ok(()),
        }
    }

    /// Snapshot for durable persistence.
    pub fn snapshot(&self) -> BudgetWindow {
        self.window.lock().clone()
    }
}
