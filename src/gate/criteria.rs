use std::fmt;

use serde::{Deserialize, Serialize};

use super::Stage;
use crate::config::GateConfig;

/// Outcome of a stage validation run, produced by an external validator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub requires_rework: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recycle_target: Option<Stage>,
    /// Identity of the agent that produced the work, carried into the gate
    /// record for the independent-verification check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl ValidationOutcome {
    pub fn passed() -> Self {
        Self {
            passed: true,
            ..Self::default()
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            passed: false,
            errors,
            ..Self::default()
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_rework(mut self, target: Stage) -> Self {
        self.requires_rework = true;
        self.recycle_target = Some(target);
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// Ambient context evaluated alongside a validation outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionContext {
    /// A required human decision has not arrived yet.
    #[serde(default)]
    pub requires_human_decision: bool,
    /// Estimated cost of proceeding with the next stage, in USD.
    #[serde(default)]
    pub estimated_cost: f64,
    /// Remaining budget headroom the cost is compared against.
    #[serde(default)]
    pub budget_threshold: f64,
    #[serde(default)]
    pub risk_score: f64,
    /// Operator explicitly abandoned the work item.
    #[serde(default)]
    pub abandoned: bool,
    /// A pending human escalation exceeded its response window.
    #[serde(default)]
    pub escalation_timed_out: bool,
    /// The budget tracker reported Halt; wired in as a Hold trigger so that
    /// drivers ignoring `check_budget` still cannot push work through.
    #[serde(default)]
    pub budget_halted: bool,
}

/// Terminal-abandon criteria. Evaluated before Hold: Kill always wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillCriterion {
    MaxRetriesExceeded,
    ExplicitAbandonment,
    EscalationTimeout,
}

impl KillCriterion {
    pub const ALL: [KillCriterion; 3] = [
        Self::MaxRetriesExceeded,
        Self::ExplicitAbandonment,
        Self::EscalationTimeout,
    ];

    pub fn triggered(
        &self,
        outcome: &ValidationOutcome,
        context: &DecisionContext,
        config: &GateConfig,
    ) -> bool {
        match self {
            Self::MaxRetriesExceeded => outcome.retry_count >= config.max_retries,
            Self::ExplicitAbandonment => context.abandoned,
            Self::EscalationTimeout => context.escalation_timed_out,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::MaxRetriesExceeded => "max retries exceeded",
            Self::ExplicitAbandonment => "explicitly abandoned",
            Self::EscalationTimeout => "human escalation timed out",
        }
    }
}

/// Pause criteria. Hold preserves the current stage and carries no retry
/// penalty; it never competes with Kill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldCriterion {
    MissingHumanDecision,
    CostNearThreshold,
    RiskAboveCeiling,
    BudgetHalted,
}

impl HoldCriterion {
    pub const ALL: [HoldCriterion; 4] = [
        Self::MissingHumanDecision,
        Self::CostNearThreshold,
        Self::RiskAboveCeiling,
        Self::BudgetHalted,
    ];

    pub fn triggered(&self, context: &DecisionContext, config: &GateConfig) -> bool {
        match self {
            Self::MissingHumanDecision => context.requires_human_decision,
            Self::CostNearThreshold => {
                context.budget_threshold > 0.0
                    && context.estimated_cost
                        >= context.budget_threshold * config.cost_hold_fraction
            }
            Self::RiskAboveCeiling => context.risk_score > config.risk_ceiling,
            Self::BudgetHalted => context.budget_halted,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingHumanDecision => "required human decision missing",
            Self::CostNearThreshold => "estimated cost near budget threshold",
            Self::RiskAboveCeiling => "risk score above ceiling",
            Self::BudgetHalted => "budget halted",
        }
    }
}

/// A gate decision with its payload, handled exhaustively at every call
/// site. Replaces the loosely-typed decision dictionaries of older drivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Go,
    Kill { reason: String },
    Hold { reasons: Vec<String> },
    Recycle { target: Stage },
}

impl Decision {
    pub fn kill(reason: impl Into<String>) -> Self {
        Self::Kill {
            reason: reason.into(),
        }
    }

    pub fn hold(reasons: Vec<String>) -> Self {
        Self::Hold { reasons }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Kill { .. })
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Go => write!(f, "go"),
            Self::Kill { reason } => write!(f, "kill ({})", reason),
            Self::Hold { reasons } => write!(f, "hold ({})", reasons.join("; ")),
            Self::Recycle { target } => write!(f, "recycle -> {}", target),
        }
    }
}

/// Evaluate all kill criteria; first triggered wins.
pub fn evaluate_kill(
    outcome: &ValidationOutcome,
    context: &DecisionContext,
    config: &GateConfig,
) -> Option<KillCriterion> {
    KillCriterion::ALL
        .iter()
        .copied()
        .find(|c| c.triggered(outcome, context, config))
}

/// Evaluate all hold criteria; every triggered reason is reported so the
/// operator sees the full picture, not just the first blocker.
pub fn evaluate_hold(context: &DecisionContext, config: &GateConfig) -> Vec<HoldCriterion> {
    HoldCriterion::ALL
        .iter()
        .copied()
        .filter(|c| c.triggered(context, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_on_max_retries() {
        let config = GateConfig::default();
        let outcome = ValidationOutcome::failed(vec!["boom".into()]).with_retry_count(3);
        let context = DecisionContext::default();
        assert_eq!(
            evaluate_kill(&outcome, &context, &config),
            Some(KillCriterion::MaxRetriesExceeded)
        );
    }

    #[test]
    fn test_kill_on_abandonment_before_retries() {
        let config = GateConfig::default();
        let outcome = ValidationOutcome::passed();
        let context = DecisionContext {
            abandoned: true,
            ..Default::default()
        };
        assert_eq!(
            evaluate_kill(&outcome, &context, &config),
            Some(KillCriterion::ExplicitAbandonment)
        );
    }

    #[test]
    fn test_hold_on_cost_fraction() {
        let config = GateConfig::default();
        // 80% of a 10.0 threshold
        let context = DecisionContext {
            estimated_cost: 8.0,
            budget_threshold: 10.0,
            ..Default::default()
        };
        assert_eq!(
            evaluate_hold(&context, &config),
            vec![HoldCriterion::CostNearThreshold]
        );

        let under = DecisionContext {
            estimated_cost: 7.9,
            budget_threshold: 10.0,
            ..Default::default()
        };
        assert!(evaluate_hold(&under, &config).is_empty());
    }

    #[test]
    fn test_hold_collects_every_triggered_reason() {
        let config = GateConfig::default();
        let context = DecisionContext {
            requires_human_decision: true,
            budget_halted: true,
            risk_score: config.risk_ceiling + 1.0,
            ..Default::default()
        };
        let triggered = evaluate_hold(&context, &config);
        assert_eq!(triggered.len(), 3);
    }
}
