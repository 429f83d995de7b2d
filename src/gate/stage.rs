use std::fmt;

use serde::{Deserialize, Serialize};

/// One ordered phase of the development pipeline.
///
/// Stages are totally ordered; forward movement is one stage at a time and
/// backward movement only happens through a Recycle decision or a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Research,
    Plan,
    TestFirst,
    Branch,
    Implement,
    Refactor,
    SafetyCheck,
    Validate,
    MergeDeploy,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::Research,
        Stage::Plan,
        Stage::TestFirst,
        Stage::Branch,
        Stage::Implement,
        Stage::Refactor,
        Stage::SafetyCheck,
        Stage::Validate,
        Stage::MergeDeploy,
    ];

    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Stage> {
        Self::ALL.get(index).copied()
    }

    /// The next stage in pipeline order, or `None` at the final stage.
    pub fn next(&self) -> Option<Stage> {
        Self::from_index(self.index() + 1)
    }

    /// Every stage strictly after this one, in pipeline order.
    ///
    /// This is the dependency closure a rollback or drift invalidation must
    /// cover: later stages were validated against this stage's outputs.
    pub fn downstream(&self) -> Vec<Stage> {
        Self::ALL[self.index() + 1..].to_vec()
    }

    /// Stages strictly between `self` and `target`, exclusive on both ends.
    pub fn stages_between(&self, target: Stage) -> Vec<Stage> {
        let (lo, hi) = (self.index().min(target.index()), self.index().max(target.index()));
        if hi - lo <= 1 {
            return Vec::new();
        }
        Self::ALL[lo + 1..hi].to_vec()
    }

    pub fn is_first(&self) -> bool {
        *self == Stage::Research
    }

    pub fn is_final(&self) -> bool {
        *self == Stage::MergeDeploy
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Plan => "plan",
            Self::TestFirst => "test_first",
            Self::Branch => "branch",
            Self::Implement => "implement",
            Self::Refactor => "refactor",
            Self::SafetyCheck => "safety_check",
            Self::Validate => "validate",
            Self::MergeDeploy => "merge_deploy",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        for window in Stage::ALL.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn test_next_chain_covers_all_stages() {
        let mut stage = Stage::Research;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            visited.push(next);
            stage = next;
        }
        assert_eq!(visited, Stage::ALL.to_vec());
        assert_eq!(stage, Stage::MergeDeploy);
        assert!(stage.next().is_none());
    }

    #[test]
    fn test_downstream() {
        assert_eq!(Stage::Validate.downstream(), vec![Stage::MergeDeploy]);
        assert!(Stage::MergeDeploy.downstream().is_empty());
        assert_eq!(Stage::Research.downstream().len(), 8);
    }

    #[test]
    fn test_stages_between() {
        assert_eq!(
            Stage::Plan.stages_between(Stage::Implement),
            vec![Stage::TestFirst, Stage::Branch]
        );
        assert!(Stage::Plan.stages_between(Stage::TestFirst).is_empty());
        // Symmetric regardless of argument order
        assert_eq!(
            Stage::Implement.stages_between(Stage::Plan),
            vec![Stage::TestFirst, Stage::Branch]
        );
    }
}
