use std::fmt;

/// Where the current session is in the analyze/implement pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Fetching,
    Analyzing,
    Results,
    GeneratingChanges,
    ReviewingChanges,
    Building,
    Error,
}

impl Phase {
    /// Phases from which a fresh analysis may start.
    pub fn accepts_analyze(self) -> bool {
        matches!(self, Phase::Idle | Phase::Error)
    }

    /// Phases waiting on an external call.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Phase::Fetching | Phase::Analyzing | Phase::GeneratingChanges | Phase::Building
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Fetching => "fetching",
            Phase::Analyzing => "analyzing",
            Phase::Results => "results",
            Phase::GeneratingChanges => "generating_changes",
            Phase::ReviewingChanges => "reviewing_changes",
            Phase::Building => "building",
            Phase::Error => "error",
        };
        write!(f, "{name}")
    }
}
