//! Named fuzz scenarios.

use serde::Serialize;

/// Scenario identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// Stakers and pool operators: stake, unstake, move, pool management.
    Staking,

    /// Adds a keeper: epoch rolls and pool finalization.
    Epochs,

    /// Makers and takers only: order signing, fills, matches.
    Exchange,

    /// Every role, hybrid actors, and the exchange composed as a nested
    /// sub-simulation.
    Full,
}

impl ScenarioId {
    /// Returns all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Staking,
            ScenarioId::Epochs,
            ScenarioId::Exchange,
            ScenarioId::Full,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Staking => "staking",
            ScenarioId::Epochs => "epochs",
            ScenarioId::Exchange => "exchange",
            ScenarioId::Full => "full",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Staking => "stakers + operators: stake/unstake/move and pool management",
            ScenarioId::Epochs => "staking plus a keeper driving epoch rolls and finalization",
            ScenarioId::Exchange => "makers and takers: signing, fills, rounding rejections, matches",
            ScenarioId::Full => "all roles with hybrid actors and a nested exchange sub-simulation",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "staking" => Ok(ScenarioId::Staking),
            "epochs" => Ok(ScenarioId::Epochs),
            "exchange" => Ok(ScenarioId::Exchange),
            "full" => Ok(ScenarioId::Full),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>().unwrap(), scenario);
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        assert!("chaos_storm".parse::<ScenarioId>().is_err());
    }
}
