use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Special-event markets. The serde keys are stored in wager records and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpecialMarket {
    #[serde(rename = "both_teams_score")]
    BothTeamsScore,
    #[serde(rename = "total_goals_over_2_5")]
    TotalGoalsOver2_5,
    #[serde(rename = "total_goals_under_2_5")]
    TotalGoalsUnder2_5,
    #[serde(rename = "home_goals_over_1_5")]
    HomeGoalsOver1_5,
    #[serde(rename = "away_goals_over_1_5")]
    AwayGoalsOver1_5,
    #[serde(rename = "corner_goal")]
    CornerGoal,
    #[serde(rename = "free_kick_goal")]
    FreeKickGoal,
    #[serde(rename = "bicycle_kick_goal")]
    BicycleKickGoal,
    #[serde(rename = "header_goal")]
    HeaderGoal,
    #[serde(rename = "striker_goal")]
    StrikerGoal,
    #[serde(rename = "midfielder_goal")]
    MidfielderGoal,
    #[serde(rename = "defender_goal")]
    DefenderGoal,
    #[serde(rename = "goalkeeper_goal")]
    GoalkeeperGoal,
}

pub const ALL_MARKETS: [SpecialMarket; 13] = [
    SpecialMarket::BothTeamsScore,
    SpecialMarket::TotalGoalsOver2_5,
    SpecialMarket::TotalGoalsUnder2_5,
    SpecialMarket::HomeGoalsOver1_5,
    SpecialMarket::AwayGoalsOver1_5,
    SpecialMarket::CornerGoal,
    SpecialMarket::FreeKickGoal,
    SpecialMarket::BicycleKickGoal,
    SpecialMarket::HeaderGoal,
    SpecialMarket::StrikerGoal,
    SpecialMarket::MidfielderGoal,
    SpecialMarket::DefenderGoal,
    SpecialMarket::GoalkeeperGoal,
];

impl SpecialMarket {
    pub fn key(self) -> &'static str {
        match self {
            SpecialMarket::BothTeamsScore => "both_teams_score",
            SpecialMarket::TotalGoalsOver2_5 => "total_goals_over_2_5",
            SpecialMarket::TotalGoalsUnder2_5 => "total_goals_under_2_5",
            SpecialMarket::HomeGoalsOver1_5 => "home_goals_over_1_5",
            SpecialMarket::AwayGoalsOver1_5 => "away_goals_over_1_5",
            SpecialMarket::CornerGoal => "corner_goal",
            SpecialMarket::FreeKickGoal => "free_kick_goal",
            SpecialMarket::BicycleKickGoal => "bicycle_kick_goal",
            SpecialMarket::HeaderGoal => "header_goal",
            SpecialMarket::StrikerGoal => "striker_goal",
            SpecialMarket::MidfielderGoal => "midfielder_goal",
            SpecialMarket::DefenderGoal => "defender_goal",
            SpecialMarket::GoalkeeperGoal => "goalkeeper_goal",
        }
    }

    /// Human-readable label. Home/away markets name the side they refer to.
    pub fn label(self, home: &str, away: &str) -> String {
        match self {
            SpecialMarket::BothTeamsScore => "Both teams score".to_string(),
            SpecialMarket::TotalGoalsOver2_5 => "Over 2.5 goals".to_string(),
            SpecialMarket::TotalGoalsUnder2_5 => "Under 2.5 goals".to_string(),
            SpecialMarket::HomeGoalsOver1_5 => format!("Over 1.5 goals {home}"),
            SpecialMarket::AwayGoalsOver1_5 => format!("Over 1.5 goals {away}"),
            SpecialMarket::CornerGoal => "Goal from a corner".to_string(),
            SpecialMarket::FreeKickGoal => "Free-kick goal".to_string(),
            SpecialMarket::BicycleKickGoal => "Bicycle-kick goal".to_string(),
            SpecialMarket::HeaderGoal => "Headed goal".to_string(),
            SpecialMarket::StrikerGoal => "Striker scores".to_string(),
            SpecialMarket::MidfielderGoal => "Midfielder scores".to_string(),
            SpecialMarket::DefenderGoal => "Defender scores".to_string(),
            SpecialMarket::GoalkeeperGoal => "Goalkeeper scores".to_string(),
        }
    }

    pub fn base_odds(self) -> f64 {
        match self {
            SpecialMarket::BothTeamsScore => 1.10,
            SpecialMarket::TotalGoalsOver2_5 => 1.35,
            SpecialMarket::TotalGoalsUnder2_5 => 2.25,
            SpecialMarket::HomeGoalsOver1_5 => 1.25,
            SpecialMarket::AwayGoalsOver1_5 => 1.25,
            SpecialMarket::CornerGoal => 8.5,
            SpecialMarket::FreeKickGoal => 6.0,
            SpecialMarket::BicycleKickGoal => 35.0,
            SpecialMarket::HeaderGoal => 3.2,
            SpecialMarket::StrikerGoal => 1.6,
            SpecialMarket::MidfielderGoal => 2.8,
            SpecialMarket::DefenderGoal => 6.5,
            SpecialMarket::GoalkeeperGoal => 75.0,
        }
    }

    /// Markets settled from the final score alone; the rest need an event flag.
    pub fn is_statistical(self) -> bool {
        matches!(
            self,
            SpecialMarket::BothTeamsScore
                | SpecialMarket::TotalGoalsOver2_5
                | SpecialMarket::TotalGoalsUnder2_5
                | SpecialMarket::HomeGoalsOver1_5
                | SpecialMarket::AwayGoalsOver1_5
        )
    }

    pub fn is_set_piece(self) -> bool {
        matches!(
            self,
            SpecialMarket::CornerGoal | SpecialMarket::FreeKickGoal | SpecialMarket::HeaderGoal
        )
    }
}

impl fmt::Display for SpecialMarket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SpecialMarket {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let key = raw.trim();
        ALL_MARKETS
            .iter()
            .copied()
            .find(|m| m.key() == key)
            .ok_or_else(|| CoreError::UnknownMarket(key.to_string()))
    }
}

/// Event flags entered with a manual result, e.g. `corner_goal: true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecialFlags(BTreeMap<SpecialMarket, bool>);

impl SpecialFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, market: SpecialMarket) -> Self {
        self.0.insert(market, true);
        self
    }

    pub fn set(&mut self, market: SpecialMarket, happened: bool) {
        self.0.insert(market, happened);
    }

    /// Only an explicit `true` counts; absent keys are treated as "did not happen".
    pub fn is_set(&self, market: SpecialMarket) -> bool {
        self.0.get(&market).copied().unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpecialMarket, bool)> + '_ {
        self.0.iter().map(|(m, v)| (*m, *v))
    }
}

impl FromIterator<SpecialMarket> for SpecialFlags {
    fn from_iter<I: IntoIterator<Item = SpecialMarket>>(iter: I) -> Self {
        Self(iter.into_iter().map(|m| (m, true)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_through_serde() {
        for market in ALL_MARKETS {
            let json = serde_json::to_string(&market).unwrap();
            assert_eq!(json, format!("\"{}\"", market.key()));
            assert_eq!(market.key().parse::<SpecialMarket>().unwrap(), market);
        }
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert_eq!(
            "own_goal".parse::<SpecialMarket>(),
            Err(CoreError::UnknownMarket("own_goal".to_string()))
        );
    }

    #[test]
    fn flags_only_count_explicit_true() {
        let mut flags = SpecialFlags::new().with(SpecialMarket::CornerGoal);
        flags.set(SpecialMarket::HeaderGoal, false);
        assert!(flags.is_set(SpecialMarket::CornerGoal));
        assert!(!flags.is_set(SpecialMarket::HeaderGoal));
        assert!(!flags.is_set(SpecialMarket::BicycleKickGoal));

        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, r#"{"corner_goal":true,"header_goal":false}"#);
    }
}
