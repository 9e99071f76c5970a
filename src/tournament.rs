use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::state::League;

/// Competitions a match can belong to. League seasons keep a table; cups are knockout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tournament {
    D1,
    D2,
    D3,
    Maradei,
    Cv,
    Cd2,
    Cd3,
    Izoro,
    Izplata,
    Custom,
}

pub const ALL_TOURNAMENTS: [Tournament; 10] = [
    Tournament::D1,
    Tournament::D2,
    Tournament::D3,
    Tournament::Maradei,
    Tournament::Cv,
    Tournament::Cd2,
    Tournament::Cd3,
    Tournament::Izoro,
    Tournament::Izplata,
    Tournament::Custom,
];

/// Per-side strength multipliers a cup applies on top of the knockout model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CupFactor {
    pub team1: f64,
    pub team2: f64,
}

impl Default for CupFactor {
    fn default() -> Self {
        Self {
            team1: 1.0,
            team2: 1.0,
        }
    }
}

impl Tournament {
    pub fn code(self) -> &'static str {
        match self {
            Tournament::D1 => "d1",
            Tournament::D2 => "d2",
            Tournament::D3 => "d3",
            Tournament::Maradei => "maradei",
            Tournament::Cv => "cv",
            Tournament::Cd2 => "cd2",
            Tournament::Cd3 => "cd3",
            Tournament::Izoro => "izoro",
            Tournament::Izplata => "izplata",
            Tournament::Custom => "custom",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Tournament::D1 => "Liga D1",
            Tournament::D2 => "Liga D2",
            Tournament::D3 => "Liga D3",
            Tournament::Maradei => "Copa Maradei",
            Tournament::Cv => "Copa ValencARc",
            Tournament::Cd2 => "Copa D2",
            Tournament::Cd3 => "Copa D3",
            Tournament::Izoro => "Copa Intrazonal de Oro",
            Tournament::Izplata => "Copa Intrazonal de Plata",
            Tournament::Custom => "Custom",
        }
    }

    /// Knockout cups have no standings table, so form defaults to "DDDDD" and the
    /// cup odds model applies. Maradei publishes a table and stays on the regular model.
    pub fn is_knockout(self) -> bool {
        matches!(
            self,
            Tournament::Cv
                | Tournament::Izoro
                | Tournament::Izplata
                | Tournament::Cd2
                | Tournament::Cd3
        )
    }

    /// The division a league tournament maps to, if any.
    pub fn league(self) -> Option<League> {
        match self {
            Tournament::D1 => Some(League::D1),
            Tournament::D2 => Some(League::D2),
            Tournament::D3 => Some(League::D3),
            _ => None,
        }
    }

    pub fn cup_factor(self, league1: League, league2: League) -> CupFactor {
        let mut f = CupFactor::default();
        match self {
            Tournament::Maradei => {
                f.team1 *= match league1 {
                    League::D1 => 1.25,
                    League::D2 => 0.9,
                    _ => 1.0,
                };
                f.team2 *= match league2 {
                    League::D1 => 1.25,
                    League::D2 => 0.9,
                    _ => 1.0,
                };
            }
            Tournament::Izoro => {
                if league1 == League::D1 {
                    f.team1 *= 1.15;
                }
                if league2 == League::D1 {
                    f.team2 *= 1.15;
                }
            }
            Tournament::Izplata => {
                if league1 == League::D2 {
                    f.team1 *= 1.12;
                }
                if league2 == League::D2 {
                    f.team2 *= 1.12;
                }
            }
            // ValencARc and the divisional cups are level playing fields.
            _ => {}
        }
        f
    }
}

impl fmt::Display for Tournament {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Tournament {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let key = raw.trim().to_ascii_lowercase();
        ALL_TOURNAMENTS
            .iter()
            .copied()
            .find(|t| t.code() == key || t.display_name().to_ascii_lowercase() == key)
            .ok_or_else(|| CoreError::UnknownTournament(raw.trim().to_string()))
    }
}
