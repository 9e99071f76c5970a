//! Team strength heuristics.
//!
//! Strength is a unitless scalar that only means something relative to the opponent's.
//! Three variants exist: the regular-season model used for league odds, the knockout
//! model used for cup odds, and a milder additive model the simulator draws from.
//! The multiplier tables are hand-tuned and kept literal.

use crate::state::{League, Team};
use crate::tournament::Tournament;

const BASE_STRENGTH: f64 = 100.0;
const MIN_STRENGTH: f64 = 10.0;

/// W/D/L tallies of a recent-form string; other characters are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormCounts {
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
}

impl FormCounts {
    pub fn from_form(form: &str) -> Self {
        let mut out = Self::default();
        for ch in form.chars() {
            match ch.to_ascii_uppercase() {
                'W' => out.wins += 1,
                'D' => out.draws += 1,
                'L' => out.losses += 1,
                _ => {}
            }
        }
        out
    }
}

/// The inputs every strength variant needs for one side.
#[derive(Debug, Clone, Copy)]
pub struct Side<'a> {
    pub league: League,
    pub position: u32,
    pub form: &'a str,
}

impl<'a> Side<'a> {
    /// Reads a team with the mid-table and neutral-form defaults applied.
    pub fn of(team: &'a Team) -> Self {
        Self {
            league: team.league,
            position: team.position_or_default(),
            form: team.form(),
        }
    }
}

pub fn regular_strength(side: Side<'_>) -> f64 {
    let offset = match side.league {
        League::D1 => 150.0,
        League::D2 => 50.0,
        League::D3 => -50.0,
        League::Custom => 0.0,
    };
    let s = (BASE_STRENGTH + offset)
        * regular_position_multiplier(side.league, side.position)
        * regular_form_bonus(side.form);
    s.max(MIN_STRENGTH)
}

fn regular_position_multiplier(league: League, position: u32) -> f64 {
    // Columns: D1, D2, everything below.
    let row: [f64; 3] = match position {
        0 | 1 => [2.8, 2.2, 1.8],
        2 => [2.4, 1.9, 1.6],
        3 => [2.1, 1.7, 1.4],
        4..=5 => [1.8, 1.4, 1.2],
        6..=8 => [1.5, 1.1, 1.0],
        9..=12 => [1.2, 0.9, 0.8],
        13..=16 => [1.0, 0.7, 0.6],
        _ => [0.8, 0.5, 0.4],
    };
    match league {
        League::D1 => row[0],
        League::D2 => row[1],
        League::D3 | League::Custom => row[2],
    }
}

pub fn regular_form_bonus(form: &str) -> f64 {
    let c = FormCounts::from_form(form);
    let mut bonus: f64 = match c.wins {
        w if w >= 4 => 1.25,
        3 => 1.15,
        2 => 1.08,
        1 => 1.02,
        _ => 1.0,
    };
    bonus *= match c.losses {
        l if l >= 4 => 0.75,
        3 => 0.85,
        2 => 0.92,
        _ => 1.0,
    };
    bonus.clamp(0.7, 1.3)
}

/// Multiplier pair that widens the gap when a first-division side meets a second-division
/// one. Any other pairing is left alone.
pub fn inter_league_multipliers(a: (League, u32), b: (League, u32)) -> (f64, f64) {
    match (a.0, b.0) {
        (League::D1, League::D2) => d1_vs_d2_multipliers(a.1, b.1),
        (League::D2, League::D1) => {
            let (d1, d2) = d1_vs_d2_multipliers(b.1, a.1);
            (d2, d1)
        }
        _ => (1.0, 1.0),
    }
}

fn d1_vs_d2_multipliers(d1_pos: u32, d2_pos: u32) -> (f64, f64) {
    match d1_pos {
        0 | 1 => match d2_pos {
            p if p >= 18 => (8.0, 0.15),
            p if p >= 15 => (6.0, 0.2),
            p if p >= 10 => (4.5, 0.25),
            p if p >= 5 => (3.5, 0.35),
            _ => (2.8, 0.45),
        },
        2..=3 => match d2_pos {
            p if p >= 15 => (4.5, 0.25),
            p if p >= 8 => (3.2, 0.35),
            _ => (2.5, 0.5),
        },
        4..=8 => match d2_pos {
            p if p >= 15 => (3.0, 0.4),
            p if p >= 8 => (2.2, 0.55),
            _ => (1.8, 0.65),
        },
        _ => match d2_pos {
            p if p >= 15 => (2.0, 0.6),
            _ => (1.5, 0.75),
        },
    }
}

/// Regular-season strengths for a pairing, inter-league step included.
pub fn regular_pair_strengths(a: Side<'_>, b: Side<'_>) -> (f64, f64) {
    let mut s1 = regular_strength(a);
    let mut s2 = regular_strength(b);
    if a.league != b.league {
        let (m1, m2) = inter_league_multipliers((a.league, a.position), (b.league, b.position));
        s1 *= m1;
        s2 *= m2;
    }
    (s1, s2)
}

/// Single-side knockout strength, before the pairwise extreme-case step.
pub fn cup_strength(side: Side<'_>, tournament_multiplier: f64) -> f64 {
    let offset = match side.league {
        League::D1 => 60.0,
        League::D2 => 20.0,
        League::D3 => -30.0,
        League::Custom => 0.0,
    };
    (BASE_STRENGTH + offset)
        * cup_position_modifier(side.league, side.position)
        * cup_form_bonus(side.form)
        * tournament_multiplier
}

pub fn cup_position_modifier(league: League, position: u32) -> f64 {
    match league {
        League::D1 => match position {
            0 | 1 => 3.2,
            2 => 2.6,
            3 => 2.2,
            4..=5 => 1.8,
            6..=8 => 1.5,
            9..=12 => 1.2,
            13..=16 => 1.0,
            _ => 0.8,
        },
        League::D2 => match position {
            0 | 1 => 2.0,
            2 => 1.7,
            3 => 1.5,
            4..=5 => 1.3,
            6..=8 => 1.0,
            9..=12 => 0.8,
            13..=16 => 0.6,
            _ => 0.4,
        },
        League::D3 => match position {
            0 | 1 => 1.3,
            2..=3 => 1.0,
            4..=8 => 0.8,
            _ => 0.6,
        },
        League::Custom => 1.0,
    }
}

/// Steeper than the regular curve: form matters more in one-off ties.
pub fn cup_form_bonus(form: &str) -> f64 {
    let c = FormCounts::from_form(form);
    let mut bonus: f64 = match c.wins {
        w if w >= 4 => 1.35,
        3 => 1.25,
        2 => 1.15,
        1 => 1.05,
        _ => 0.85,
    };
    bonus *= match c.losses {
        l if l >= 4 => 0.65,
        3 => 0.75,
        2 => 0.85,
        _ => 1.0,
    };
    if c.losses == 0 && c.wins >= 2 {
        bonus *= 1.1;
    }
    bonus.clamp(0.5, 1.8)
}

/// Knockout strengths for a pairing, including the tournament factor and the
/// leader-versus-minnow multipliers.
pub fn cup_pair_strengths(a: Side<'_>, b: Side<'_>, tournament: Tournament) -> (f64, f64) {
    let factor = tournament.cup_factor(a.league, b.league);
    let mut s1 = cup_strength(a, factor.team1);
    let mut s2 = cup_strength(b, factor.team2);
    s1 *= cup_mismatch_multiplier(a, b);
    s2 *= cup_mismatch_multiplier(b, a);
    (s1, s2)
}

fn cup_mismatch_multiplier(own: Side<'_>, opp: Side<'_>) -> f64 {
    let mut m = 1.0;
    if own.league == League::D1 && own.position <= 1 {
        // A D2 side from 7th down takes the 4.0 arm; 6.0 is left for D3 opponents.
        m *= match opp.league {
            League::D2 if opp.position >= 7 => 4.0,
            League::D3 => 6.0,
            League::D2 if opp.position >= 4 => 2.5,
            _ => 1.0,
        };
    }
    if own.league == League::D1 && own.position <= 3 && opp.league == League::D2 && opp.position >= 8 {
        m *= 2.8;
    }
    m
}

/// Additive strength the simulator uses. Gentler than the odds models so that upsets
/// still happen.
pub fn simulation_strength(side: Side<'_>) -> f64 {
    let mut strength: f64 = 50.0;
    strength += match side.league {
        League::D1 => 25.0,
        League::D2 => 5.0,
        _ => 0.0,
    };
    strength += match side.position {
        0 | 1 => 35.0,
        2..=3 => 25.0,
        4..=6 => 15.0,
        7..=10 => 5.0,
        11..=15 => -10.0,
        _ => -20.0,
    };

    let mut points = 0u32;
    let mut win_streak = 0u32;
    let mut loss_streak = 0u32;
    let mut any_win = false;
    let mut any_loss = false;
    for ch in side.form.chars() {
        match ch.to_ascii_uppercase() {
            'W' => {
                points += 3;
                win_streak += 1;
                loss_streak = 0;
                any_win = true;
            }
            'D' => {
                points += 1;
                win_streak = 0;
                loss_streak = 0;
            }
            'L' => {
                win_streak = 0;
                loss_streak += 1;
                any_loss = true;
            }
            _ => {}
        }
    }

    strength += match points {
        p if p >= 13 => 20.0,
        p if p >= 10 => 15.0,
        p if p >= 7 => 5.0,
        p if p >= 4 => -10.0,
        _ => -20.0,
    };
    if win_streak >= 3 {
        strength += 15.0;
    } else if win_streak >= 2 {
        strength += 8.0;
    }
    if loss_streak >= 3 {
        strength -= 15.0;
    } else if loss_streak >= 2 {
        strength -= 8.0;
    }
    if !any_loss {
        strength += 12.0;
    }
    if !any_win {
        strength -= 15.0;
    }
    strength.clamp(15.0, 150.0)
}

/// Simulator's inter-league adjustment, returned as (first-division ×, second-division ×).
pub fn simulation_inter_league_factor(d1_pos: u32, d2_pos: u32) -> (f64, f64) {
    let q1 = (21.0 - d1_pos.clamp(1, 20) as f64) / 20.0;
    let q2 = (21.0 - d2_pos.clamp(1, 20) as f64) / 20.0;
    let gap = q1 - q2 + 0.3;
    let d1 = 1.0 + (gap * 2.0).max(0.2);
    let d2 = (1.0 - gap * 1.5).max(0.3);
    (d1, d2)
}

/// Simulator strengths for a pairing; the first-division side always gets the boost.
pub fn simulation_pair_strengths(a: Side<'_>, b: Side<'_>) -> (f64, f64) {
    let mut s1 = simulation_strength(a);
    let mut s2 = simulation_strength(b);
    match (a.league, b.league) {
        (League::D1, League::D2) => {
            let (m1, m2) = simulation_inter_league_factor(a.position, b.position);
            s1 *= m1;
            s2 *= m2;
        }
        (League::D2, League::D1) => {
            let (m1, m2) = simulation_inter_league_factor(b.position, a.position);
            s1 *= m2;
            s2 *= m1;
        }
        _ => {}
    }
    (s1, s2)
}
