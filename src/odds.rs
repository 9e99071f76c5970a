use rayon::prelude::*;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::market::SpecialMarket;
use crate::state::{League, MatchOdds, Score, Team, TeamLookup};
use crate::strength::{self, FormCounts, Side};
use crate::tournament::Tournament;

const REGULAR_MARGIN: f64 = 0.08;
const CUP_MARGIN: f64 = 0.03;

const REGULAR_TEAM_ODDS: (f64, f64) = (1.01, 50.0);
const REGULAR_DRAW_ODDS: (f64, f64) = (2.5, 20.0);
const CUP_TEAM_ODDS: (f64, f64) = (1.05, 30.0);
const CUP_DRAW_ODDS: (f64, f64) = (3.2, 10.0);

const EXACT_SCORE_ODDS: (f64, f64) = (4.0, 80.0);
const SPECIAL_ODDS: (f64, f64) = (1.1, 100.0);

/// One row of the all-pairs odds board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardRow {
    pub team1: String,
    pub team2: String,
    pub odds: MatchOdds,
}

/// Three-way decimal odds for `team1` vs `team2`. Knockout cups use the cup model,
/// everything else (including no tournament) the regular-season model.
pub fn compute_match_odds<L: TeamLookup + ?Sized>(
    lookup: &L,
    team1: &str,
    team2: &str,
    tournament: Option<Tournament>,
) -> CoreResult<MatchOdds> {
    let t1 = lookup.team(team1).ok_or_else(|| unknown_team(team1))?;
    let t2 = lookup.team(team2).ok_or_else(|| unknown_team(team2))?;
    let odds = odds_for_teams(t1, t2, tournament);
    debug!(
        team1,
        team2,
        tournament = tournament.map(|t| t.code()).unwrap_or("none"),
        odds_team1 = odds.team1,
        odds_draw = odds.draw,
        odds_team2 = odds.team2,
        "match odds computed"
    );
    Ok(odds)
}

fn unknown_team(query: &str) -> CoreError {
    CoreError::UnknownTeam {
        query: query.to_string(),
        suggestions: Vec::new(),
    }
}

pub fn odds_for_teams(t1: &Team, t2: &Team, tournament: Option<Tournament>) -> MatchOdds {
    match tournament {
        Some(t) if t.is_knockout() => cup_odds(Side::of(t1), Side::of(t2), t),
        _ => regular_odds(Side::of(t1), Side::of(t2)),
    }
}

fn regular_odds(a: Side<'_>, b: Side<'_>) -> MatchOdds {
    let (s1, s2) = strength::regular_pair_strengths(a, b);
    let total = s1 + s2;
    let draw = regular_draw_probability(a, b, s1, s2);
    let p1 = s1 / total * (1.0 - draw);
    let p2 = s2 / total * (1.0 - draw);

    let mut odds = MatchOdds {
        team1: price(p1, REGULAR_MARGIN, REGULAR_TEAM_ODDS),
        draw: price(draw, REGULAR_MARGIN, REGULAR_DRAW_ODDS),
        team2: price(p2, REGULAR_MARGIN, REGULAR_TEAM_ODDS),
    };
    apply_final_limits(&mut odds, a, b);
    round_odds(odds)
}

fn regular_draw_probability(a: Side<'_>, b: Side<'_>, s1: f64, s2: f64) -> f64 {
    let draw: f64 = if a.league != b.league {
        match s1.max(s2) / s1.min(s2) {
            r if r > 8.0 => 0.08,
            r if r > 5.0 => 0.10,
            _ => 0.12,
        }
    } else {
        let avg = (a.position + b.position) as f64 / 2.0;
        if avg <= 5.0 {
            0.18
        } else if avg <= 10.0 {
            0.22
        } else {
            0.25
        }
    };
    draw.clamp(0.08, 0.25)
}

/// (favourite cap, opponent floor, draw floor) when a top D1 side meets a weak D2 one.
fn final_limit(fav: Side<'_>, opp: Side<'_>) -> Option<(f64, f64, f64)> {
    if fav.league != League::D1 || opp.league != League::D2 {
        return None;
    }
    if fav.position <= 1 && opp.position >= 18 {
        Some((1.05, 25.0, 15.0))
    } else if fav.position <= 1 && opp.position >= 10 {
        Some((1.10, 15.0, 12.0))
    } else if fav.position <= 3 && opp.position >= 15 {
        Some((1.20, 12.0, 10.0))
    } else {
        None
    }
}

fn apply_final_limits(odds: &mut MatchOdds, a: Side<'_>, b: Side<'_>) {
    if let Some((cap, floor, draw_floor)) = final_limit(a, b) {
        odds.team1 = odds.team1.min(cap);
        odds.team2 = odds.team2.max(floor);
        odds.draw = odds.draw.max(draw_floor);
    } else if let Some((cap, floor, draw_floor)) = final_limit(b, a) {
        odds.team2 = odds.team2.min(cap);
        odds.team1 = odds.team1.max(floor);
        odds.draw = odds.draw.max(draw_floor);
    }
}

fn cup_odds(a: Side<'_>, b: Side<'_>, tournament: Tournament) -> MatchOdds {
    let (s1, s2) = strength::cup_pair_strengths(a, b, tournament);
    let total = s1 + s2;
    let draw = match s1.max(s2) / s1.min(s2) {
        r if r > 5.0 => 0.10,
        r if r > 3.0 => 0.12,
        r if r > 2.0 => 0.14,
        _ => 0.16,
    };
    let p1 = s1 / total * (1.0 - draw);
    let p2 = s2 / total * (1.0 - draw);

    round_odds(MatchOdds {
        team1: price(p1, CUP_MARGIN, CUP_TEAM_ODDS),
        draw: price(draw, CUP_MARGIN, CUP_DRAW_ODDS),
        team2: price(p2, CUP_MARGIN, CUP_TEAM_ODDS),
    })
}

fn price(probability: f64, margin: f64, (lo, hi): (f64, f64)) -> f64 {
    clamp((1.0 / probability) * (1.0 - margin), lo, hi)
}

fn round_odds(odds: MatchOdds) -> MatchOdds {
    MatchOdds {
        team1: round2(odds.team1),
        draw: round2(odds.draw),
        team2: round2(odds.team2),
    }
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// NaN collapses to the lower bound.
pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    if x.is_nan() {
        return lo;
    }
    x.max(lo).min(hi)
}

/// Odds for an exact final score. Team data only nudges the base table, and only when
/// both sides are known.
pub fn exact_score_odds(home: Option<&Team>, away: Option<&Team>, score: Score) -> f64 {
    let (h, a) = (score.home, score.away);
    let margin = h.abs_diff(a);
    let mut odds = match margin {
        0 => match h {
            0 => 8.5,
            1 => 6.5,
            2 => 12.0,
            _ => 25.0,
        },
        1 => {
            if h.max(a) <= 2 {
                5.5
            } else {
                9.0
            }
        }
        2 => {
            if h.max(a) <= 3 {
                7.5
            } else {
                15.0
            }
        }
        m => 20.0 + 8.0 * m as f64,
    };

    if let (Some(t1), Some(t2)) = (home, away) {
        let diff = t1.position_or_default().abs_diff(t2.position_or_default());
        if diff > 10 {
            odds *= 0.8;
        } else if diff < 3 {
            odds *= 1.3;
        }
    }
    clamp(round2(odds), EXACT_SCORE_ODDS.0, EXACT_SCORE_ODDS.1)
}

pub fn special_market_odds(home: Option<&Team>, away: Option<&Team>, market: SpecialMarket) -> f64 {
    let mut odds = market.base_odds();

    if let (Some(t1), Some(t2)) = (home, away) {
        let avg_position = (t1.position_or_default() + t2.position_or_default()) as f64 / 2.0;
        if avg_position <= 5.0 {
            if market.is_set_piece() {
                odds *= 0.85;
            }
        } else if avg_position >= 15.0 {
            odds *= 1.15;
        }

        let w1 = FormCounts::from_form(t1.form()).wins;
        let w2 = FormCounts::from_form(t2.form()).wins;
        let avg_wins = (w1 + w2) as f64 / 2.0;
        if avg_wins >= 4.0 {
            odds *= 0.9;
        } else if avg_wins <= 1.0 {
            odds *= 1.1;
        }
    }
    clamp(round2(odds), SPECIAL_ODDS.0, SPECIAL_ODDS.1)
}

/// Product of the per-leg odds. Legs are treated as independent; no correlation discount.
pub fn combined_special_odds(
    home: Option<&Team>,
    away: Option<&Team>,
    markets: &[SpecialMarket],
) -> f64 {
    markets
        .iter()
        .map(|m| special_market_odds(home, away, *m))
        .product()
}

/// Odds for every ordered pair of distinct teams, sorted by team names.
pub fn odds_board<L: TeamLookup + ?Sized>(lookup: &L, tournament: Option<Tournament>) -> Vec<BoardRow> {
    let teams = lookup.all_teams();
    let mut rows: Vec<BoardRow> = teams
        .par_iter()
        .flat_map_iter(|t1| {
            teams
                .iter()
                .filter(move |t2| t2.name != t1.name)
                .map(move |t2| BoardRow {
                    team1: t1.name.clone(),
                    team2: t2.name.clone(),
                    odds: odds_for_teams(t1, t2, tournament),
                })
        })
        .collect();
    rows.sort_by(|a, b| a.team1.cmp(&b.team1).then_with(|| a.team2.cmp(&b.team2)));
    debug!(rows = rows.len(), "odds board built");
    rows
}
