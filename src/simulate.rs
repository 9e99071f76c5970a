use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::market::SpecialFlags;
use crate::settlement::{self, Settlement};
use crate::state::{Book, League, Match, Outcome, Score, TeamLookup};
use crate::strength::{self, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedResult {
    pub outcome: Outcome,
    pub score: Score,
}

/// Draws an outcome and a consistent score for an upcoming match. All randomness comes
/// from `rng`, so a seeded generator gives a reproducible result.
pub fn simulate_outcome<L, R>(lookup: &L, m: &Match, rng: &mut R) -> CoreResult<SimulatedResult>
where
    L: TeamLookup + ?Sized,
    R: Rng + ?Sized,
{
    if !m.is_upcoming() {
        return Err(CoreError::NotEligible(format!(
            "match {} is already {}",
            m.id,
            m.status.code()
        )));
    }
    let t1 = lookup.team(&m.team1).ok_or_else(|| CoreError::UnknownTeam {
        query: m.team1.clone(),
        suggestions: Vec::new(),
    })?;
    let t2 = lookup.team(&m.team2).ok_or_else(|| CoreError::UnknownTeam {
        query: m.team2.clone(),
        suggestions: Vec::new(),
    })?;
    let (a, b) = (Side::of(t1), Side::of(t2));

    let (s1, s2) = strength::simulation_pair_strengths(a, b);
    let p1 = s1 / (s1 + s2);
    let draw = if a.league != b.league {
        let avg = (a.position + b.position) as f64 / 2.0;
        if avg <= 5.0 {
            0.15
        } else if avg <= 15.0 {
            0.12
        } else {
            0.08
        }
    } else {
        0.22
    };

    let r: f64 = rng.gen_range(0.0..1.0);
    let outcome = if r < p1 * (1.0 - draw) {
        Outcome::Team1
    } else if r < 1.0 - draw {
        Outcome::Team2
    } else {
        Outcome::Draw
    };

    let score = match outcome {
        Outcome::Team1 => {
            let (w, l) = winner_loser_goals(a.league, b.league, rng);
            Score::new(w, l)
        }
        Outcome::Team2 => {
            let (w, l) = winner_loser_goals(b.league, a.league, rng);
            Score::new(l, w)
        }
        Outcome::Draw => {
            let g = rng.gen_range(0..=2);
            Score::new(g, g)
        }
    };
    Ok(SimulatedResult { outcome, score })
}

fn winner_loser_goals<R: Rng + ?Sized>(winner: League, loser: League, rng: &mut R) -> (u32, u32) {
    if winner == League::D1 && loser == League::D2 {
        (rng.gen_range(2..=5), rng.gen_range(0..=1))
    } else {
        let w = rng.gen_range(1..=3);
        (w, rng.gen_range(0..w))
    }
}

/// Simulates and settles in one step. A finished match is `AlreadyResolved`, as with a
/// manual result. The simulated score is handed to settlement, so exact-score and
/// score-based special wagers resolve against it; event markets lose.
pub fn simulate_match<R: Rng + ?Sized>(
    book: &mut Book,
    match_id: &str,
    rng: &mut R,
    now: DateTime<Utc>,
) -> CoreResult<Settlement> {
    let m = book
        .matches
        .get(match_id)
        .ok_or_else(|| CoreError::MatchNotFound(match_id.to_string()))?;
    if !m.is_upcoming() {
        return Err(CoreError::AlreadyResolved(match_id.to_string()));
    }
    let sim = simulate_outcome(&*book, m, rng)?;
    info!(match_id, outcome = sim.outcome.code(), score = %sim.score, "match simulated");
    settlement::resolve_match(
        book,
        match_id,
        sim.outcome,
        sim.score,
        SpecialFlags::new(),
        false,
        now,
    )
}
