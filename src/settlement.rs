//! Resolution of a match and every wager attached to it.
//!
//! Verdicts are pure functions of the final score and the event flags. [`resolve_match`]
//! computes all of them, turns them into one batch of [`Delta`]s and applies the batch
//! in a single pass, so a failure can only happen before anything is written.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::market::{SpecialFlags, SpecialMarket};
use crate::state::{
    AccountChange, Bet, BetKind, BetStatus, Book, Delta, MatchResult, MatchStatus, Outcome,
    Score,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub bet_id: String,
    pub user_id: String,
    pub won: bool,
    /// Stake times odds for winners, zero otherwise.
    pub payout: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub match_id: String,
    pub outcome: Outcome,
    pub score: Score,
    pub verdicts: Vec<Verdict>,
    /// Balance of every user that had a wager on the match, after payouts.
    pub balances: BTreeMap<String, f64>,
}

impl Settlement {
    pub fn total_paid(&self) -> f64 {
        self.verdicts.iter().map(|v| v.payout).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deletion {
    pub match_id: String,
    pub bets_cancelled: usize,
    pub refunded: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkDeletion {
    pub matches: usize,
    pub bets_cancelled: usize,
    pub refunded: f64,
}

/// Whether a single special market happened. Score markets read the score; event
/// markets need an explicit `true` flag.
pub fn market_hits(market: SpecialMarket, score: Score, flags: &SpecialFlags) -> bool {
    match market {
        SpecialMarket::BothTeamsScore => score.home > 0 && score.away > 0,
        SpecialMarket::TotalGoalsOver2_5 => score.total() >= 3,
        SpecialMarket::TotalGoalsUnder2_5 => score.total() <= 2,
        SpecialMarket::HomeGoalsOver1_5 => score.home >= 2,
        SpecialMarket::AwayGoalsOver1_5 => score.away >= 2,
        _ => flags.is_set(market),
    }
}

pub fn bet_wins(kind: &BetKind, outcome: Outcome, score: Score, flags: &SpecialFlags) -> bool {
    match kind {
        BetKind::Simple { prediction } => *prediction == outcome,
        BetKind::ExactScore { exact_score } => *exact_score == score,
        BetKind::Special { special_type } => market_hits(*special_type, score, flags),
        BetKind::SpecialCombined { special_bets } => special_bets
            .iter()
            .all(|leg| market_hits(leg.market, score, flags)),
    }
}

pub fn validate_result(outcome: Outcome, score: Score) -> CoreResult<()> {
    if score.outcome() != outcome {
        return Err(CoreError::InvalidResult {
            outcome: outcome.code().to_string(),
            home: score.home,
            away: score.away,
        });
    }
    Ok(())
}

fn verdict(bet: &Bet, outcome: Outcome, score: Score, flags: &SpecialFlags) -> Verdict {
    let won = bet_wins(&bet.kind, outcome, score, flags);
    Verdict {
        bet_id: bet.id.clone(),
        user_id: bet.user_id.clone(),
        won,
        payout: if won { bet.amount * bet.odds } else { 0.0 },
    }
}

/// Finishes an upcoming match and settles its wagers.
pub fn resolve_match(
    book: &mut Book,
    match_id: &str,
    outcome: Outcome,
    score: Score,
    flags: SpecialFlags,
    is_manual: bool,
    now: DateTime<Utc>,
) -> CoreResult<Settlement> {
    let m = book
        .matches
        .get(match_id)
        .ok_or_else(|| CoreError::MatchNotFound(match_id.to_string()))?;
    if m.status != MatchStatus::Upcoming {
        return Err(CoreError::AlreadyResolved(match_id.to_string()));
    }
    validate_result(outcome, score)?;

    let verdicts: Vec<Verdict> = book
        .bets_for_match(match_id)
        .into_iter()
        .filter(|b| b.status == BetStatus::Pending)
        .map(|b| verdict(b, outcome, score, &flags))
        .collect();

    let mut deltas = Vec::with_capacity(1 + verdicts.len() * 2);
    deltas.push(Delta::FinishMatch {
        match_id: match_id.to_string(),
        record: MatchResult {
            result: outcome,
            score,
            timestamp: now,
            is_manual,
            special_results: flags,
        },
    });
    for v in &verdicts {
        debug!(bet_id = %v.bet_id, won = v.won, payout = v.payout, "bet verdict");
        deltas.push(Delta::SettleBet {
            bet_id: v.bet_id.clone(),
            status: if v.won { BetStatus::Won } else { BetStatus::Lost },
            result: outcome,
        });
        let change = if v.won {
            AccountChange {
                balance: v.payout,
                won_bets: 1,
                winnings: v.payout,
                ..AccountChange::default()
            }
        } else {
            AccountChange {
                lost_bets: 1,
                ..AccountChange::default()
            }
        };
        deltas.push(Delta::AdjustUser {
            user_id: v.user_id.clone(),
            change,
        });
    }
    book.apply(deltas);

    let users: BTreeSet<&str> = verdicts.iter().map(|v| v.user_id.as_str()).collect();
    let balances = users
        .into_iter()
        .filter_map(|u| book.balance(u).map(|b| (u.to_string(), b)))
        .collect();

    let settlement = Settlement {
        match_id: match_id.to_string(),
        outcome,
        score,
        verdicts,
        balances,
    };
    info!(
        match_id,
        outcome = outcome.code(),
        score = %score,
        bets = settlement.verdicts.len(),
        paid = settlement.total_paid(),
        is_manual,
        "match resolved"
    );
    Ok(settlement)
}

/// Refund deltas for every pending wager on a match, plus the removals.
fn cancel_match_deltas(book: &Book, match_id: &str, deltas: &mut Vec<Delta>) -> (usize, f64) {
    let mut cancelled = 0;
    let mut refunded = 0.0;
    for bet in book.bets_for_match(match_id) {
        if bet.status != BetStatus::Pending {
            continue;
        }
        deltas.push(Delta::AdjustUser {
            user_id: bet.user_id.clone(),
            change: AccountChange {
                balance: bet.amount,
                total_bets: -1,
                ..AccountChange::default()
            },
        });
        deltas.push(Delta::RemoveBet(bet.id.clone()));
        cancelled += 1;
        refunded += bet.amount;
    }
    deltas.push(Delta::RemoveMatch(match_id.to_string()));
    (cancelled, refunded)
}

/// Cancels an upcoming match, refunding every pending stake.
pub fn delete_match(book: &mut Book, match_id: &str) -> CoreResult<Deletion> {
    let m = book
        .matches
        .get(match_id)
        .ok_or_else(|| CoreError::MatchNotFound(match_id.to_string()))?;
    if m.status == MatchStatus::Finished {
        return Err(CoreError::NotEligible(format!(
            "match {match_id} is finished and cannot be deleted"
        )));
    }

    let mut deltas = Vec::new();
    let (bets_cancelled, refunded) = cancel_match_deltas(book, match_id, &mut deltas);
    book.apply(deltas);

    info!(match_id, bets_cancelled, refunded, "match deleted");
    Ok(Deletion {
        match_id: match_id.to_string(),
        bets_cancelled,
        refunded,
    })
}

pub fn delete_all_upcoming(book: &mut Book) -> CoreResult<BulkDeletion> {
    let mut ids: Vec<String> = book
        .matches
        .values()
        .filter(|m| m.is_upcoming())
        .map(|m| m.id.clone())
        .collect();
    if ids.is_empty() {
        return Err(CoreError::NotEligible("no upcoming matches to delete".to_string()));
    }
    ids.sort();

    let mut deltas = Vec::new();
    let mut out = BulkDeletion {
        matches: ids.len(),
        bets_cancelled: 0,
        refunded: 0.0,
    };
    for id in &ids {
        let (n, amount) = cancel_match_deltas(book, id, &mut deltas);
        out.bets_cancelled += n;
        out.refunded += amount;
    }
    book.apply(deltas);

    info!(
        matches = out.matches,
        bets_cancelled = out.bets_cancelled,
        refunded = out.refunded,
        "upcoming matches deleted"
    );
    Ok(out)
}

/// Prunes finished matches and their result records. Settled wagers stay for history.
pub fn delete_finished(book: &mut Book) -> CoreResult<usize> {
    let ids: Vec<String> = book
        .matches
        .values()
        .filter(|m| m.status == MatchStatus::Finished)
        .map(|m| m.id.clone())
        .collect();
    if ids.is_empty() {
        return Err(CoreError::NotEligible("no finished matches to delete".to_string()));
    }

    let count = ids.len();
    let deltas = ids
        .into_iter()
        .flat_map(|id| [Delta::RemoveResult(id.clone()), Delta::RemoveMatch(id)])
        .collect();
    book.apply(deltas);

    info!(matches = count, "finished matches pruned");
    Ok(count)
}
