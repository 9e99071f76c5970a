use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::market::SpecialMarket;
use crate::odds;
use crate::schedule::{generate_id, strip_tag};
use crate::state::{
    AccountChange, Bet, BetKind, BetStatus, Book, Delta, Match, Outcome, Score, SpecialLeg,
    UserAccount,
};

/// What the user wants to back. Odds are resolved at placement and frozen on the bet.
#[derive(Debug, Clone, PartialEq)]
pub enum BetRequest {
    Simple(Outcome),
    ExactScore(Score),
    Special(SpecialMarket),
    Combined(Vec<SpecialMarket>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub bet: Bet,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub amount: f64,
    pub from_balance: f64,
    pub to_balance: f64,
}

/// Creates the account with the book's default balance on first contact. Returns whether
/// a new account was made.
pub fn ensure_user(book: &mut Book, user_id: &str, username: Option<&str>) -> bool {
    if book.users.contains_key(user_id) {
        return false;
    }
    let user = UserAccount::new(user_id, username, book.default_balance);
    info!(user_id, balance = user.balance, "user created");
    book.apply(vec![Delta::InsertUser(user)]);
    true
}

fn check_amount(amount: f64) -> CoreResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(CoreError::InvalidAmount(amount));
    }
    Ok(())
}

/// Validates and records a wager: debits the stake, counts the bet and attaches it to
/// the match. Nothing is written unless every check passes.
pub fn place_bet<R: Rng + ?Sized>(
    book: &mut Book,
    user_id: &str,
    match_id: &str,
    request: BetRequest,
    amount: f64,
    now: DateTime<Utc>,
    rng: &mut R,
) -> CoreResult<Placement> {
    let m = book
        .matches
        .get(match_id)
        .ok_or_else(|| CoreError::MatchNotFound(match_id.to_string()))?;
    if !m.is_upcoming() {
        return Err(CoreError::NotEligible(format!(
            "match {match_id} is already {}",
            m.status.code()
        )));
    }
    check_amount(amount)?;

    let existing = book.users.get(user_id);
    let balance = existing.map_or(book.default_balance, |u| u.balance);
    if balance < amount {
        return Err(CoreError::InsufficientFunds { balance, amount });
    }

    let (kind, bet_odds, description) = price_request(book, m, request)?;
    let bet = Bet {
        id: generate_id(now, rng),
        user_id: user_id.to_string(),
        match_id: match_id.to_string(),
        kind,
        amount,
        odds: bet_odds,
        status: BetStatus::Pending,
        description,
        placed_at: now,
        result: None,
    };

    let mut deltas = Vec::with_capacity(4);
    if existing.is_none() {
        deltas.push(Delta::InsertUser(UserAccount::new(
            user_id,
            None,
            book.default_balance,
        )));
    }
    deltas.push(Delta::InsertBet(bet.clone()));
    deltas.push(Delta::AdjustUser {
        user_id: user_id.to_string(),
        change: AccountChange {
            balance: -amount,
            total_bets: 1,
            ..AccountChange::default()
        },
    });
    deltas.push(Delta::AttachBet {
        match_id: match_id.to_string(),
        bet_id: bet.id.clone(),
    });
    book.apply(deltas);

    let balance = book.balance(user_id).unwrap_or(balance - amount);
    info!(
        bet_id = %bet.id,
        user_id,
        match_id,
        kind = bet.kind.code(),
        amount,
        odds = bet.odds,
        "bet placed"
    );
    Ok(Placement { bet, balance })
}

fn price_request(book: &Book, m: &Match, request: BetRequest) -> CoreResult<(BetKind, f64, String)> {
    let home = book.teams.get(&m.team1);
    let away = book.teams.get(&m.team2);
    let home_name = strip_tag(&m.team1);
    let away_name = strip_tag(&m.team2);

    let priced = match request {
        BetRequest::Simple(prediction) => {
            let description = match prediction {
                Outcome::Team1 => format!("{home_name} win"),
                Outcome::Team2 => format!("{away_name} win"),
                Outcome::Draw => "Draw".to_string(),
            };
            (
                BetKind::Simple { prediction },
                m.odds.for_outcome(prediction),
                description,
            )
        }
        BetRequest::ExactScore(score) => (
            BetKind::ExactScore { exact_score: score },
            odds::exact_score_odds(home, away, score),
            format!("Exact score {score}"),
        ),
        BetRequest::Special(market) => (
            BetKind::Special {
                special_type: market,
            },
            odds::special_market_odds(home, away, market),
            market.label(&home_name, &away_name),
        ),
        BetRequest::Combined(markets) => {
            if markets.is_empty() {
                return Err(CoreError::InvalidBet(
                    "a combined bet needs at least one market".to_string(),
                ));
            }
            let mut seen = BTreeSet::new();
            if let Some(dup) = markets.iter().find(|mk| !seen.insert(**mk)) {
                return Err(CoreError::InvalidBet(format!("market {dup} listed twice")));
            }
            let legs: Vec<SpecialLeg> = markets
                .iter()
                .map(|market| SpecialLeg {
                    market: *market,
                    name: market.label(&home_name, &away_name),
                    odds: odds::special_market_odds(home, away, *market),
                })
                .collect();
            let combined = odds::combined_special_odds(home, away, &markets);
            let description = legs
                .iter()
                .map(|l| l.name.as_str())
                .collect::<Vec<_>>()
                .join(" + ");
            (
                BetKind::SpecialCombined { special_bets: legs },
                combined,
                description,
            )
        }
    };
    Ok(priced)
}

/// Moves money between accounts. Admin grants mint money instead of debiting the sender.
pub fn transfer(
    book: &mut Book,
    from: &str,
    to: &str,
    amount: f64,
    is_admin: bool,
) -> CoreResult<Transfer> {
    check_amount(amount)?;
    let from_balance = book.balance(from).unwrap_or(book.default_balance);
    if !is_admin && from_balance < amount {
        return Err(CoreError::InsufficientFunds {
            balance: from_balance,
            amount,
        });
    }

    let mut deltas = Vec::new();
    let mut ids = vec![from];
    if to != from {
        ids.push(to);
    }
    for id in ids {
        if !book.users.contains_key(id) {
            deltas.push(Delta::InsertUser(UserAccount::new(
                id,
                None,
                book.default_balance,
            )));
        }
    }
    if !is_admin {
        deltas.push(Delta::AdjustUser {
            user_id: from.to_string(),
            change: AccountChange {
                balance: -amount,
                ..AccountChange::default()
            },
        });
    }
    deltas.push(Delta::AdjustUser {
        user_id: to.to_string(),
        change: AccountChange {
            balance: amount,
            ..AccountChange::default()
        },
    });
    book.apply(deltas);

    let out = Transfer {
        amount,
        from_balance: book.balance(from).unwrap_or_default(),
        to_balance: book.balance(to).unwrap_or_default(),
    };
    info!(from, to, amount, is_admin, "balance transfer");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::state::{MatchOdds, MatchStatus};
    use crate::tournament::Tournament;

    fn book_with_match() -> Book {
        let mut book = Book::default();
        book.matches.insert(
            "m1".to_string(),
            Match {
                id: "m1".to_string(),
                team1: "Halcones (D1)".to_string(),
                team2: "Toros (D1)".to_string(),
                odds: MatchOdds {
                    team1: 2.5,
                    draw: 3.4,
                    team2: 2.8,
                },
                match_time: Utc.with_ymd_and_hms(2026, 5, 1, 20, 0, 0).unwrap(),
                status: MatchStatus::Upcoming,
                result: None,
                score: None,
                bets: Vec::new(),
                tournament: Tournament::D1,
                is_custom: true,
            },
        );
        book
    }

    #[test]
    fn failed_placement_leaves_book_untouched() {
        let mut book = book_with_match();
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc::now();

        let err = place_bet(&mut book, "u1", "m1", BetRequest::Simple(Outcome::Draw), 0.0, now, &mut rng)
            .unwrap_err();
        assert_eq!(err, CoreError::InvalidAmount(0.0));
        let err = place_bet(
            &mut book,
            "u1",
            "m1",
            BetRequest::Combined(vec![SpecialMarket::CornerGoal, SpecialMarket::CornerGoal]),
            10.0,
            now,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidBet(_)));
        assert!(book.users.is_empty());
        assert!(book.bets.is_empty());
    }

    #[test]
    fn simple_bet_snapshots_match_odds() {
        let mut book = book_with_match();
        let mut rng = StdRng::seed_from_u64(7);
        let placed = place_bet(
            &mut book,
            "u1",
            "m1",
            BetRequest::Simple(Outcome::Team1),
            100.0,
            Utc::now(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(placed.bet.odds, 2.5);
        assert_eq!(placed.bet.description, "Halcones win");
        assert!((placed.balance - 900.0).abs() < 1e-9);
        assert_eq!(book.users["u1"].total_bets, 1);
        assert_eq!(book.matches["m1"].bets, vec![placed.bet.id.clone()]);
    }

    #[test]
    fn descriptions_keep_text_after_the_tag() {
        let mut book = book_with_match();
        if let Some(m) = book.matches.get_mut("m1") {
            m.team2 = "Real Norte (CV) B".to_string();
        }
        let mut rng = StdRng::seed_from_u64(7);
        let placed = place_bet(
            &mut book,
            "u1",
            "m1",
            BetRequest::Simple(Outcome::Team2),
            10.0,
            Utc::now(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(placed.bet.description, "Real Norte B win");
        assert_eq!(placed.bet.description, format!("{} win", strip_tag("Real Norte (CV) B")));
    }

    #[test]
    fn non_admin_transfer_needs_funds() {
        let mut book = Book::default();
        let err = transfer(&mut book, "a", "b", 5000.0, false).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));
        assert!(book.users.is_empty());

        let t = transfer(&mut book, "a", "b", 5000.0, true).unwrap();
        assert!((t.from_balance - 1000.0).abs() < 1e-9);
        assert!((t.to_balance - 6000.0).abs() < 1e-9);
    }
}
