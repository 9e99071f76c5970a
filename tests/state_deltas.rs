use chrono::{TimeZone, Utc};

use matchday_odds::market::{SpecialFlags, SpecialMarket};
use matchday_odds::state::{
    AccountChange, Book, Delta, League, Match, MatchOdds, MatchResult, MatchStatus, Outcome,
    Score, Team, UserAccount, apply_delta,
};
use matchday_odds::tournament::Tournament;

fn fixture(id: &str) -> Match {
    Match {
        id: id.to_string(),
        team1: "HOME (D1)".to_string(),
        team2: "AWAY (D1)".to_string(),
        odds: MatchOdds {
            team1: 1.9,
            draw: 3.6,
            team2: 4.1,
        },
        match_time: Utc.with_ymd_and_hms(2026, 2, 1, 15, 0, 0).unwrap(),
        status: MatchStatus::Upcoming,
        result: None,
        score: None,
        bets: Vec::new(),
        tournament: Tournament::D1,
        is_custom: false,
    }
}

#[test]
fn insert_user_keeps_an_existing_account() {
    let mut book = Book::default();
    let mut rich = UserAccount::new("u1", Some("first"), 1000.0);
    rich.balance = 4321.0;
    apply_delta(&mut book, Delta::InsertUser(rich));
    apply_delta(
        &mut book,
        Delta::InsertUser(UserAccount::new("u1", Some("second"), 1000.0)),
    );

    let user = &book.users["u1"];
    assert_eq!(user.username, "first");
    assert_eq!(user.balance, 4321.0);
}

#[test]
fn finish_match_updates_the_fixture_and_records_the_result() {
    let mut book = Book::default();
    apply_delta(&mut book, Delta::InsertMatch(fixture("m1")));
    let record = MatchResult {
        result: Outcome::Team2,
        score: Score::new(0, 2),
        timestamp: Utc.with_ymd_and_hms(2026, 2, 1, 17, 0, 0).unwrap(),
        is_manual: false,
        special_results: SpecialFlags::new().with(SpecialMarket::HeaderGoal),
    };
    apply_delta(
        &mut book,
        Delta::FinishMatch {
            match_id: "m1".to_string(),
            record: record.clone(),
        },
    );

    let m = &book.matches["m1"];
    assert_eq!(m.status, MatchStatus::Finished);
    assert_eq!(m.result, Some(Outcome::Team2));
    assert_eq!(m.score, Some(Score::new(0, 2)));
    assert_eq!(book.results["m1"], record);
}

#[test]
fn attach_to_missing_match_is_ignored() {
    let mut book = Book::default();
    apply_delta(
        &mut book,
        Delta::AttachBet {
            match_id: "ghost".to_string(),
            bet_id: "b1".to_string(),
        },
    );
    assert!(book.matches.is_empty());
    assert!(book.bets_for_match("ghost").is_empty());
}

#[test]
fn adjust_user_accumulates_counters() {
    let mut book = Book::new(200.0);
    for change in [
        AccountChange {
            balance: -50.0,
            total_bets: 1,
            ..AccountChange::default()
        },
        AccountChange {
            balance: 125.0,
            won_bets: 1,
            winnings: 125.0,
            ..AccountChange::default()
        },
        AccountChange {
            lost_bets: 1,
            ..AccountChange::default()
        },
    ] {
        apply_delta(
            &mut book,
            Delta::AdjustUser {
                user_id: "u9".to_string(),
                change,
            },
        );
    }

    let user = &book.users["u9"];
    assert!((user.balance - 275.0).abs() < 1e-9);
    assert_eq!((user.total_bets, user.won_bets, user.lost_bets), (1, 1, 1));
    assert!((user.total_winnings - 125.0).abs() < 1e-9);
}

#[test]
fn upsert_team_replaces_by_display_name() {
    let mut book = Book::default();
    apply_delta(
        &mut book,
        Delta::UpsertTeam(Team::new("Halcones", League::D1, Some(9), "LLLLL", Tournament::D1)),
    );
    apply_delta(
        &mut book,
        Delta::UpsertTeam(Team::new("Halcones", League::D1, Some(2), "WWWWW", Tournament::D1)),
    );
    assert_eq!(book.teams.len(), 1);
    assert_eq!(book.teams["Halcones (D1)"].position, Some(2));
}

#[test]
fn empty_batch_is_a_no_op() {
    let mut book = Book::default();
    book.apply(Vec::new());
    assert!(book.users.is_empty());
}
