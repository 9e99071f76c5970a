use chrono::{TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;

use matchday_odds::error::CoreError;
use matchday_odds::schedule::create_custom_match;
use matchday_odds::simulate::{simulate_match, simulate_outcome};
use matchday_odds::state::{BetStatus, Book, League, Outcome, Score, Team};
use matchday_odds::tournament::Tournament;
use matchday_odds::wager::{BetRequest, place_bet};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 2, 18, 0, 0).unwrap()
}

fn book_with(teams: &[Team]) -> Book {
    let mut book = Book::default();
    for t in teams {
        book.teams.insert(t.name.clone(), t.clone());
    }
    book
}

#[test]
fn same_seed_same_result_and_score_agrees_with_outcome() {
    let home = Team::new("Halcones", League::D1, Some(6), "WDLWD", Tournament::D1);
    let away = Team::new("Toros", League::D1, Some(9), "DDWLL", Tournament::D1);
    let mut book = book_with(&[home.clone(), away.clone()]);
    let mut rng = StdRng::seed_from_u64(1);
    let m = create_custom_match(&mut book, "Halcones", "Toros", None, &mut rng, now()).unwrap();

    for seed in 0..200 {
        let a = simulate_outcome(&book, &m, &mut StdRng::seed_from_u64(seed)).unwrap();
        let b = simulate_outcome(&book, &m, &mut StdRng::seed_from_u64(seed)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.score.outcome(), a.outcome, "seed {seed}: {:?}", a);
        if a.outcome == Outcome::Draw {
            assert!(a.score.home <= 2);
        } else {
            assert!(a.score.home.max(a.score.away) <= 3);
        }
    }
}

#[test]
fn first_division_leader_beats_bottom_second_division_side_in_either_order() {
    let leader = Team::new("Leader", League::D1, Some(1), "WWWWW", Tournament::D1);
    let bottom = Team::new("Bottom", League::D2, Some(20), "LLLLL", Tournament::D2);
    let mut book = book_with(&[leader.clone(), bottom.clone()]);
    let mut rng = StdRng::seed_from_u64(7);
    let home_leader =
        create_custom_match(&mut book, &leader.name, &bottom.name, None, &mut rng, now()).unwrap();
    let away_leader =
        create_custom_match(&mut book, &bottom.name, &leader.name, None, &mut rng, now()).unwrap();

    let mut rng = StdRng::seed_from_u64(2026);
    let mut home_wins = 0;
    let mut away_wins = 0;
    for _ in 0..1000 {
        let r = simulate_outcome(&book, &home_leader, &mut rng).unwrap();
        if r.outcome == Outcome::Team1 {
            home_wins += 1;
            assert!((2..=5).contains(&r.score.home) && r.score.away <= 1, "{r:?}");
        }
        if simulate_outcome(&book, &away_leader, &mut rng).unwrap().outcome == Outcome::Team2 {
            away_wins += 1;
        }
    }
    assert!(home_wins > 700, "{home_wins}");
    assert!(away_wins > 700, "{away_wins}");
}

#[test]
fn finished_or_unknown_matches_cannot_be_simulated() {
    let home = Team::new("Halcones", League::D2, Some(3), "WWDWL", Tournament::D2);
    let away = Team::new("Toros", League::D2, Some(12), "LLDWD", Tournament::D2);
    let mut book = book_with(&[home, away]);
    let mut rng = StdRng::seed_from_u64(5);
    let m = create_custom_match(&mut book, "Halcones", "Toros", None, &mut rng, now()).unwrap();

    simulate_match(&mut book, &m.id, &mut rng, now()).unwrap();
    let finished = book.matches[&m.id].clone();
    assert!(matches!(
        simulate_outcome(&book, &finished, &mut rng),
        Err(CoreError::NotEligible(_))
    ));
    assert_eq!(
        simulate_match(&mut book, &m.id, &mut rng, now()),
        Err(CoreError::AlreadyResolved(m.id.clone()))
    );
    assert_eq!(book.matches[&m.id], finished);
    assert_eq!(
        simulate_match(&mut book, "missing", &mut rng, now()),
        Err(CoreError::MatchNotFound("missing".to_string()))
    );
}

#[test]
fn missing_team_records_are_reported() {
    let home = Team::new("Halcones", League::D1, Some(2), "WWWDW", Tournament::D1);
    let away = Team::new("Toros", League::D1, Some(4), "WDWDW", Tournament::D1);
    let mut book = book_with(&[home.clone(), away]);
    let mut rng = StdRng::seed_from_u64(9);
    let m = create_custom_match(&mut book, "Halcones", "Toros", None, &mut rng, now()).unwrap();
    book.teams.remove(&home.name);

    let err = simulate_outcome(&book, &m, &mut rng).unwrap_err();
    assert!(matches!(err, CoreError::UnknownTeam { ref query, .. } if *query == home.name));
}

#[test]
fn simulated_score_settles_score_based_wagers() {
    let home = Team::new("Halcones", League::D1, Some(5), "WDWDW", Tournament::D1);
    let away = Team::new("Toros", League::D1, Some(7), "DWDLW", Tournament::D1);
    let mut book = book_with(&[home, away]);
    let mut rng = StdRng::seed_from_u64(42);
    let m = create_custom_match(&mut book, "Halcones", "Toros", None, &mut rng, now()).unwrap();

    // Back every exact score a simulation can produce; exactly one must win.
    let mut scores = Vec::new();
    for h in 0..=5 {
        for a in 0..=5 {
            scores.push(Score::new(h, a));
        }
    }
    for s in &scores {
        place_bet(
            &mut book,
            "punter",
            &m.id,
            BetRequest::ExactScore(*s),
            1.0,
            now(),
            &mut rng,
        )
        .unwrap();
    }

    let settlement = simulate_match(&mut book, &m.id, &mut rng, now()).unwrap();
    let finished = &book.matches[&m.id];
    assert_eq!(finished.score, Some(settlement.score));
    assert_eq!(settlement.score.outcome(), settlement.outcome);
    assert!(!book.results[&m.id].is_manual);

    let won: Vec<_> = book
        .bets
        .values()
        .filter(|b| b.status == BetStatus::Won)
        .collect();
    assert_eq!(won.len(), 1);
    assert!(
        book.bets
            .values()
            .all(|b| b.status != BetStatus::Pending)
    );
}
