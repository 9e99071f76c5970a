use chrono::{Duration, TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;

use matchday_odds::error::CoreError;
use matchday_odds::odds::compute_match_odds;
use matchday_odds::report::book_stats;
use matchday_odds::schedule::{create_custom_match, find_team, import_teams, team_suggestions};
use matchday_odds::state::{Book, League, MatchStatus, Outcome, Team};
use matchday_odds::tournament::Tournament;
use matchday_odds::wager::{BetRequest, ensure_user, place_bet};

fn league_book() -> Book {
    let mut book = Book::default();
    import_teams(
        &mut book,
        vec![
            Team::new("Atletico Norte", League::D1, Some(1), "WWWDW", Tournament::D1),
            Team::new("Deportivo Sur", League::D1, Some(8), "DLWDL", Tournament::D1),
            Team::new("Norte", League::D2, Some(3), "WWLWD", Tournament::D2),
            Team::new("Union San Pedro", League::D2, Some(14), "LLDLW", Tournament::D2),
            Team::new("Club Invitado", League::Custom, None, "", Tournament::Custom),
        ],
    );
    book
}

#[test]
fn lookup_prefers_exact_then_bare_then_substring_then_words() {
    let book = league_book();
    let exact = find_team(&book, "Norte (D2)", None).unwrap();
    assert_eq!(exact.name, "Norte (D2)");

    let bare = find_team(&book, "norte", None).unwrap();
    assert_eq!(bare.name, "Norte (D2)");

    let substring = find_team(&book, "deportivo", None).unwrap();
    assert_eq!(substring.name, "Deportivo Sur (D1)");

    let words = find_team(&book, "san union", None).unwrap();
    assert_eq!(words.name, "Union San Pedro (D2)");

    assert!(find_team(&book, "   ", None).is_none());
    assert!(find_team(&book, "zzzz", None).is_none());
}

#[test]
fn lookup_respects_the_tournament_filter() {
    let book = league_book();
    let d1 = find_team(&book, "norte", Some(Tournament::D1)).unwrap();
    assert_eq!(d1.name, "Atletico Norte (D1)");
    assert!(find_team(&book, "deportivo", Some(Tournament::D2)).is_none());
}

#[test]
fn suggestions_rank_close_names_first() {
    let book = league_book();
    let hints = team_suggestions(&book, "Deportiv Sr", 3, None);
    assert!(!hints.is_empty());
    assert!(hints.len() <= 3);
    assert_eq!(hints[0].full_name, "Deportivo Sur (D1)");
    assert_eq!(hints[0].name, "Deportivo Sur");
    assert!(hints.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(team_suggestions(&book, "", 3, None).is_empty());
}

#[test]
fn custom_match_uses_lookup_odds_and_a_kickoff_within_a_day() {
    let mut book = league_book();
    let mut rng = StdRng::seed_from_u64(99);
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap();

    let m = create_custom_match(&mut book, "atletico", "union", None, &mut rng, now).unwrap();
    assert_eq!(m.team1, "Atletico Norte (D1)");
    assert_eq!(m.team2, "Union San Pedro (D2)");
    assert_eq!(m.status, MatchStatus::Upcoming);
    assert!(m.is_custom);
    assert_eq!(m.tournament, Tournament::Custom);
    assert!(m.match_time >= now && m.match_time < now + Duration::hours(24));
    assert_eq!(
        m.odds,
        compute_match_odds(&book, &m.team1, &m.team2, None).unwrap()
    );
    assert_eq!(book.matches.get(&m.id), Some(&m));

    let cup = create_custom_match(&mut book, "atletico", "union", Some(Tournament::Cv), &mut rng, now);
    // Neither side is registered for the cup.
    assert!(matches!(cup, Err(CoreError::UnknownTeam { .. })));
}

#[test]
fn custom_match_rejects_unknown_and_identical_teams() {
    let mut book = league_book();
    let mut rng = StdRng::seed_from_u64(1);
    let now = Utc::now();

    match create_custom_match(&mut book, "Deportiv Sr", "Zzyzx", None, &mut rng, now) {
        Err(CoreError::UnknownTeam { query, .. }) => assert_eq!(query, "Deportiv Sr"),
        other => panic!("expected unknown team, got {other:?}"),
    }
    match create_custom_match(&mut book, "Deportivo Sur", "Qqqqq Xyz", None, &mut rng, now) {
        Err(CoreError::UnknownTeam { query, suggestions }) => {
            assert_eq!(query, "Qqqqq Xyz");
            assert!(suggestions.len() <= 3);
        }
        other => panic!("expected unknown team, got {other:?}"),
    }
    assert!(matches!(
        create_custom_match(&mut book, "Norte (D2)", "norte", None, &mut rng, now),
        Err(CoreError::SameTeam(_))
    ));
    assert!(book.matches.is_empty());
}

#[test]
fn stats_summarise_users_matches_and_volume() {
    let mut book = league_book();
    let empty = book_stats(&book);
    assert_eq!(empty.users, 0);
    assert_eq!(empty.average_balance, 0.0);
    assert_eq!(empty.richest, None);

    let mut rng = StdRng::seed_from_u64(8);
    let now = Utc.with_ymd_and_hms(2026, 6, 2, 9, 0, 0).unwrap();
    let m = create_custom_match(&mut book, "norte", "deportivo", None, &mut rng, now).unwrap();
    assert!(ensure_user(&mut book, "rich", Some("Rico")));
    assert!(!ensure_user(&mut book, "rich", Some("Other")));
    place_bet(&mut book, "rich", &m.id, BetRequest::Simple(Outcome::Team1), 10.0, now, &mut rng)
        .unwrap();
    place_bet(&mut book, "poor", &m.id, BetRequest::Simple(Outcome::Draw), 300.0, now, &mut rng)
        .unwrap();

    let s = book_stats(&book);
    assert_eq!(s.users, 2);
    assert_eq!(s.teams, 5);
    assert_eq!((s.upcoming, s.finished), (1, 0));
    assert_eq!((s.bets, s.active_bets), (2, 2));
    assert!((s.volume - 310.0).abs() < 1e-9);
    assert!((s.average_balance - 845.0).abs() < 1e-9);
    let (name, balance) = s.richest.unwrap();
    assert_eq!(name, "Rico");
    assert!((balance - 990.0).abs() < 1e-9);
}
