use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;

use matchday_odds::market::{SpecialFlags, SpecialMarket};
use matchday_odds::persist::{
    SqliteFlush, load_book, open_db, open_in_memory, read_teams_json, save_book,
    write_snapshot,
};
use matchday_odds::schedule::{create_custom_match, import_teams};
use matchday_odds::settlement::resolve_match;
use matchday_odds::state::{Book, League, Outcome, Score, Team};
use matchday_odds::tournament::Tournament;
use matchday_odds::wager::{BetRequest, place_bet, transfer};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "matchday_odds_{name}_{}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// A book that touches every table: teams, users, one finished and one open match, and
/// wagers of every kind.
fn busy_book() -> Book {
    let now = Utc.with_ymd_and_hms(2026, 4, 11, 16, 30, 0).unwrap();
    let mut rng = StdRng::seed_from_u64(17);
    let mut book = Book::new(500.0);
    import_teams(
        &mut book,
        vec![
            Team::new("Halcones", League::D1, Some(2), "WWDWL", Tournament::Cv),
            Team::new("Toros", League::D1, None, "", Tournament::D1),
            Team::new("Lobos", League::D2, Some(11), "LDLWW", Tournament::Cv),
            Team::new("Invitados", League::Custom, None, "DD", Tournament::Custom),
        ],
    );

    let open = create_custom_match(&mut book, "Halcones", "Lobos", Some(Tournament::Cv), &mut rng, now)
        .unwrap();
    let done = create_custom_match(&mut book, "Toros", "Invitados", None, &mut rng, now).unwrap();

    place_bet(&mut book, "ana", &open.id, BetRequest::Simple(Outcome::Team1), 25.0, now, &mut rng)
        .unwrap();
    place_bet(
        &mut book,
        "ana",
        &done.id,
        BetRequest::Combined(vec![SpecialMarket::BothTeamsScore, SpecialMarket::HeaderGoal]),
        10.0,
        now,
        &mut rng,
    )
    .unwrap();
    place_bet(&mut book, "beto", &done.id, BetRequest::ExactScore(Score::new(1, 1)), 5.0, now, &mut rng)
        .unwrap();
    place_bet(
        &mut book,
        "beto",
        &open.id,
        BetRequest::Special(SpecialMarket::CornerGoal),
        3.5,
        now,
        &mut rng,
    )
    .unwrap();
    transfer(&mut book, "bank", "beto", 40.0, true).unwrap();

    resolve_match(
        &mut book,
        &done.id,
        Outcome::Draw,
        Score::new(1, 1),
        SpecialFlags::new().with(SpecialMarket::HeaderGoal),
        true,
        now,
    )
    .unwrap();
    book
}

fn assert_same_contents(a: &Book, b: &Book) {
    assert_eq!(a.teams, b.teams);
    assert_eq!(a.users, b.users);
    assert_eq!(a.matches, b.matches);
    assert_eq!(a.bets, b.bets);
    assert_eq!(a.results, b.results);
    assert_eq!(a.default_balance, b.default_balance);
}

#[test]
fn saved_book_loads_back_identically() {
    let book = busy_book();
    let mut conn = open_in_memory().unwrap();
    save_book(&mut conn, &book).unwrap();
    let loaded = load_book(&conn, book.default_balance).unwrap();
    assert_same_contents(&book, &loaded);

    // Saving twice replaces rather than duplicates.
    save_book(&mut conn, &loaded).unwrap();
    let again = load_book(&conn, book.default_balance).unwrap();
    assert_same_contents(&book, &again);
}

#[test]
fn flush_hook_keeps_the_database_current() {
    let dir = scratch_dir("flush");
    let db = dir.join("book.sqlite");
    let _ = std::fs::remove_file(&db);

    let mut book = Book::new(750.0);
    book.set_flush_hook(Some(Box::new(SqliteFlush::new(open_db(&db).unwrap()))));
    import_teams(
        &mut book,
        vec![
            Team::new("Halcones", League::D1, Some(1), "WWWWW", Tournament::D1),
            Team::new("Toros", League::D1, Some(3), "WDWWL", Tournament::D1),
        ],
    );
    let mut rng = StdRng::seed_from_u64(3);
    let now = Utc.with_ymd_and_hms(2026, 4, 12, 12, 0, 0).unwrap();
    let m = create_custom_match(&mut book, "Halcones", "Toros", None, &mut rng, now).unwrap();
    place_bet(&mut book, "carla", &m.id, BetRequest::Simple(Outcome::Draw), 50.0, now, &mut rng)
        .unwrap();

    let reopened = load_book(&open_db(&db).unwrap(), 750.0).unwrap();
    assert_same_contents(&book, &reopened);
    assert!((reopened.users["carla"].balance - 700.0).abs() < 1e-9);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn snapshot_is_written_atomically_as_json() {
    let dir = scratch_dir("snapshot");
    let path = dir.join("book.json");
    let book = busy_book();
    write_snapshot(&path, &book).unwrap();

    assert!(!path.with_extension("json.tmp").exists());
    let raw = std::fs::read_to_string(&path).unwrap();
    let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(v["teams"].as_array().map(Vec::len), Some(4));
    assert_eq!(v["matches"].as_array().map(Vec::len), Some(2));
    assert_eq!(v["bets"].as_array().map(Vec::len), Some(4));
    let names: Vec<&str> = v["teams"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn team_files_import_with_defaults() {
    let dir = scratch_dir("teams");
    let path = dir.join("teams.json");
    std::fs::write(
        &path,
        r#"[
            {"name": "Halcones (D1)", "original_name": "Halcones", "league": "D1",
             "position": 4, "last_five": "WWDLW", "tournament": "d1"},
            {"name": "Lobos (CUSTOM)", "original_name": "Lobos", "league": "CUSTOM",
             "tournament": "custom"}
        ]"#,
    )
    .unwrap();

    let teams = read_teams_json(&path).unwrap();
    assert_eq!(teams.len(), 2);
    assert_eq!(teams[0].position_or_default(), 4);
    assert_eq!(teams[1].league, League::Custom);
    assert_eq!(teams[1].position, None);
    assert_eq!(teams[1].form(), "DDDDD");

    assert!(read_teams_json(&dir.join("missing.json")).is_err());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn unusable_parent_directory_is_reported() {
    let dir = scratch_dir("blocked");
    let blocker = dir.join("not_a_dir");
    std::fs::write(&blocker, "plain file").unwrap();

    let err = open_db(&blocker.join("book.sqlite")).unwrap_err();
    assert!(format!("{err:#}").contains("create db dir"), "{err:#}");

    let err = write_snapshot(&blocker.join("nested").join("book.json"), &Book::default())
        .unwrap_err();
    assert!(format!("{err:#}").contains("create snapshot dir"), "{err:#}");

    let _ = std::fs::remove_dir_all(&dir);
}
