//! SQLite persistence for a [`Book`].
//!
//! The whole book is written in one transaction on every flush: rows are replaced, never
//! patched. Nested data (bet kinds, event flags, a match's bet list) is stored as JSON
//! text and timestamps as RFC 3339.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::{debug, warn};

use crate::state::{
    Bet, BetStatus, Book, FlushHook, League, Match, MatchOdds, MatchResult, MatchStatus,
    Outcome, Score, Team, UserAccount,
};
use crate::tournament::Tournament;

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create db dir {}", parent.display()))?;
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            name TEXT PRIMARY KEY,
            original_name TEXT NOT NULL,
            league TEXT NOT NULL,
            position INTEGER NULL,
            last_five TEXT NOT NULL,
            tournament TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            balance REAL NOT NULL,
            total_bets INTEGER NOT NULL,
            won_bets INTEGER NOT NULL,
            lost_bets INTEGER NOT NULL,
            total_winnings REAL NOT NULL
        );
        CREATE TABLE IF NOT EXISTS matches (
            id TEXT PRIMARY KEY,
            team1 TEXT NOT NULL,
            team2 TEXT NOT NULL,
            odds_team1 REAL NOT NULL,
            odds_draw REAL NOT NULL,
            odds_team2 REAL NOT NULL,
            match_time TEXT NOT NULL,
            status TEXT NOT NULL,
            result TEXT NULL,
            score TEXT NULL,
            bets TEXT NOT NULL,
            tournament TEXT NOT NULL,
            is_custom INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS bets (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            match_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            amount REAL NOT NULL,
            odds REAL NOT NULL,
            status TEXT NOT NULL,
            description TEXT NOT NULL,
            placed_at TEXT NOT NULL,
            result TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bets_match ON bets(match_id);
        CREATE TABLE IF NOT EXISTS results (
            match_id TEXT PRIMARY KEY,
            result TEXT NOT NULL,
            score TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            is_manual INTEGER NOT NULL,
            special_results TEXT NOT NULL
        );
        "#,
    )
    .context("init sqlite schema")?;
    Ok(())
}

/// Replaces every stored row with the book's current contents.
pub fn save_book(conn: &mut Connection, book: &Book) -> Result<()> {
    let tx = conn.transaction().context("begin save transaction")?;
    tx.execute_batch(
        "DELETE FROM teams; DELETE FROM users; DELETE FROM matches; DELETE FROM bets; DELETE FROM results;",
    )
    .context("clear tables")?;

    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO teams (name, original_name, league, position, last_five, tournament)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .context("prepare team insert")?;
        for t in book.teams.values() {
            stmt.execute(params![
                t.name,
                t.original_name,
                t.league.code(),
                t.position,
                t.last_five,
                t.tournament.code()
            ])
            .with_context(|| format!("insert team {}", t.name))?;
        }

        let mut stmt = tx
            .prepare(
                "INSERT INTO users (id, username, balance, total_bets, won_bets, lost_bets, total_winnings)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .context("prepare user insert")?;
        for u in book.users.values() {
            stmt.execute(params![
                u.id,
                u.username,
                u.balance,
                u.total_bets,
                u.won_bets,
                u.lost_bets,
                u.total_winnings
            ])
            .with_context(|| format!("insert user {}", u.id))?;
        }

        let mut stmt = tx
            .prepare(
                "INSERT INTO matches (id, team1, team2, odds_team1, odds_draw, odds_team2, match_time,
                                      status, result, score, bets, tournament, is_custom)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )
            .context("prepare match insert")?;
        for m in book.matches.values() {
            let bets = serde_json::to_string(&m.bets).context("serialize match bet list")?;
            stmt.execute(params![
                m.id,
                m.team1,
                m.team2,
                m.odds.team1,
                m.odds.draw,
                m.odds.team2,
                m.match_time.to_rfc3339(),
                m.status.code(),
                m.result.map(Outcome::code),
                m.score.map(|s| s.to_string()),
                bets,
                m.tournament.code(),
                m.is_custom
            ])
            .with_context(|| format!("insert match {}", m.id))?;
        }

        let mut stmt = tx
            .prepare(
                "INSERT INTO bets (id, user_id, match_id, kind, amount, odds, status, description,
                                   placed_at, result)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .context("prepare bet insert")?;
        for b in book.bets.values() {
            let kind = serde_json::to_string(&b.kind).context("serialize bet kind")?;
            stmt.execute(params![
                b.id,
                b.user_id,
                b.match_id,
                kind,
                b.amount,
                b.odds,
                b.status.code(),
                b.description,
                b.placed_at.to_rfc3339(),
                b.result.map(Outcome::code)
            ])
            .with_context(|| format!("insert bet {}", b.id))?;
        }

        let mut stmt = tx
            .prepare(
                "INSERT INTO results (match_id, result, score, timestamp, is_manual, special_results)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .context("prepare result insert")?;
        for (match_id, r) in &book.results {
            let flags =
                serde_json::to_string(&r.special_results).context("serialize special results")?;
            stmt.execute(params![
                match_id,
                r.result.code(),
                r.score.to_string(),
                r.timestamp.to_rfc3339(),
                r.is_manual,
                flags
            ])
            .with_context(|| format!("insert result {match_id}"))?;
        }
    }

    tx.commit().context("commit save transaction")?;
    debug!(
        teams = book.teams.len(),
        users = book.users.len(),
        matches = book.matches.len(),
        bets = book.bets.len(),
        "book saved"
    );
    Ok(())
}

/// Reads a book back. The flush hook is not restored; callers attach their own.
pub fn load_book(conn: &Connection, default_balance: f64) -> Result<Book> {
    let mut book = Book::new(default_balance);

    let mut stmt = conn
        .prepare("SELECT name, original_name, league, position, last_five, tournament FROM teams")
        .context("prepare load teams query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<u32>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .context("query load teams")?;
    for row in rows {
        let (name, original_name, league, position, last_five, tournament) =
            row.context("decode team row")?;
        let team = Team {
            league: league.parse::<League>()?,
            tournament: tournament.parse::<Tournament>()?,
            name,
            original_name,
            position,
            last_five,
        };
        book.teams.insert(team.name.clone(), team);
    }

    let mut stmt = conn
        .prepare(
            "SELECT id, username, balance, total_bets, won_bets, lost_bets, total_winnings FROM users",
        )
        .context("prepare load users query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(UserAccount {
                id: row.get(0)?,
                username: row.get(1)?,
                balance: row.get(2)?,
                total_bets: row.get(3)?,
                won_bets: row.get(4)?,
                lost_bets: row.get(5)?,
                total_winnings: row.get(6)?,
            })
        })
        .context("query load users")?;
    for row in rows {
        let user = row.context("decode user row")?;
        book.users.insert(user.id.clone(), user);
    }

    let mut stmt = conn
        .prepare(
            "SELECT id, team1, team2, odds_team1, odds_draw, odds_team2, match_time, status,
                    result, score, bets, tournament, is_custom
             FROM matches",
        )
        .context("prepare load matches query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MatchRow {
                id: row.get(0)?,
                team1: row.get(1)?,
                team2: row.get(2)?,
                odds: MatchOdds {
                    team1: row.get(3)?,
                    draw: row.get(4)?,
                    team2: row.get(5)?,
                },
                match_time: row.get(6)?,
                status: row.get(7)?,
                result: row.get(8)?,
                score: row.get(9)?,
                bets: row.get(10)?,
                tournament: row.get(11)?,
                is_custom: row.get::<_, i64>(12)? != 0,
            })
        })
        .context("query load matches")?;
    for row in rows {
        let m = row.context("decode match row")?.into_match()?;
        book.matches.insert(m.id.clone(), m);
    }

    let mut stmt = conn
        .prepare(
            "SELECT id, user_id, match_id, kind, amount, odds, status, description, placed_at, result
             FROM bets",
        )
        .context("prepare load bets query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(BetRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                match_id: row.get(2)?,
                kind: row.get(3)?,
                amount: row.get(4)?,
                odds: row.get(5)?,
                status: row.get(6)?,
                description: row.get(7)?,
                placed_at: row.get(8)?,
                result: row.get(9)?,
            })
        })
        .context("query load bets")?;
    for row in rows {
        let bet = row.context("decode bet row")?.into_bet()?;
        book.bets.insert(bet.id.clone(), bet);
    }

    let mut stmt = conn
        .prepare("SELECT match_id, result, score, timestamp, is_manual, special_results FROM results")
        .context("prepare load results query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)? != 0,
                row.get::<_, String>(5)?,
            ))
        })
        .context("query load results")?;
    for row in rows {
        let (match_id, result, score, timestamp, is_manual, flags) =
            row.context("decode result row")?;
        let record = MatchResult {
            result: result.parse::<Outcome>()?,
            score: score.parse::<Score>()?,
            timestamp: parse_time(&timestamp)?,
            is_manual,
            special_results: serde_json::from_str(&flags)
                .with_context(|| format!("decode special results of {match_id}"))?,
        };
        book.results.insert(match_id, record);
    }

    Ok(book)
}

struct MatchRow {
    id: String,
    team1: String,
    team2: String,
    odds: MatchOdds,
    match_time: String,
    status: String,
    result: Option<String>,
    score: Option<String>,
    bets: String,
    tournament: String,
    is_custom: bool,
}

impl MatchRow {
    fn into_match(self) -> Result<Match> {
        Ok(Match {
            match_time: parse_time(&self.match_time)?,
            status: parse_match_status(&self.status)?,
            result: self.result.map(|r| r.parse::<Outcome>()).transpose()?,
            score: self.score.map(|s| s.parse::<Score>()).transpose()?,
            bets: serde_json::from_str(&self.bets)
                .with_context(|| format!("decode bet list of match {}", self.id))?,
            tournament: self.tournament.parse::<Tournament>()?,
            id: self.id,
            team1: self.team1,
            team2: self.team2,
            odds: self.odds,
            is_custom: self.is_custom,
        })
    }
}

struct BetRow {
    id: String,
    user_id: String,
    match_id: String,
    kind: String,
    amount: f64,
    odds: f64,
    status: String,
    description: String,
    placed_at: String,
    result: Option<String>,
}

impl BetRow {
    fn into_bet(self) -> Result<Bet> {
        Ok(Bet {
            kind: serde_json::from_str(&self.kind)
                .with_context(|| format!("decode kind of bet {}", self.id))?,
            status: parse_bet_status(&self.status)?,
            placed_at: parse_time(&self.placed_at)?,
            result: self.result.map(|r| r.parse::<Outcome>()).transpose()?,
            id: self.id,
            user_id: self.user_id,
            match_id: self.match_id,
            amount: self.amount,
            odds: self.odds,
            description: self.description,
        })
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("parse timestamp {raw}"))
}

fn parse_match_status(raw: &str) -> Result<MatchStatus> {
    match raw {
        "upcoming" => Ok(MatchStatus::Upcoming),
        "finished" => Ok(MatchStatus::Finished),
        other => Err(anyhow!("unknown match status {other}")),
    }
}

fn parse_bet_status(raw: &str) -> Result<BetStatus> {
    match raw {
        "pending" => Ok(BetStatus::Pending),
        "won" => Ok(BetStatus::Won),
        "lost" => Ok(BetStatus::Lost),
        other => Err(anyhow!("unknown bet status {other}")),
    }
}

/// Writes the book to SQLite after every applied batch. Failures are logged and dropped
/// so that state mutation never fails because of storage.
pub struct SqliteFlush {
    conn: Mutex<Connection>,
}

impl SqliteFlush {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl FlushHook for SqliteFlush {
    fn flush(&self, book: &Book) {
        let mut conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = save_book(&mut conn, book) {
            warn!(error = %format!("{err:#}"), "book flush failed");
        }
    }
}

/// Sorted, human-readable dump of the whole book.
#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    teams: Vec<&'a Team>,
    users: Vec<&'a UserAccount>,
    matches: Vec<&'a Match>,
    bets: Vec<&'a Bet>,
    results: Vec<(&'a String, &'a MatchResult)>,
}

/// Writes a JSON snapshot next to `path` and swaps it in, so readers never see a partial file.
pub fn write_snapshot(path: &Path, book: &Book) -> Result<()> {
    let mut snapshot = Snapshot {
        teams: book.teams.values().collect(),
        users: book.users.values().collect(),
        matches: book.matches.values().collect(),
        bets: book.bets.values().collect(),
        results: book.results.iter().collect(),
    };
    snapshot.teams.sort_by(|a, b| a.name.cmp(&b.name));
    snapshot.users.sort_by(|a, b| a.id.cmp(&b.id));
    snapshot.matches.sort_by(|a, b| a.match_time.cmp(&b.match_time).then_with(|| a.id.cmp(&b.id)));
    snapshot.bets.sort_by(|a, b| a.placed_at.cmp(&b.placed_at).then_with(|| a.id.cmp(&b.id)));
    snapshot.results.sort_by(|a, b| a.0.cmp(b.0));

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("create snapshot dir {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(&snapshot).context("serialize snapshot")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write snapshot {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap snapshot {}", path.display()))?;
    Ok(())
}

/// Reads a JSON array of team records, as produced by the standings importer.
pub fn read_teams_json(path: &Path) -> Result<Vec<Team>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let teams: Vec<Team> =
        serde_json::from_str(&raw).with_context(|| format!("parse teams in {}", path.display()))?;
    Ok(teams)
}
