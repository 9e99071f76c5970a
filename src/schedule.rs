use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::odds;
use crate::state::{Book, Delta, Match, MatchStatus, Team, TeamLookup};
use crate::tournament::Tournament;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const KICKOFF_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;
const SUGGESTION_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub name: String,
    pub full_name: String,
    pub score: f64,
    pub tournament: Tournament,
    pub position: Option<u32>,
}

/// Epoch millis followed by five base-36 characters.
pub fn generate_id<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> String {
    let suffix: String = (0..5)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{}{suffix}", now.timestamp_millis())
}

/// Team name without the "(TAG)" the importer appends. Text after the tag is kept.
pub fn strip_tag(name: &str) -> String {
    match name.find(" (") {
        Some(start) => match name[start..].find(')') {
            Some(end) => format!("{}{}", &name[..start], &name[start + end + 1..]),
            None => name.to_string(),
        },
        None => name.to_string(),
    }
}

fn in_tournament(team: &Team, tournament: Option<Tournament>) -> bool {
    match tournament {
        None => true,
        Some(t) => {
            team.tournament == t || team.league.code() == t.code().to_ascii_uppercase()
        }
    }
}

fn candidates<L: TeamLookup + ?Sized>(lookup: &L, tournament: Option<Tournament>) -> Vec<&Team> {
    let mut teams: Vec<&Team> = lookup
        .all_teams()
        .into_iter()
        .filter(|t| in_tournament(t, tournament))
        .collect();
    teams.sort_by(|a, b| a.name.cmp(&b.name));
    teams
}

/// Resolves a free-text team name. Tries, in order: the full name, the name without its
/// "(TAG)", a substring match either way, then a word-by-word match.
pub fn find_team<'a, L: TeamLookup + ?Sized>(
    lookup: &'a L,
    query: &str,
    tournament: Option<Tournament>,
) -> Option<&'a Team> {
    let search = query.trim().to_lowercase();
    if search.is_empty() {
        return None;
    }
    let teams = candidates(lookup, tournament);
    let bare: Vec<String> = teams.iter().map(|t| strip_tag(&t.name).to_lowercase()).collect();

    if let Some(t) = teams.iter().find(|t| t.name.to_lowercase() == search) {
        return Some(*t);
    }
    if let Some(i) = bare.iter().position(|b| *b == search) {
        return Some(teams[i]);
    }
    if let Some(i) = bare
        .iter()
        .position(|b| b.contains(&search) || search.contains(b.as_str()))
    {
        return Some(teams[i]);
    }
    let words: Vec<&str> = search.split_whitespace().collect();
    bare.iter()
        .position(|b| {
            let name_words: Vec<&str> = b.split_whitespace().collect();
            words.iter().all(|w| {
                name_words
                    .iter()
                    .any(|n| n.contains(w) || w.contains(n))
            })
        })
        .map(|i| teams[i])
}

/// Share of the shorter string's characters that appear anywhere in the longer one,
/// over the longer one's length.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (longer, shorter) = if a.chars().count() > b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let len = longer.chars().count();
    if len == 0 {
        return 1.0;
    }
    let hits = shorter.chars().filter(|c| longer.contains(*c)).count();
    hits as f64 / len as f64
}

pub fn team_suggestions<L: TeamLookup + ?Sized>(
    lookup: &L,
    query: &str,
    limit: usize,
    tournament: Option<Tournament>,
) -> Vec<Suggestion> {
    let search = query.trim().to_lowercase();
    if search.is_empty() {
        return Vec::new();
    }
    let mut out: Vec<Suggestion> = candidates(lookup, tournament)
        .into_iter()
        .filter_map(|t| {
            let name = strip_tag(&t.name);
            let score = similarity(&search, &name.to_lowercase());
            (score > SUGGESTION_THRESHOLD).then(|| Suggestion {
                name,
                full_name: t.name.clone(),
                score,
                tournament: t.tournament,
                position: t.position,
            })
        })
        .collect();
    out.sort_by(|a, b| b.score.total_cmp(&a.score));
    out.truncate(limit);
    out
}

/// `find_team`, or `UnknownTeam` carrying up to three suggestions.
pub fn resolve_team<'a, L: TeamLookup + ?Sized>(
    lookup: &'a L,
    query: &str,
    tournament: Option<Tournament>,
) -> CoreResult<&'a Team> {
    find_team(lookup, query, tournament).ok_or_else(|| CoreError::UnknownTeam {
        query: query.trim().to_string(),
        suggestions: team_suggestions(lookup, query, 3, tournament)
            .into_iter()
            .map(|s| s.full_name)
            .collect(),
    })
}

/// Schedules a custom fixture between two looked-up teams. Odds are computed once here
/// and never recalculated.
pub fn create_custom_match<R: Rng + ?Sized>(
    book: &mut Book,
    team1_query: &str,
    team2_query: &str,
    tournament: Option<Tournament>,
    rng: &mut R,
    now: DateTime<Utc>,
) -> CoreResult<Match> {
    let team1 = resolve_team(book, team1_query, tournament)?.name.clone();
    let team2 = resolve_team(book, team2_query, tournament)?.name.clone();
    if team1 == team2 {
        return Err(CoreError::SameTeam(team1));
    }

    let odds = odds::compute_match_odds(&*book, &team1, &team2, tournament)?;
    let kickoff = now + Duration::milliseconds(rng.gen_range(0..KICKOFF_WINDOW_MS));
    let m = Match {
        id: generate_id(now, rng),
        team1,
        team2,
        odds,
        match_time: kickoff,
        status: MatchStatus::Upcoming,
        result: None,
        score: None,
        bets: Vec::new(),
        tournament: tournament.unwrap_or(Tournament::Custom),
        is_custom: true,
    };
    book.apply(vec![Delta::InsertMatch(m.clone())]);
    info!(
        match_id = %m.id,
        team1 = %m.team1,
        team2 = %m.team2,
        tournament = m.tournament.code(),
        "custom match created"
    );
    Ok(m)
}

/// Replaces or adds team records, keyed by display name.
pub fn import_teams(book: &mut Book, teams: Vec<Team>) -> usize {
    let n = teams.len();
    book.apply(teams.into_iter().map(Delta::UpsertTeam).collect());
    info!(teams = n, "teams imported");
    n
}
