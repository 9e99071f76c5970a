use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoreError;
use crate::market::{SpecialFlags, SpecialMarket};
use crate::tournament::Tournament;

pub const DEFAULT_BALANCE: f64 = 1000.0;
pub const DEFAULT_POSITION: u32 = 10;
pub const DEFAULT_FORM: &str = "DDDDD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum League {
    D1,
    D2,
    D3,
    #[serde(rename = "CUSTOM")]
    Custom,
}

impl League {
    pub fn code(self) -> &'static str {
        match self {
            League::D1 => "D1",
            League::D2 => "D2",
            League::D3 => "D3",
            League::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for League {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "D1" => Ok(League::D1),
            "D2" => Ok(League::D2),
            "D3" => Ok(League::D3),
            _ => Ok(League::Custom),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Team1,
    Draw,
    Team2,
}

impl Outcome {
    pub fn code(self) -> &'static str {
        match self {
            Outcome::Team1 => "team1",
            Outcome::Draw => "draw",
            Outcome::Team2 => "team2",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Outcome {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "team1" => Ok(Outcome::Team1),
            "draw" => Ok(Outcome::Draw),
            "team2" => Ok(Outcome::Team2),
            other => Err(CoreError::UnknownOutcome(other.to_string())),
        }
    }
}

/// Final (or predicted) goals, rendered as "H-A".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    /// Widened so that any pair of parsed goal counts sums without overflow.
    pub fn total(self) -> u64 {
        u64::from(self.home) + u64::from(self.away)
    }

    pub fn outcome(self) -> Outcome {
        if self.home > self.away {
            Outcome::Team1
        } else if self.home < self.away {
            Outcome::Team2
        } else {
            Outcome::Draw
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

impl FromStr for Score {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let bad = || CoreError::InvalidScore(raw.trim().to_string());
        let (h, a) = raw.trim().split_once('-').ok_or_else(bad)?;
        let home = h.trim().parse::<u32>().map_err(|_| bad())?;
        let away = a.trim().parse::<u32>().map_err(|_| bad())?;
        Ok(Score { home, away })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchOdds {
    pub team1: f64,
    pub draw: f64,
    pub team2: f64,
}

impl MatchOdds {
    pub fn for_outcome(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Team1 => self.team1,
            Outcome::Draw => self.draw,
            Outcome::Team2 => self.team2,
        }
    }

    pub fn implied_sum(&self) -> f64 {
        1.0 / self.team1 + 1.0 / self.draw + 1.0 / self.team2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    /// Unique display name, e.g. "Halcones (D1)". Never parsed for league data.
    pub name: String,
    pub original_name: String,
    pub league: League,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub last_five: String,
    pub tournament: Tournament,
}

impl Team {
    /// Builds a team keyed the way the standings importer names them: "Name (TAG)".
    pub fn new(
        original_name: &str,
        league: League,
        position: Option<u32>,
        last_five: &str,
        tournament: Tournament,
    ) -> Self {
        let original_name = original_name.trim().to_string();
        Self {
            name: format!(
                "{original_name} ({})",
                tournament.code().to_ascii_uppercase()
            ),
            original_name,
            league,
            position: position.filter(|p| *p > 0),
            last_five: last_five.trim().to_ascii_uppercase(),
            tournament,
        }
    }

    pub fn position_or_default(&self) -> u32 {
        self.position.filter(|p| *p > 0).unwrap_or(DEFAULT_POSITION)
    }

    pub fn form(&self) -> &str {
        if self.last_five.is_empty() {
            DEFAULT_FORM
        } else {
            &self.last_five
        }
    }

    pub fn short_name(&self) -> &str {
        if self.original_name.is_empty() {
            &self.name
        } else {
            &self.original_name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Upcoming,
    Finished,
}

impl MatchStatus {
    pub fn code(self) -> &'static str {
        match self {
            MatchStatus::Upcoming => "upcoming",
            MatchStatus::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub team1: String,
    pub team2: String,
    pub odds: MatchOdds,
    pub match_time: DateTime<Utc>,
    pub status: MatchStatus,
    #[serde(default)]
    pub result: Option<Outcome>,
    #[serde(default)]
    pub score: Option<Score>,
    #[serde(default)]
    pub bets: Vec<String>,
    pub tournament: Tournament,
    #[serde(default)]
    pub is_custom: bool,
}

impl Match {
    pub fn is_upcoming(&self) -> bool {
        self.status == MatchStatus::Upcoming
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
}

impl BetStatus {
    pub fn code(self) -> &'static str {
        match self {
            BetStatus::Pending => "pending",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
        }
    }
}

/// One leg of a combined special wager; odds are the leg's own snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialLeg {
    #[serde(rename = "type")]
    pub market: SpecialMarket,
    pub name: String,
    pub odds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "bet_type", rename_all = "snake_case")]
pub enum BetKind {
    Simple { prediction: Outcome },
    ExactScore { exact_score: Score },
    Special { special_type: SpecialMarket },
    SpecialCombined { special_bets: Vec<SpecialLeg> },
}

impl BetKind {
    pub fn code(&self) -> &'static str {
        match self {
            BetKind::Simple { .. } => "simple",
            BetKind::ExactScore { .. } => "exact_score",
            BetKind::Special { .. } => "special",
            BetKind::SpecialCombined { .. } => "special_combined",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub user_id: String,
    pub match_id: String,
    #[serde(flatten)]
    pub kind: BetKind,
    pub amount: f64,
    pub odds: f64,
    pub status: BetStatus,
    pub description: String,
    pub placed_at: DateTime<Utc>,
    #[serde(default)]
    pub result: Option<Outcome>,
}

impl Bet {
    pub fn potential_payout(&self) -> f64 {
        self.amount * self.odds
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub result: Outcome,
    pub score: Score,
    pub timestamp: DateTime<Utc>,
    pub is_manual: bool,
    #[serde(default)]
    pub special_results: SpecialFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub username: String,
    pub balance: f64,
    pub total_bets: u32,
    pub won_bets: u32,
    pub lost_bets: u32,
    pub total_winnings: f64,
}

impl UserAccount {
    pub fn new(id: &str, username: Option<&str>, balance: f64) -> Self {
        Self {
            id: id.to_string(),
            username: username.unwrap_or("user").to_string(),
            balance,
            total_bets: 0,
            won_bets: 0,
            lost_bets: 0,
            total_winnings: 0.0,
        }
    }
}

/// Read access to team metadata; the standings source is an external collaborator.
pub trait TeamLookup {
    fn team(&self, name: &str) -> Option<&Team>;
    fn all_teams(&self) -> Vec<&Team>;
}

impl TeamLookup for HashMap<String, Team> {
    fn team(&self, name: &str) -> Option<&Team> {
        self.get(name)
    }

    fn all_teams(&self) -> Vec<&Team> {
        self.values().collect()
    }
}

/// Invoked after every applied mutation. Implementations must not panic; failures are
/// theirs to log.
pub trait FlushHook: Send + Sync {
    fn flush(&self, book: &Book);
}

/// In-memory store for one sportsbook. Every mutation goes through [`Book::apply`].
pub struct Book {
    pub teams: HashMap<String, Team>,
    pub matches: HashMap<String, Match>,
    pub bets: HashMap<String, Bet>,
    pub results: HashMap<String, MatchResult>,
    pub users: HashMap<String, UserAccount>,
    pub default_balance: f64,
    flush_hook: Option<Box<dyn FlushHook>>,
}

impl Default for Book {
    fn default() -> Self {
        Self::new(DEFAULT_BALANCE)
    }
}

impl fmt::Debug for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Book")
            .field("teams", &self.teams.len())
            .field("matches", &self.matches.len())
            .field("bets", &self.bets.len())
            .field("users", &self.users.len())
            .field("default_balance", &self.default_balance)
            .field("flush_hook", &self.flush_hook.is_some())
            .finish()
    }
}

impl Book {
    pub fn new(default_balance: f64) -> Self {
        Self {
            teams: HashMap::new(),
            matches: HashMap::new(),
            bets: HashMap::new(),
            results: HashMap::new(),
            users: HashMap::new(),
            default_balance,
            flush_hook: None,
        }
    }

    pub fn with_flush_hook(mut self, hook: Box<dyn FlushHook>) -> Self {
        self.flush_hook = Some(hook);
        self
    }

    pub fn set_flush_hook(&mut self, hook: Option<Box<dyn FlushHook>>) {
        self.flush_hook = hook;
    }

    pub fn balance(&self, user_id: &str) -> Option<f64> {
        self.users.get(user_id).map(|u| u.balance)
    }

    pub fn bets_for_match(&self, match_id: &str) -> Vec<&Bet> {
        let Some(m) = self.matches.get(match_id) else {
            return Vec::new();
        };
        m.bets.iter().filter_map(|id| self.bets.get(id)).collect()
    }

    /// Applies the whole batch, then flushes once. Callers validate before building
    /// deltas, so this never fails halfway.
    pub fn apply(&mut self, deltas: Vec<Delta>) {
        if deltas.is_empty() {
            return;
        }
        for delta in deltas {
            apply_delta(self, delta);
        }
        self.flush();
    }

    pub fn flush(&self) {
        if let Some(hook) = &self.flush_hook {
            hook.flush(self);
        }
    }
}

impl TeamLookup for Book {
    fn team(&self, name: &str) -> Option<&Team> {
        self.teams.get(name)
    }

    fn all_teams(&self) -> Vec<&Team> {
        self.teams.values().collect()
    }
}

/// Signed change to a user's ledger counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountChange {
    pub balance: f64,
    pub total_bets: i32,
    pub won_bets: u32,
    pub lost_bets: u32,
    pub winnings: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    UpsertTeam(Team),
    InsertUser(UserAccount),
    InsertMatch(Match),
    RemoveMatch(String),
    InsertBet(Bet),
    AttachBet { match_id: String, bet_id: String },
    RemoveBet(String),
    FinishMatch { match_id: String, record: MatchResult },
    RemoveResult(String),
    SettleBet {
        bet_id: String,
        status: BetStatus,
        result: Outcome,
    },
    AdjustUser { user_id: String, change: AccountChange },
}

pub fn apply_delta(book: &mut Book, delta: Delta) {
    match delta {
        Delta::UpsertTeam(team) => {
            book.teams.insert(team.name.clone(), team);
        }
        Delta::InsertUser(user) => {
            book.users.entry(user.id.clone()).or_insert(user);
        }
        Delta::InsertMatch(m) => {
            book.matches.insert(m.id.clone(), m);
        }
        Delta::RemoveMatch(id) => {
            book.matches.remove(&id);
        }
        Delta::InsertBet(bet) => {
            book.bets.insert(bet.id.clone(), bet);
        }
        Delta::AttachBet { match_id, bet_id } => match book.matches.get_mut(&match_id) {
            Some(m) => m.bets.push(bet_id),
            None => warn!(%match_id, %bet_id, "attach to missing match ignored"),
        },
        Delta::RemoveBet(id) => {
            book.bets.remove(&id);
        }
        Delta::FinishMatch { match_id, record } => {
            if let Some(m) = book.matches.get_mut(&match_id) {
                m.status = MatchStatus::Finished;
                m.result = Some(record.result);
                m.score = Some(record.score);
            }
            book.results.insert(match_id, record);
        }
        Delta::RemoveResult(id) => {
            book.results.remove(&id);
        }
        Delta::SettleBet {
            bet_id,
            status,
            result,
        } => {
            if let Some(bet) = book.bets.get_mut(&bet_id) {
                bet.status = status;
                bet.result = Some(result);
            }
        }
        Delta::AdjustUser { user_id, change } => {
            let default_balance = book.default_balance;
            let user = book
                .users
                .entry(user_id.clone())
                .or_insert_with(|| UserAccount::new(&user_id, None, default_balance));
            user.balance += change.balance;
            user.total_bets = user.total_bets.saturating_add_signed(change.total_bets);
            user.won_bets += change.won_bets;
            user.lost_bets += change.lost_bets;
            user.total_winnings += change.winnings;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_parses_and_renders() {
        let s: Score = " 2-1 ".parse().unwrap();
        assert_eq!(s, Score::new(2, 1));
        assert_eq!(s.to_string(), "2-1");
        assert_eq!(s.outcome(), Outcome::Team1);
        assert!(matches!(
            "2:1".parse::<Score>(),
            Err(CoreError::InvalidScore(_))
        ));
        assert!("-1-0".parse::<Score>().is_err());
    }

    #[test]
    fn huge_scores_total_without_overflow() {
        let s: Score = "4294967295-1".parse().unwrap();
        assert_eq!(s.total(), u64::from(u32::MAX) + 1);
        assert_eq!(s.outcome(), Outcome::Team1);
    }

    #[test]
    fn team_defaults_cover_missing_standings() {
        let t = Team::new("Halcones", League::D1, None, "", Tournament::D1);
        assert_eq!(t.name, "Halcones (D1)");
        assert_eq!(t.position_or_default(), DEFAULT_POSITION);
        assert_eq!(t.form(), DEFAULT_FORM);

        let zero = Team::new("Zero", League::D2, Some(0), "wwl", Tournament::D2);
        assert_eq!(zero.position, None);
        assert_eq!(zero.form(), "WWL");
    }

    #[test]
    fn bet_kind_serializes_with_wire_tags() {
        let kind = BetKind::SpecialCombined {
            special_bets: vec![SpecialLeg {
                market: SpecialMarket::CornerGoal,
                name: "Goal from a corner".to_string(),
                odds: 8.5,
            }],
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["bet_type"], "special_combined");
        assert_eq!(json["special_bets"][0]["type"], "corner_goal");
    }

    #[test]
    fn adjust_user_never_underflows_bet_counter() {
        let mut book = Book::default();
        apply_delta(
            &mut book,
            Delta::AdjustUser {
                user_id: "u1".to_string(),
                change: AccountChange {
                    balance: 5.0,
                    total_bets: -1,
                    ..AccountChange::default()
                },
            },
        );
        let user = &book.users["u1"];
        assert_eq!(user.total_bets, 0);
        assert!((user.balance - (DEFAULT_BALANCE + 5.0)).abs() < 1e-9);
    }
}
