use std::cmp::Ordering;

use crate::error::{CoreError, CoreResult};
use crate::odds;
use crate::schedule::{resolve_team, strip_tag};
use crate::state::{
    Bet, BetStatus, Book, League, Match, MatchOdds, MatchStatus, Outcome, Score, Team,
    TeamLookup, UserAccount,
};
use crate::strength::FormCounts;
use crate::tournament::Tournament;

pub const LEADERBOARD_SIZE: usize = 10;
pub const RECENT_BETS: usize = 10;

/// Points a five-match form string can reach: five wins at three points each.
const FORM_MAX_POINTS: u32 = 15;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BookStats {
    pub users: usize,
    pub teams: usize,
    pub upcoming: usize,
    pub finished: usize,
    pub bets: usize,
    pub active_bets: usize,
    pub volume: f64,
    pub richest: Option<(String, f64)>,
    pub average_balance: f64,
}

/// The match a wager sits on, as it stands now.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchContext {
    pub team1: String,
    pub team2: String,
    pub status: MatchStatus,
    pub result: Option<Outcome>,
    pub score: Option<Score>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BetLine {
    pub bet: Bet,
    /// `None` once the match has been pruned from history.
    pub context: Option<MatchContext>,
    pub potential_payout: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderRow {
    pub rank: usize,
    pub user_id: String,
    pub username: String,
    pub balance: f64,
    pub total_bets: u32,
    pub won_bets: u32,
    pub lost_bets: u32,
    pub win_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub account: UserAccount,
    pub win_rate: f64,
    /// Stakes on wagers that have been settled.
    pub staked: f64,
    pub profit: f64,
    pub pending_bets: usize,
    pub pending_stake: f64,
    pub average_stake: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamReport {
    pub name: String,
    pub full_name: String,
    pub league: League,
    pub tournament: Tournament,
    pub position: Option<u32>,
    pub form: String,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub points: u32,
    /// Form points over the fifteen available, as a percentage.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Advantage {
    Position { team: String, ours: u32, theirs: u32 },
    Form { team: String, ours: u32, theirs: u32 },
    League { team: String, ours: League, theirs: League },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub team1: TeamReport,
    pub team2: TeamReport,
    pub odds: MatchOdds,
    /// Empty when the sides are level on every count.
    pub advantages: Vec<Advantage>,
}

fn win_rate(won: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(won) / f64::from(total) * 100.0
    }
}

pub fn book_stats(book: &Book) -> BookStats {
    let users = book.users.len();
    let total_balance: f64 = book.users.values().map(|u| u.balance).sum();
    let richest = book
        .users
        .values()
        .max_by(|a, b| a.balance.total_cmp(&b.balance))
        .map(|u| (u.username.clone(), u.balance));
    BookStats {
        users,
        teams: book.teams.len(),
        upcoming: book.matches.values().filter(|m| m.is_upcoming()).count(),
        finished: book.matches.values().filter(|m| !m.is_upcoming()).count(),
        bets: book.bets.len(),
        active_bets: book
            .bets
            .values()
            .filter(|b| b.status == BetStatus::Pending)
            .count(),
        volume: book.bets.values().map(|b| b.amount).sum(),
        richest,
        average_balance: if users == 0 {
            0.0
        } else {
            total_balance / users as f64
        },
    }
}

/// A user's most recent wagers, newest first, with the match each one is on.
pub fn user_bets(book: &Book, user_id: &str, limit: usize) -> Vec<BetLine> {
    let mut mine: Vec<&Bet> = book.bets.values().filter(|b| b.user_id == user_id).collect();
    mine.sort_by(|a, b| b.placed_at.cmp(&a.placed_at).then_with(|| b.id.cmp(&a.id)));
    mine.into_iter()
        .take(limit)
        .map(|bet| BetLine {
            context: book.matches.get(&bet.match_id).map(|m| MatchContext {
                team1: strip_tag(&m.team1),
                team2: strip_tag(&m.team2),
                status: m.status,
                result: m.result,
                score: m.score,
            }),
            potential_payout: bet.potential_payout(),
            bet: bet.clone(),
        })
        .collect()
}

/// Richest accounts first. Equal balances rank by user id.
pub fn leaderboard(book: &Book, limit: usize) -> Vec<LeaderRow> {
    let mut users: Vec<&UserAccount> = book.users.values().collect();
    users.sort_by(|a, b| {
        b.balance
            .total_cmp(&a.balance)
            .then_with(|| a.id.cmp(&b.id))
    });
    users
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, u)| LeaderRow {
            rank: i + 1,
            user_id: u.id.clone(),
            username: u.username.clone(),
            balance: u.balance,
            total_bets: u.total_bets,
            won_bets: u.won_bets,
            lost_bets: u.lost_bets,
            win_rate: win_rate(u.won_bets, u.total_bets),
        })
        .collect()
}

/// Profit is winnings paid out minus stakes on settled wagers. Open stakes are reported
/// apart and do not count against it.
pub fn user_stats(book: &Book, user_id: &str) -> CoreResult<UserStats> {
    let account = book
        .users
        .get(user_id)
        .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;

    let mut staked = 0.0;
    let mut pending_bets = 0;
    let mut pending_stake = 0.0;
    let mut all_stakes = 0.0;
    let mut count = 0usize;
    for bet in book.bets.values().filter(|b| b.user_id == user_id) {
        count += 1;
        all_stakes += bet.amount;
        match bet.status {
            BetStatus::Pending => {
                pending_bets += 1;
                pending_stake += bet.amount;
            }
            BetStatus::Won | BetStatus::Lost => staked += bet.amount,
        }
    }

    Ok(UserStats {
        win_rate: win_rate(account.won_bets, account.total_bets),
        staked,
        profit: account.total_winnings - staked,
        pending_bets,
        pending_stake,
        average_stake: if count == 0 {
            0.0
        } else {
            all_stakes / count as f64
        },
        account: account.clone(),
    })
}

fn team_report(team: &Team) -> TeamReport {
    let form = team.form().to_string();
    let c = FormCounts::from_form(&form);
    let points = c.wins * 3 + c.draws;
    TeamReport {
        name: strip_tag(&team.name),
        full_name: team.name.clone(),
        league: team.league,
        tournament: team.tournament,
        position: team.position,
        form,
        wins: c.wins,
        draws: c.draws,
        losses: c.losses,
        points,
        percentage: f64::from(points) / f64::from(FORM_MAX_POINTS) * 100.0,
    }
}

pub fn team_stats<L: TeamLookup + ?Sized>(lookup: &L, query: &str) -> CoreResult<TeamReport> {
    resolve_team(lookup, query, None).map(team_report)
}

/// Sets two teams side by side and prices them as `team1` at home.
pub fn compare_teams<L: TeamLookup + ?Sized>(
    lookup: &L,
    team1_query: &str,
    team2_query: &str,
    tournament: Option<Tournament>,
) -> CoreResult<Comparison> {
    let t1 = resolve_team(lookup, team1_query, None)?;
    let t2 = resolve_team(lookup, team2_query, None)?;
    if t1.name == t2.name {
        return Err(CoreError::SameTeam(t1.name.clone()));
    }
    let odds = odds::compute_match_odds(lookup, &t1.name, &t2.name, tournament)?;
    let (r1, r2) = (team_report(t1), team_report(t2));

    let mut advantages = Vec::new();
    if let (Some(p1), Some(p2)) = (r1.position, r2.position) {
        let better = match p1.cmp(&p2) {
            Ordering::Less => Some((&r1, p1, p2)),
            Ordering::Greater => Some((&r2, p2, p1)),
            Ordering::Equal => None,
        };
        if let Some((r, ours, theirs)) = better {
            advantages.push(Advantage::Position {
                team: r.name.clone(),
                ours,
                theirs,
            });
        }
    }
    match r1.points.cmp(&r2.points) {
        Ordering::Greater => advantages.push(Advantage::Form {
            team: r1.name.clone(),
            ours: r1.points,
            theirs: r2.points,
        }),
        Ordering::Less => advantages.push(Advantage::Form {
            team: r2.name.clone(),
            ours: r2.points,
            theirs: r1.points,
        }),
        Ordering::Equal => {}
    }
    // Custom sides sit outside the pyramid and never out-rank anyone.
    if r1.league != League::Custom && r2.league != League::Custom && r1.league != r2.league {
        let (hi, lo) = if r1.league < r2.league {
            (&r1, &r2)
        } else {
            (&r2, &r1)
        };
        advantages.push(Advantage::League {
            team: hi.name.clone(),
            ours: hi.league,
            theirs: lo.league,
        });
    }

    Ok(Comparison {
        team1: r1,
        team2: r2,
        odds,
        advantages,
    })
}

/// Matches still open for wagers, soonest kickoff first.
pub fn upcoming_matches(book: &Book) -> Vec<&Match> {
    let mut out: Vec<&Match> = book.matches.values().filter(|m| m.is_upcoming()).collect();
    out.sort_by(|a, b| a.match_time.cmp(&b.match_time).then_with(|| a.id.cmp(&b.id)));
    out
}
