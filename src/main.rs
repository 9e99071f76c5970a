use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

use matchday_odds::config::BookConfig;
use matchday_odds::market::{SpecialFlags, SpecialMarket};
use matchday_odds::persist::{self, SqliteFlush};
use matchday_odds::state::{Book, Outcome, Score};
use matchday_odds::tournament::Tournament;
use matchday_odds::wager::{self, BetRequest};
use matchday_odds::report::{self, Advantage};
use matchday_odds::{odds, schedule, settlement, simulate};

const USAGE: &str = "usage: matchday_odds [--db PATH] <command>

commands:
  teams import <file.json>
  teams list [TOURNAMENT]
  odds <TEAM1> <TEAM2> [--tournament T]
  board [--tournament T]
  create <TEAM1> <TEAM2> [--tournament T]
  bet <USER> <MATCH> <team1|draw|team2> <AMOUNT>
  bet-exact <USER> <MATCH> <H-A> <AMOUNT>
  bet-special <USER> <MATCH> <AMOUNT> <MARKET>[,<MARKET>...]
  result <MATCH> <team1|draw|team2> <H-A> [EVENT_MARKET...]
  simulate <MATCH>
  delete <MATCH>
  delete-upcoming
  delete-finished
  give <FROM> <TO> <AMOUNT> [--admin]
  matches
  mybets <USER>
  user <USER>
  top
  team <TEAM>
  compare <TEAM1> <TEAM2> [--tournament T]
  stats
  export <file.json>";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let config = BookConfig::from_env();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1).collect::<Vec<_>>();
    let db_path = take_value_flag(&mut args, "--db")
        .map(PathBuf::from)
        .or_else(|| config.db_path.clone())
        .context("unable to resolve sqlite path; set BOOK_DB_PATH or pass --db")?;
    if args.is_empty() {
        println!("{USAGE}");
        return Ok(());
    }

    let conn = persist::open_db(&db_path)?;
    let mut book = persist::load_book(&conn, config.default_balance)
        .with_context(|| format!("load book from {}", db_path.display()))?;
    book.set_flush_hook(Some(Box::new(SqliteFlush::new(conn))));

    let mut rng = match config.sim_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    run(&mut book, &mut args, &mut rng)
}

fn run(book: &mut Book, args: &mut Vec<String>, rng: &mut StdRng) -> Result<()> {
    let tournament = take_value_flag(args, "--tournament")
        .map(|raw| raw.parse::<Tournament>())
        .transpose()?;
    let admin = take_switch(args, "--admin");
    let now = Utc::now();
    let cmd = args.first().map(String::as_str).unwrap_or("");
    let rest = &args[1.min(args.len())..];

    match cmd {
        "teams" => match rest.first().map(String::as_str) {
            Some("import") => {
                let path = arg(rest, 1, "teams file")?;
                let teams = persist::read_teams_json(&PathBuf::from(path))?;
                let n = schedule::import_teams(book, teams);
                println!("Imported {n} teams");
            }
            Some("list") | None => {
                let filter = rest.get(1).map(|t| t.parse::<Tournament>()).transpose()?;
                let mut all: Vec<_> = book
                    .teams
                    .values()
                    .filter(|t| filter.is_none_or(|f| t.tournament == f))
                    .collect();
                all.sort_by(|a, b| {
                    a.tournament
                        .cmp(&b.tournament)
                        .then(a.position_or_default().cmp(&b.position_or_default()))
                });
                for t in all {
                    println!(
                        "{:<32} {:<7} {:>3} {:<5} {}",
                        t.name,
                        t.league.code(),
                        t.position.map_or("-".to_string(), |p| p.to_string()),
                        t.form(),
                        t.tournament.display_name()
                    );
                }
            }
            Some(other) => bail!("unknown teams subcommand {other}"),
        },
        "odds" => {
            let t1 = resolve(book, arg(rest, 0, "team1")?, tournament)?;
            let t2 = resolve(book, arg(rest, 1, "team2")?, tournament)?;
            let o = odds::compute_match_odds(&*book, &t1, &t2, tournament)?;
            println!("{t1} vs {t2}");
            println!(
                "  1: {:.2}   X: {:.2}   2: {:.2}   (overround {:.3})",
                o.team1,
                o.draw,
                o.team2,
                o.implied_sum()
            );
        }
        "board" => {
            for row in odds::odds_board(&*book, tournament) {
                println!(
                    "{:<32} {:<32} {:>6.2} {:>6.2} {:>6.2}",
                    row.team1, row.team2, row.odds.team1, row.odds.draw, row.odds.team2
                );
            }
        }
        "create" => {
            let m = schedule::create_custom_match(
                book,
                arg(rest, 0, "team1")?,
                arg(rest, 1, "team2")?,
                tournament,
                rng,
                now,
            )?;
            println!("Created match {}", m.id);
            println!("  {} vs {}", m.team1, m.team2);
            println!(
                "  odds {:.2} / {:.2} / {:.2}, kickoff {}",
                m.odds.team1,
                m.odds.draw,
                m.odds.team2,
                m.match_time.format("%Y-%m-%d %H:%M UTC")
            );
        }
        "bet" | "bet-exact" | "bet-special" => {
            let user = arg(rest, 0, "user")?;
            let match_id = arg(rest, 1, "match id")?;
            let (request, amount) = match cmd {
                "bet" => (
                    BetRequest::Simple(arg(rest, 2, "prediction")?.parse::<Outcome>()?),
                    parse_amount(arg(rest, 3, "amount")?)?,
                ),
                "bet-exact" => (
                    BetRequest::ExactScore(arg(rest, 2, "score")?.parse::<Score>()?),
                    parse_amount(arg(rest, 3, "amount")?)?,
                ),
                _ => {
                    let amount = parse_amount(arg(rest, 2, "amount")?)?;
                    let markets = arg(rest, 3, "markets")?
                        .split(',')
                        .map(|m| m.parse::<SpecialMarket>())
                        .collect::<Result<Vec<_>, _>>()?;
                    let request = if markets.len() == 1 {
                        BetRequest::Special(markets[0])
                    } else {
                        BetRequest::Combined(markets)
                    };
                    (request, amount)
                }
            };
            wager::ensure_user(book, user, Some(user));
            let placed = wager::place_bet(book, user, match_id, request, amount, now, rng)?;
            println!("Bet {} placed: {}", placed.bet.id, placed.bet.description);
            println!(
                "  stake {:.2} @ {:.2}, potential {:.2}, balance {:.2}",
                placed.bet.amount,
                placed.bet.odds,
                placed.bet.potential_payout(),
                placed.balance
            );
        }
        "result" => {
            let match_id = arg(rest, 0, "match id")?;
            let outcome = arg(rest, 1, "outcome")?.parse::<Outcome>()?;
            let score = arg(rest, 2, "score")?.parse::<Score>()?;
            let flags = rest
                .iter()
                .skip(3)
                .map(|m| m.parse::<SpecialMarket>())
                .collect::<Result<SpecialFlags, _>>()?;
            let s = settlement::resolve_match(book, match_id, outcome, score, flags, true, now)?;
            print_settlement(&s);
        }
        "simulate" => {
            let s = simulate::simulate_match(book, arg(rest, 0, "match id")?, rng, now)?;
            print_settlement(&s);
        }
        "delete" => {
            let d = settlement::delete_match(book, arg(rest, 0, "match id")?)?;
            println!(
                "Deleted match {}: {} bets cancelled, {:.2} refunded",
                d.match_id, d.bets_cancelled, d.refunded
            );
        }
        "delete-upcoming" => {
            let d = settlement::delete_all_upcoming(book)?;
            println!(
                "Deleted {} upcoming matches: {} bets cancelled, {:.2} refunded",
                d.matches, d.bets_cancelled, d.refunded
            );
        }
        "delete-finished" => {
            let n = settlement::delete_finished(book)?;
            println!("Removed {n} finished matches from history");
        }
        "give" => {
            let t = wager::transfer(
                book,
                arg(rest, 0, "from")?,
                arg(rest, 1, "to")?,
                parse_amount(arg(rest, 2, "amount")?)?,
                admin,
            )?;
            println!(
                "Transferred {:.2}: sender {:.2}, receiver {:.2}",
                t.amount, t.from_balance, t.to_balance
            );
        }
        "matches" => {
            let upcoming = report::upcoming_matches(book);
            if upcoming.is_empty() {
                println!("No upcoming matches");
            }
            for m in upcoming {
                let form = |name: &str| book.teams.get(name).map_or("-", |t| t.form());
                println!(
                    "{}  {}  {} vs {}",
                    m.id,
                    m.match_time.format("%Y-%m-%d %H:%M UTC"),
                    schedule::strip_tag(&m.team1),
                    schedule::strip_tag(&m.team2)
                );
                println!(
                    "  {:.2} / {:.2} / {:.2}   form {} vs {}",
                    m.odds.team1,
                    m.odds.draw,
                    m.odds.team2,
                    form(&m.team1),
                    form(&m.team2)
                );
            }
        }
        "mybets" => {
            let user = arg(rest, 0, "user")?;
            let lines = report::user_bets(book, user, report::RECENT_BETS);
            if lines.is_empty() {
                println!("No bets for {user}");
            }
            for line in lines {
                let fixture = match &line.context {
                    Some(c) => match c.score {
                        Some(score) => format!("{} {score} {}", c.team1, c.team2),
                        None => format!("{} vs {}", c.team1, c.team2),
                    },
                    None => "(match removed)".to_string(),
                };
                println!(
                    "[{:<7}] {fixture}: {} | stake {:.2} @ {:.2}, potential {:.2}",
                    line.bet.status.code(),
                    line.bet.description,
                    line.bet.amount,
                    line.bet.odds,
                    line.potential_payout
                );
            }
        }
        "user" => {
            let s = report::user_stats(book, arg(rest, 0, "user")?)?;
            println!("{} ({})", s.account.username, s.account.id);
            println!("  Balance:   {:.2}", s.account.balance);
            println!(
                "  Bets:      {} ({} won, {} lost, {} open)",
                s.account.total_bets, s.account.won_bets, s.account.lost_bets, s.pending_bets
            );
            println!("  Win rate:  {:.1}%", s.win_rate);
            println!("  Winnings:  {:.2}", s.account.total_winnings);
            println!("  Profit:    {:.2}", s.profit);
            println!("  Open:      {:.2}", s.pending_stake);
            println!("  Avg stake: {:.2}", s.average_stake);
        }
        "top" => {
            for row in report::leaderboard(book, report::LEADERBOARD_SIZE) {
                println!(
                    "{:>2}. {:<24} {:>10.2}  {:>3} bets  {:>5.1}% won",
                    row.rank, row.username, row.balance, row.total_bets, row.win_rate
                );
            }
        }
        "team" => {
            let r = report::team_stats(&*book, arg(rest, 0, "team")?)?;
            println!("{} ({}, {})", r.name, r.league, r.tournament.display_name());
            println!(
                "  Position: {}",
                r.position.map_or("-".to_string(), |p| p.to_string())
            );
            println!(
                "  Form:     {} ({}W {}D {}L, {} pts, {:.1}%)",
                r.form, r.wins, r.draws, r.losses, r.points, r.percentage
            );
        }
        "compare" => {
            let c = report::compare_teams(
                &*book,
                arg(rest, 0, "team1")?,
                arg(rest, 1, "team2")?,
                tournament,
            )?;
            for r in [&c.team1, &c.team2] {
                println!(
                    "{} ({})  position {}  form {} ({} pts)",
                    r.name,
                    r.tournament.display_name(),
                    r.position.map_or("-".to_string(), |p| p.to_string()),
                    r.form,
                    r.points
                );
            }
            println!(
                "  1: {:.2}   X: {:.2}   2: {:.2}",
                c.odds.team1, c.odds.draw, c.odds.team2
            );
            if c.advantages.is_empty() {
                println!("  Evenly matched");
            }
            for a in &c.advantages {
                match a {
                    Advantage::Position { team, ours, theirs } => {
                        println!("  {team} sits higher ({ours} vs {theirs})")
                    }
                    Advantage::Form { team, ours, theirs } => {
                        println!("  {team} is in better form ({ours} vs {theirs} pts)")
                    }
                    Advantage::League { team, ours, theirs } => {
                        println!("  {team} plays in a higher league ({ours} vs {theirs})")
                    }
                }
            }
        }
        "stats" => {
            let s = report::book_stats(book);
            println!("Users:        {}", s.users);
            println!("Teams:        {}", s.teams);
            println!("Upcoming:     {}", s.upcoming);
            println!("Finished:     {}", s.finished);
            println!("Bets:         {} ({} active)", s.bets, s.active_bets);
            println!("Volume:       {:.2}", s.volume);
            println!("Avg balance:  {:.2}", s.average_balance);
            if let Some((name, balance)) = s.richest {
                println!("Richest:      {name} ({balance:.2})");
            }
        }
        "export" => {
            let path = PathBuf::from(arg(rest, 0, "output file")?);
            persist::write_snapshot(&path, book)?;
            println!("Snapshot written to {}", path.display());
        }
        "help" | "--help" | "-h" => println!("{USAGE}"),
        other => bail!("unknown command {other}\n\n{USAGE}"),
    }
    Ok(())
}

fn print_settlement(s: &settlement::Settlement) {
    println!(
        "Match {} finished {} ({})",
        s.match_id,
        s.score,
        s.outcome.code()
    );
    let won = s.verdicts.iter().filter(|v| v.won).count();
    println!(
        "  {} bets settled: {} won, {} lost, {:.2} paid out",
        s.verdicts.len(),
        won,
        s.verdicts.len() - won,
        s.total_paid()
    );
    for (user, balance) in &s.balances {
        println!("  {user}: {balance:.2}");
    }
}

fn resolve(book: &Book, query: &str, tournament: Option<Tournament>) -> Result<String> {
    if let Some(team) = schedule::find_team(book, query, tournament) {
        return Ok(team.name.clone());
    }
    let hints = schedule::team_suggestions(book, query, 3, tournament)
        .into_iter()
        .map(|s| s.full_name)
        .collect::<Vec<_>>();
    if hints.is_empty() {
        Err(anyhow!("unknown team \"{query}\""))
    } else {
        Err(anyhow!(
            "unknown team \"{query}\"; did you mean: {}",
            hints.join(", ")
        ))
    }
}

fn arg<'a>(rest: &'a [String], idx: usize, name: &str) -> Result<&'a str> {
    rest.get(idx)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing argument: {name}\n\n{USAGE}"))
}

fn parse_amount(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .with_context(|| format!("invalid amount {raw}"))
}

/// Removes `--name VALUE` or `--name=VALUE` from the argument list.
fn take_value_flag(args: &mut Vec<String>, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    if let Some(idx) = args.iter().position(|a| a.starts_with(&prefix)) {
        let value = args.remove(idx)[prefix.len()..].trim().to_string();
        return (!value.is_empty()).then_some(value);
    }
    let idx = args.iter().position(|a| a == name)?;
    args.remove(idx);
    if idx < args.len() {
        let value = args.remove(idx);
        if !value.trim().is_empty() {
            return Some(value);
        }
    }
    None
}

fn take_switch(args: &mut Vec<String>, name: &str) -> bool {
    match args.iter().position(|a| a == name) {
        Some(idx) => {
            args.remove(idx);
            true
        }
        None => false,
    }
}
