use std::env;
use std::path::PathBuf;

use crate::state::DEFAULT_BALANCE;

const APP_DIR: &str = "matchday_odds";
const DB_FILE: &str = "book.sqlite";

#[derive(Debug, Clone, PartialEq)]
pub struct BookConfig {
    pub default_balance: f64,
    /// `None` when neither `BOOK_DB_PATH` nor a cache directory is available.
    pub db_path: Option<PathBuf>,
    pub sim_seed: Option<u64>,
    pub log_filter: String,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            default_balance: DEFAULT_BALANCE,
            db_path: default_db_path(),
            sim_seed: None,
            log_filter: "info".to_string(),
        }
    }
}

impl BookConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(opt_env)
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let default_balance = get("BOOK_DEFAULT_BALANCE")
            .and_then(|val| val.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_BALANCE)
            .max(0.0);
        let db_path = get("BOOK_DB_PATH")
            .map(PathBuf::from)
            .or_else(default_db_path);
        let sim_seed = get("BOOK_SIM_SEED").and_then(|val| val.trim().parse::<u64>().ok());
        let log_filter = get("BOOK_LOG").unwrap_or_else(|| "info".to_string());
        Self {
            default_balance,
            db_path,
            sim_seed,
            log_filter,
        }
    }
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .and_then(|val| if val.trim().is_empty() { None } else { Some(val) })
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Some(base) = opt_env("XDG_CACHE_HOME") {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = opt_env("HOME")?;
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}
