pub mod config;
pub mod error;
pub mod market;
pub mod odds;
pub mod persist;
pub mod report;
pub mod schedule;
pub mod settlement;
pub mod simulate;
pub mod state;
pub mod strength;
pub mod tournament;
pub mod wager;
