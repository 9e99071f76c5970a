use thiserror::Error;

/// Coarse classification used by hosts to map failures onto their own responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    StateConflict,
}

/// Every failure the core can report. None of them leave partially mutated state behind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("unknown team \"{query}\"")]
    UnknownTeam {
        query: String,
        suggestions: Vec<String>,
    },

    #[error("amount must be a positive number, got {0}")]
    InvalidAmount(f64),

    #[error("insufficient balance: {balance:.2} available, {amount:.2} requested")]
    InsufficientFunds { balance: f64, amount: f64 },

    #[error("result {outcome} does not match score {home}-{away}")]
    InvalidResult {
        outcome: String,
        home: u32,
        away: u32,
    },

    #[error("unknown special market \"{0}\"")]
    UnknownMarket(String),

    #[error("unknown outcome \"{0}\" (expected team1, draw or team2)")]
    UnknownOutcome(String),

    #[error("unknown tournament \"{0}\"")]
    UnknownTournament(String),

    #[error("invalid score \"{0}\" (expected H-A)")]
    InvalidScore(String),

    #[error("{0} cannot play against itself")]
    SameTeam(String),

    #[error("invalid bet: {0}")]
    InvalidBet(String),

    #[error("match {0} not found")]
    MatchNotFound(String),

    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("match {0} already has a result")]
    AlreadyResolved(String),

    #[error("not eligible: {0}")]
    NotEligible(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::UnknownTeam { .. }
            | CoreError::InvalidAmount(_)
            | CoreError::InsufficientFunds { .. }
            | CoreError::InvalidResult { .. }
            | CoreError::UnknownMarket(_)
            | CoreError::UnknownOutcome(_)
            | CoreError::UnknownTournament(_)
            | CoreError::InvalidScore(_)
            | CoreError::SameTeam(_)
            | CoreError::InvalidBet(_) => ErrorKind::Validation,
            CoreError::MatchNotFound(_) | CoreError::UserNotFound(_) => ErrorKind::NotFound,
            CoreError::AlreadyResolved(_) | CoreError::NotEligible(_) => ErrorKind::StateConflict,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_group_variants() {
        assert_eq!(CoreError::InvalidAmount(-1.0).kind(), ErrorKind::Validation);
        assert_eq!(
            CoreError::MatchNotFound("m".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CoreError::AlreadyResolved("m".to_string()).kind(),
            ErrorKind::StateConflict
        );
    }

    #[test]
    fn messages_render_amounts_with_two_decimals() {
        let err = CoreError::InsufficientFunds {
            balance: 10.0,
            amount: 12.5,
        };
        assert_eq!(
            err.to_string(),
            "insufficient balance: 10.00 available, 12.50 requested"
        );
    }
}
