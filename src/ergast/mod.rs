//! Client and normalizer for the Ergast motor racing API
//!
//! Endpoints:
//! - Season results: {base}{season}/results.json?limit=N
//! - Race results: {base}{season}/{round}/results.json?limit=N
//! - Qualifying: same paths with qualifying.json

pub mod client;
pub mod normalize;

pub use client::{ErgastClient, FetchError, ResultSource};
pub use normalize::{NormalizeError, Normalized, ResultNormalizer};

/// Base URL of the Ergast F1 API
pub const BASE_URL: &str = "http://ergast.com/api/f1/";

/// Fixed page size; a full season of results fits in one page
pub const RESULT_LIMIT: u32 = 1000;

/// Which classification to request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    Race,
    Qualifying,
}

impl ResultKind {
    pub fn from_qualifying_flag(qualifying: bool) -> Self {
        if qualifying {
            ResultKind::Qualifying
        } else {
            ResultKind::Race
        }
    }

    /// JSON document name for this kind
    pub fn document(&self) -> &'static str {
        match self {
            ResultKind::Race => "results.json",
            ResultKind::Qualifying => "qualifying.json",
        }
    }
}

impl std::fmt::Display for ResultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultKind::Race => write!(f, "race results"),
            ResultKind::Qualifying => write!(f, "qualifying"),
        }
    }
}

/// Build a results URL for a season, or for one round of it
pub fn results_url(base: &str, season: u32, round: Option<u32>, kind: ResultKind, limit: u32) -> String {
    let base = base.trim_end_matches('/');
    match round {
        Some(round) => format!(
            "{}/{}/{}/{}?limit={}",
            base,
            season,
            round,
            kind.document(),
            limit
        ),
        None => format!("{}/{}/{}?limit={}", base, season, kind.document(), limit),
    }
}
