//! Record flattening, composite ranking, table fan-out and cleaning.
//!
//! Stages run in this order and each returns a fresh collection:
//! [`flatten_all`] -> [`rank`] (optional) -> [`split`] -> [`clean`].

pub mod clean;
pub mod flatten;
pub mod rank;
pub mod split;

pub use clean::{clean, normalize_rate, CleanError};
pub use flatten::{flatten, flatten_all, FlattenError, NestedGroup, NESTED_GROUPS, REQUIRED_GROUPS};
pub use rank::{rank, ComponentScores, RankError, RankedRow, ScoringMode, ScoringWeights};
pub use split::split;

pub const CRATE_NAME: &str = "scorecard-transform";
