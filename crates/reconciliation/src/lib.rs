//! Quote reconciliation: match what a supplier quoted against what the studio
//! requested.
//!
//! The engine is deterministic and side-effect free. It never fails: an empty
//! candidate list (e.g. document extraction produced nothing) yields every
//! requested line as missing plus a manual-entry signal.

pub mod candidate;
pub mod engine;
pub mod similarity;

pub use candidate::{CandidateItem, RequestedItem};
pub use engine::{
    Classification, DEFAULT_MATCH_THRESHOLD, LineMatch, MatchMethod, MatchResult, Reconciler,
    reconcile,
};
pub use similarity::{name_similarity, normalize_key};
