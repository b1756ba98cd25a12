//! Pattern recognition, tactical solving, and the alpha-beta
//! threat-space search.

pub mod eval;
pub mod movegen;
pub mod nnue;
pub mod patterns;
pub mod search;
pub mod solver;

pub use eval::static_evaluation;
pub use movegen::action::{Action, ActionList, ActionStack};
pub use movegen::{GeneratorMode, ThreatGenerator};
pub use nnue::{InferenceNnue, NnueWeights};
pub use patterns::{
    Direction, PatternCalculator, PatternTable, PatternType, ThreatHistogram, ThreatTable,
    ThreatType,
};
pub use search::tt::{Bound, SharedHashTable, TtEntry};
pub use search::{ThreatSpaceSearch, TssMode, TssResult, TssStats};
pub use solver::StaticSolver;
