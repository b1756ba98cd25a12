//! Core game types: board representation, moves, scores, and hashing.

mod board;
mod error;
mod mov;
mod outcome;
mod rules;
mod score;
mod sign;
mod value;
pub mod zobrist;

pub use board::Board;
pub use error::{BoardError, ParseBoardError};
pub use mov::Move;
pub use outcome::{GameOutcome, game_outcome};
pub use rules::{GameConfig, GameRules, UnknownRule};
pub use score::{MAX_EVAL, Score};
pub use sign::Sign;
pub use value::{ProvenValue, Value};
