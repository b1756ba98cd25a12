//! NNUE: an incrementally updated quantized network for leaf evaluation.

pub mod accumulator;
pub mod features;
pub mod network;

pub use accumulator::InferenceNnue;
pub use network::{NnueError, NnueWeights};
