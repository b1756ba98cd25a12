//! Monte Carlo tree search over the node cache, guided by the
//! threat-space solver and a pluggable evaluator.

pub mod cache;
pub mod engine;
pub mod generate;
pub mod lock;
pub mod node;
pub mod select;
pub mod task;
pub mod tree;
pub mod worker;

pub use cache::{CacheConfig, CompressedBoard, NodeCache};
pub use engine::{SearchEngine, SearchReport};
pub use generate::EdgeGenerator;
pub use lock::TwoTierLock;
pub use node::{Edge, Node, NodeId};
pub use select::EdgeSelector;
pub use task::SearchTask;
pub use tree::{ExpandOutcome, SelectOutcome, Tree, TreeConfig};
pub use worker::{Evaluator, SearchControl, UniformEvaluator, WorkerConfig, run_search};
