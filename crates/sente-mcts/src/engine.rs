//! The engine facade: one object owning the tree, the shared hash
//! table, and the worker pool, driven by the protocol layer.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use sente_core::{Board, BoardError, GameConfig, Move, Sign};
use sente_engine::{PatternCalculator, SharedHashTable};
use tracing::info;

use crate::lock::TwoTierLock;
use crate::select::EdgeSelector;
use crate::task::SearchTask;
use crate::tree::{Tree, TreeConfig};
use crate::worker::{Evaluator, SearchControl, UniformEvaluator, WorkerConfig, run_search};

/// Outcome of one search request.
#[derive(Debug, Clone)]
pub struct SearchReport {
    /// The move to play.
    pub best_move: Option<Move>,
    /// Expected outcome at the root in `[0, 1]`.
    pub evaluation: f32,
    /// Simulations completed during this request.
    pub simulations: u64,
    /// Nodes held by the cache afterwards.
    pub nodes: usize,
    /// Deepest selection path seen.
    pub max_depth: usize,
}

/// Top-level search engine: position management plus search requests.
pub struct SearchEngine {
    game_config: GameConfig,
    tree: Arc<TwoTierLock<Tree>>,
    shared_table: Arc<SharedHashTable>,
    worker_config: WorkerConfig,
    stop_flag: Arc<AtomicBool>,
    board: Board,
    sign_to_move: Sign,
}

impl SearchEngine {
    pub fn new(game_config: GameConfig) -> SearchEngine {
        SearchEngine {
            game_config,
            tree: Arc::new(TwoTierLock::new(Tree::new(game_config, TreeConfig::default()))),
            shared_table: Arc::new(SharedHashTable::new(1 << 20)),
            worker_config: WorkerConfig::default(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            board: Board::empty(game_config.rows, game_config.cols),
            sign_to_move: Sign::Cross,
        }
    }

    #[inline]
    pub fn game_config(&self) -> GameConfig {
        self.game_config
    }

    #[inline]
    pub fn board(&self) -> &Board {
        &self.board
    }

    #[inline]
    pub fn sign_to_move(&self) -> Sign {
        self.sign_to_move
    }

    /// Number of worker threads for subsequent searches.
    pub fn set_threads(&mut self, threads: usize) {
        self.worker_config.threads = threads.max(1);
    }

    /// Position budget of the per-leaf tactical solver.
    pub fn set_solver_budget(&mut self, budget: u64) {
        self.worker_config.solver_budget = budget;
    }

    /// Install a position. Setup errors leave the engine untouched.
    pub fn set_position(&mut self, board: &Board, sign_to_move: Sign) -> Result<(), BoardError> {
        board.validate()?;
        self.board = board.clone();
        self.sign_to_move = sign_to_move;
        self.tree.lock_high().set_board(board, sign_to_move, false);
        self.shared_table.increase_generation();
        Ok(())
    }

    /// Start from an empty board.
    pub fn reset(&mut self) {
        self.board = Board::empty(self.game_config.rows, self.game_config.cols);
        self.sign_to_move = Sign::Cross;
        self.tree.lock_high().clear();
        self.shared_table.clear();
    }

    /// Play a move on the engine's board.
    pub fn play_move(&mut self, mv: Move) -> Result<(), BoardError> {
        let mut board = self.board.clone();
        board.put_move(mv)?;
        let sign = mv.sign.invert();
        self.board = board;
        self.sign_to_move = sign;
        self.tree.lock_high().set_board(&self.board, sign, false);
        Ok(())
    }

    /// Run a search bounded by time and/or simulations with the default
    /// evaluator.
    pub fn search(&self, time_limit: Option<Duration>, max_simulations: Option<u32>) -> SearchReport {
        self.search_with(time_limit, max_simulations, || Box::new(UniformEvaluator))
    }

    /// Run a search with a custom evaluator factory.
    pub fn search_with<F>(
        &self,
        time_limit: Option<Duration>,
        max_simulations: Option<u32>,
        make_evaluator: F,
    ) -> SearchReport
    where
        F: Fn() -> Box<dyn Evaluator> + Sync,
    {
        self.stop_flag.store(false, std::sync::atomic::Ordering::Release);
        let mut control = match time_limit {
            Some(limit) => SearchControl::until(Arc::clone(&self.stop_flag), Instant::now() + limit),
            None => SearchControl::infinite(Arc::clone(&self.stop_flag)),
        };
        if let Some(max) = max_simulations {
            control = control.with_max_simulations(max);
        }

        let simulations = run_search(
            &self.tree,
            &self.shared_table,
            self.game_config,
            &self.worker_config,
            &control,
            make_evaluator,
        );

        let guard = self.tree.lock_high();
        let report = SearchReport {
            best_move: best_move_of(&guard),
            evaluation: guard.evaluation(),
            simulations,
            nodes: guard.node_count(),
            max_depth: guard.max_depth(),
        };
        info!(
            best = %report.best_move.map(|m| m.to_text()).unwrap_or_else(|| "none".into()),
            eval = report.evaluation,
            simulations,
            nodes = report.nodes,
            "search finished"
        );
        report
    }

    /// Ask a running search to stop.
    pub fn stop(&self) {
        self.stop_flag.store(true, std::sync::atomic::Ordering::Release);
    }

    /// Best root move without searching (tree state as-is).
    pub fn best_move(&self) -> Option<Move> {
        best_move_of(&self.tree.lock_high())
    }

    /// Renju-forbidden squares of the current position for the mover.
    pub fn forbidden_moves(&self) -> Vec<Move> {
        if !self.game_config.rules.has_forbidden_moves(self.sign_to_move) {
            return Vec::new();
        }
        let mut calculator = PatternCalculator::new(self.game_config);
        if calculator.set_board(&self.board, self.sign_to_move).is_err() {
            return Vec::new();
        }
        let mut forbidden = Vec::new();
        for mv in self.board.empty_squares() {
            if calculator.is_forbidden(self.sign_to_move, mv.row, mv.col) {
                forbidden.push(mv);
            }
        }
        forbidden
    }

    /// The task type matching this engine's geometry. Handy for custom
    /// evaluator tests.
    pub fn new_task(&self) -> SearchTask {
        SearchTask::new(self.game_config)
    }
}

fn best_move_of(tree: &Tree) -> Option<Move> {
    let root = tree.root_node()?;
    if root.is_leaf() {
        return None;
    }
    let mut selector = EdgeSelector::BestEdge { style_factor: 0.5 };
    let index = selector.select(tree.root_id()?, root);
    Some(root.edge(index).mv())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sente_core::GameRules;

    #[test]
    fn engine_finds_the_winning_move() {
        let mut engine = SearchEngine::new(GameConfig::new(GameRules::Standard));
        let mut board = Board::empty(15, 15);
        for col in 4..8 {
            board.put_move(Move::new(7, col, Sign::Cross)).unwrap();
            board.put_move(Move::new(0, ((col * 3) % 15) as u8, Sign::Circle)).unwrap();
        }
        engine.set_position(&board, Sign::Cross).unwrap();

        let report = engine.search(None, Some(32));
        let best = report.best_move.expect("winning move found");
        assert!(
            best == Move::new(7, 3, Sign::Cross) || best == Move::new(7, 8, Sign::Cross),
            "expected a five completion, got {best}"
        );
    }

    #[test]
    fn set_position_rejects_bad_boards() {
        let mut engine = SearchEngine::new(GameConfig::new(GameRules::Standard));
        let mut bad = Board::empty(15, 15);
        bad.put_move(Move::new(0, 0, Sign::Cross)).unwrap();
        bad.put_move(Move::new(0, 1, Sign::Cross)).unwrap();
        assert!(engine.set_position(&bad, Sign::Cross).is_err());
        // the engine still searches from its previous (empty) position
        let report = engine.search(None, Some(8));
        assert!(report.simulations > 0);
    }

    #[test]
    fn play_move_advances_the_position() {
        let mut engine = SearchEngine::new(GameConfig::new(GameRules::Standard));
        engine.play_move(Move::new(7, 7, Sign::Cross)).unwrap();
        assert_eq!(engine.sign_to_move(), Sign::Circle);
        assert_eq!(engine.board().at(7, 7), Sign::Cross);
        assert!(engine.play_move(Move::new(7, 7, Sign::Circle)).is_err());
    }

    #[test]
    fn forbidden_moves_on_a_renju_board() {
        let mut engine = SearchEngine::new(GameConfig::new(GameRules::Renju));
        let mut board = Board::empty(15, 15);
        for mv in [
            Move::new(7, 5, Sign::Cross),
            Move::new(7, 6, Sign::Cross),
            Move::new(5, 7, Sign::Cross),
            Move::new(6, 7, Sign::Cross),
        ] {
            board.put_move(mv).unwrap();
        }
        for col in [0u8, 2, 4, 6] {
            board.put_move(Move::new(0, col, Sign::Circle)).unwrap();
        }
        engine.set_position(&board, Sign::Cross).unwrap();
        let forbidden = engine.forbidden_moves();
        assert!(forbidden.contains(&Move::location(7, 7)));
    }
}
