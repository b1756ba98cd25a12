//! Alpha-beta threat-space search with iterative deepening, a shared
//! transposition table, killer moves, and a position budget.

pub mod killers;
pub mod tt;
pub mod tuner;

use std::fmt;
use std::sync::Arc;

use sente_core::{Board, BoardError, GameConfig, Move, Score, Sign};
use tracing::trace;

use crate::eval::{score_from_expectation, static_evaluation};
use crate::movegen::action::{Action, ActionList, ActionStack};
use crate::movegen::{GeneratorMode, ThreatGenerator, apply_ordering};
use crate::nnue::accumulator::InferenceNnue;
use crate::patterns::calculator::PatternCalculator;
use crate::search::killers::KillerTable;
use crate::search::tt::{Bound, SharedHashTable, TtEntry};
use crate::search::tuner::BudgetTuner;

/// How much effort the solver should spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TssMode {
    /// Immediate outcomes only (one ply of statics).
    Basic,
    /// Full static solver, no tree search.
    Static,
    /// Iterative-deepening alpha-beta over forcing moves.
    Recursive,
}

/// Result of one solver invocation.
#[derive(Debug, Clone)]
pub struct TssResult {
    /// Proven score, or an unproven evaluation.
    pub score: Score,
    /// Root candidates, best first, with per-move scores.
    pub actions: Vec<Action>,
    /// The mover is restricted to the returned candidates.
    pub must_defend: bool,
    /// The candidates exhaust all admissible moves.
    pub is_fully_expanded: bool,
}

impl TssResult {
    /// Whether the search proved the position.
    pub fn is_solved(&self) -> bool {
        self.score.is_proven()
    }
}

/// Counters accumulated across solver invocations.
#[derive(Debug, Clone, Copy, Default)]
pub struct TssStats {
    /// Solver invocations.
    pub calls: u64,
    /// Invocations that ended with a proven score.
    pub solved: u64,
    /// Positions visited by the recursive search.
    pub positions: u64,
    /// Transposition table probes.
    pub tt_probes: u64,
    /// Probes that found a usable entry.
    pub tt_hits: u64,
}

impl fmt::Display for TssStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "solved {}/{} calls, {} positions, tt {}/{} hits",
            self.solved, self.calls, self.positions, self.tt_hits, self.tt_probes
        )
    }
}

/// Depth step between iterative-deepening iterations: one
/// attacker/defender pair on each side.
const DEPTH_STEP: usize = 4;

/// Hard ceiling on search depth.
const MAX_DEPTH: usize = 127;

/// Negamax threat-space search. One instance per worker thread; the
/// transposition table is the only shared piece.
pub struct ThreatSpaceSearch {
    config: GameConfig,
    calculator: PatternCalculator,
    generator: ThreatGenerator,
    action_stack: ActionStack,
    killers: KillerTable,
    shared_table: Arc<SharedHashTable>,
    nnue: Option<InferenceNnue>,
    tuner: BudgetTuner,
    stats: TssStats,
    position_counter: u64,
    max_positions: u64,
    search_mode: GeneratorMode,
}

impl ThreatSpaceSearch {
    pub fn new(config: GameConfig, shared_table: Arc<SharedHashTable>) -> ThreatSpaceSearch {
        ThreatSpaceSearch {
            config,
            calculator: PatternCalculator::new(config),
            generator: ThreatGenerator::new(config),
            action_stack: ActionStack::new(config.size()),
            // killers are keyed by the absolute game ply
            killers: KillerTable::new(config.size() + 1),
            shared_table,
            nnue: None,
            tuner: BudgetTuner::new(1000),
            stats: TssStats::default(),
            position_counter: 0,
            max_positions: 0,
            search_mode: GeneratorMode::Threats,
        }
    }

    /// Attach an NNUE evaluator for leaf evaluation.
    pub fn set_nnue(&mut self, nnue: InferenceNnue) {
        self.nnue = Some(nnue);
    }

    /// Accumulated counters.
    pub fn stats(&self) -> TssStats {
        self.stats
    }

    /// Reset counters and the position-budget tuner samples.
    pub fn clear_stats(&mut self) {
        self.stats = TssStats::default();
        self.tuner.reset();
        self.killers.clear();
    }

    /// Feed a speed sample (positions per second) to the budget tuner.
    pub fn tune(&mut self, speed: f32) {
        self.tuner.update(speed);
    }

    /// The budget currently recommended by the auto-tuner.
    pub fn tuned_budget(&self) -> u64 {
        self.tuner.budget()
    }

    /// Direct access to the calculator, synchronized to the last solved
    /// position. Used by callers needing forbidden-move answers.
    pub fn calculator_mut(&mut self) -> &mut PatternCalculator {
        &mut self.calculator
    }

    /// Solve a position.
    ///
    /// A `max_positions` budget of zero restricts `Recursive` mode to
    /// the static solver result.
    pub fn solve(
        &mut self,
        board: &Board,
        sign_to_move: Sign,
        mode: TssMode,
        max_positions: u64,
    ) -> Result<TssResult, BoardError> {
        self.calculator.set_board(board, sign_to_move)?;
        if let Some(nnue) = self.nnue.as_mut() {
            nnue.refresh(&self.calculator);
        }
        self.stats.calls += 1;
        self.position_counter = 0;
        self.max_positions = max_positions;

        let mut root = self.action_stack.push_list();
        let score = match mode {
            TssMode::Basic => {
                self.search_mode = GeneratorMode::Basic;
                self.generator.generate(
                    &mut self.calculator,
                    &mut self.action_stack,
                    &mut root,
                    GeneratorMode::Basic,
                )
            }
            TssMode::Static => {
                self.search_mode = GeneratorMode::Static;
                self.generator.generate(
                    &mut self.calculator,
                    &mut self.action_stack,
                    &mut root,
                    GeneratorMode::Static,
                )
            }
            TssMode::Recursive => {
                self.search_mode = GeneratorMode::Threats;
                let empties = self.config.size() - self.calculator.current_depth();
                let max_depth = empties.min(MAX_DEPTH);
                let mut score = Score::none();
                let mut depth = 1;
                loop {
                    score = self.recursive_solve(depth as i32, Score::MIN, Score::MAX, &mut root, true);
                    trace!(depth, positions = self.position_counter, %score, "deepening step");
                    if score.is_proven() {
                        break;
                    }
                    if self.position_counter >= self.max_positions {
                        break;
                    }
                    if root.is_empty() {
                        break;
                    }
                    if depth >= max_depth {
                        break;
                    }
                    depth = (depth + DEPTH_STEP).min(max_depth);
                }
                score
            }
        };

        let mut actions = root.as_slice(&self.action_stack).to_vec();
        actions.sort_by(|a, b| b.score.cmp(&a.score));
        let result = TssResult {
            score,
            actions,
            must_defend: root.must_defend,
            is_fully_expanded: root.is_fully_expanded || score.is_proven(),
        };
        self.stats.positions += self.position_counter;
        self.stats.solved += u64::from(score.is_proven());
        self.action_stack.pop_list(&root);
        Ok(result)
    }

    fn recursive_solve(
        &mut self,
        mut depth_remaining: i32,
        mut alpha: Score,
        beta: Score,
        actions: &mut ActionList,
        is_root: bool,
    ) -> Score {
        debug_assert!(alpha < beta);
        let hash_key = self.calculator.hash();

        // transposition probe; the root always needs a full action list
        let mut hash_move = None;
        self.stats.tt_probes += 1;
        if let Some(entry) = self.shared_table.seek(hash_key) {
            self.stats.tt_hits += 1;
            if self.is_move_legal(entry.mv) {
                hash_move = Some(entry.mv);
                if !is_root
                    && (entry.score.is_proven()
                        || (entry.depth as i32 >= depth_remaining
                            && match entry.bound {
                                Bound::Exact => true,
                                Bound::Lower => entry.score >= beta,
                                Bound::Upper => entry.score <= alpha,
                                Bound::None => false,
                            }))
                {
                    return entry.score;
                }
            }
        }

        let static_score = self.generator.generate(
            &mut self.calculator,
            &mut self.action_stack,
            actions,
            self.search_mode,
        );
        if static_score.is_proven() {
            return static_score;
        }
        apply_ordering(
            &mut self.action_stack,
            actions,
            hash_move,
            self.killers.get(self.calculator.current_depth()),
        );

        if depth_remaining <= 0 {
            return self.evaluate();
        }

        let original_alpha = alpha;
        let mut best_score = Score::MIN;
        for i in 0..actions.len() {
            self.position_counter += 1;
            if self.position_counter > self.max_positions {
                // out of budget: make every child look like a leaf so the
                // search unwinds correctly but quickly
                depth_remaining = 1;
            }

            let mv = actions.get(&self.action_stack, i).mv;
            let mut child = self.action_stack.push_list();
            self.calculator.add_move(mv);
            if let Some(nnue) = self.nnue.as_mut() {
                nnue.update(&self.calculator);
            }
            self.shared_table.prefetch(self.calculator.hash());

            let reply = self.recursive_solve(depth_remaining - 1, -beta, -alpha, &mut child, false);
            let action_score = (-reply).increase_distance();

            self.calculator.undo_move(mv);
            if let Some(nnue) = self.nnue.as_mut() {
                nnue.update(&self.calculator);
            }
            self.action_stack.pop_list(&child);

            actions.set_score(&mut self.action_stack, i, action_score);
            best_score = best_score.max(action_score);
            alpha = alpha.max(action_score);
            if action_score >= beta || action_score.is_win() {
                self.killers.insert(mv, self.calculator.current_depth());
                break;
            }
        }

        // an empty list, or all lines losing without a forced defense,
        // says nothing about this position: fall back to the evaluation
        if actions.is_empty() || (best_score.is_loss() && !actions.must_defend) {
            best_score = self.evaluate();
        }

        if best_score.is_proven() {
            let best_move =
                actions.best(&self.action_stack).map(|a| a.mv).unwrap_or(Move::NULL);
            let bound = if best_score <= original_alpha {
                Bound::Upper
            } else if best_score >= beta {
                Bound::Lower
            } else {
                Bound::Exact
            };
            self.shared_table.insert(
                hash_key,
                TtEntry::new(
                    best_move,
                    best_score,
                    bound,
                    depth_remaining.clamp(0, 255) as u8,
                    actions.must_defend,
                    actions.has_initiative,
                ),
            );
            self.killers.insert(best_move, self.calculator.current_depth());
        }

        best_score
    }

    /// Stale table entries may carry moves from other positions; anything
    /// not playable right now is rejected here.
    fn is_move_legal(&self, mv: Move) -> bool {
        !mv.is_null()
            && (mv.row as usize) < self.config.rows
            && (mv.col as usize) < self.config.cols
            && mv.sign == self.calculator.sign_to_move()
            && self.calculator.sign_at(mv.row, mv.col) == Sign::None
    }

    fn evaluate(&mut self) -> Score {
        match self.nnue.as_mut() {
            Some(nnue) => score_from_expectation(nnue.forward()),
            None => static_evaluation(&self.calculator),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_text(stones: &[(u8, u8, char)]) -> Board {
        let mut grid = vec![vec!['_'; 15]; 15];
        for &(row, col, c) in stones {
            grid[row as usize][col as usize] = c;
        }
        grid.into_iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n")
            .parse()
            .unwrap()
    }

    fn tss(rules: sente_core::GameRules) -> ThreatSpaceSearch {
        let config = GameConfig::new(rules);
        ThreatSpaceSearch::new(config, Arc::new(SharedHashTable::new(1 << 16)))
    }

    #[test]
    fn zero_budget_returns_the_static_result() {
        use sente_core::GameRules;
        let mut search = tss(GameRules::Standard);
        // a four in a row is an immediate five threat
        let board = board_text(&[
            (7, 5, 'X'),
            (7, 6, 'X'),
            (7, 7, 'X'),
            (7, 8, 'X'),
            (0, 0, 'O'),
            (0, 2, 'O'),
            (0, 4, 'O'),
            (0, 6, 'O'),
        ]);
        let result = search.solve(&board, Sign::Cross, TssMode::Recursive, 0).unwrap();
        assert_eq!(result.score, Score::win_in(1));
    }

    #[test]
    fn finds_mate_in_five_by_deepening() {
        use sente_core::GameRules;
        let mut search = tss(GameRules::Standard);
        // a 4x3 fork at (7,7): half-open four to the left, open three down
        let board = board_text(&[
            (7, 4, 'X'),
            (7, 5, 'X'),
            (7, 6, 'X'),
            (7, 3, 'O'),
            (8, 7, 'X'),
            (9, 7, 'X'),
            (0, 0, 'O'),
            (0, 2, 'O'),
            (0, 4, 'O'),
            (0, 6, 'O'),
        ]);
        let result = search.solve(&board, Sign::Cross, TssMode::Recursive, 10_000).unwrap();
        assert!(result.score.is_win(), "expected a forced win, got {}", result.score);
        assert!(result.score.distance() <= 5);
        assert!(!result.actions.is_empty());
        assert!(result.actions[0].score.is_win());
    }

    #[test]
    fn tiny_budget_never_claims_a_false_win() {
        use sente_core::GameRules;
        let mut search = tss(GameRules::Standard);
        let board = board_text(&[
            (7, 4, 'X'),
            (7, 5, 'X'),
            (7, 6, 'X'),
            (7, 3, 'O'),
            (8, 7, 'X'),
            (9, 7, 'X'),
            (0, 0, 'O'),
            (0, 2, 'O'),
            (0, 4, 'O'),
            (0, 6, 'O'),
        ]);
        let result = search.solve(&board, Sign::Cross, TssMode::Recursive, 10).unwrap();
        // with 10 positions the proof may not complete, but any win
        // claimed must be real: verify by re-solving with a full budget
        if result.score.is_win() {
            let mut verify = tss(GameRules::Standard);
            let full = verify.solve(&board, Sign::Cross, TssMode::Recursive, 100_000).unwrap();
            assert!(full.score.is_win());
        }
    }

    #[test]
    fn forced_defense_is_reported() {
        use sente_core::GameRules;
        let mut search = tss(GameRules::Standard);
        let board = board_text(&[
            (7, 4, 'O'),
            (7, 5, 'O'),
            (7, 6, 'O'),
            (7, 7, 'O'),
            (7, 3, 'X'),
            (0, 0, 'X'),
            (0, 2, 'X'),
            (1, 5, 'X'),
        ]);
        let result = search.solve(&board, Sign::Cross, TssMode::Basic, 0).unwrap();
        let _ = result;
        let result = search.solve(&board, Sign::Cross, TssMode::Recursive, 1000).unwrap();
        assert!(result.must_defend);
        assert!(result.actions.iter().any(|a| a.mv == Move::new(7, 8, Sign::Cross)));
    }

    #[test]
    fn solver_statistics_accumulate() {
        use sente_core::GameRules;
        let mut search = tss(GameRules::Standard);
        let board = board_text(&[(7, 7, 'X'), (7, 8, 'O')]);
        search.solve(&board, Sign::Cross, TssMode::Recursive, 100).unwrap();
        search.solve(&board, Sign::Cross, TssMode::Static, 0).unwrap();
        let stats = search.stats();
        assert_eq!(stats.calls, 2);
        search.clear_stats();
        assert_eq!(search.stats().calls, 0);
    }
}
