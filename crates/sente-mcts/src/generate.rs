//! Edge generators: turn solver and network output into the edge vector
//! of a new node.

use sente_core::{GameOutcome, GameRules, Move, ProvenValue, Score, Sign, Value, game_outcome};

use crate::node::Edge;
use crate::task::SearchTask;

/// Pluggable edge-generation strategies. The root-only variants wrap a
/// base generator applied everywhere else.
pub enum EdgeGenerator {
    /// Edges from policy above a threshold, pruned to `max_edges`.
    Base { policy_threshold: f32, max_edges: usize },
    /// Solver edges verbatim when present, else policy edges.
    Solver { policy_threshold: f32, max_edges: usize },
    /// At the root, mix a noise matrix into the policy.
    Noisy { noise_matrix: Vec<f32>, noise_weight: f32, base: Box<EdgeGenerator> },
    /// Below `balance_depth` plies, take the full policy unpruned.
    Balanced { balance_depth: usize, base: Box<EdgeGenerator> },
    /// At the root, drop moves inside the central square.
    CenterExcluding { square_size: usize, base: Box<EdgeGenerator> },
    /// At the root, keep only moves inside the central square.
    CenterOnly { square_size: usize, base: Box<EdgeGenerator> },
    /// At the root, drop moves equivalent under a board symmetry.
    SymmetricalExcluding { base: Box<EdgeGenerator> },
}

impl EdgeGenerator {
    pub fn base(policy_threshold: f32, max_edges: usize) -> EdgeGenerator {
        EdgeGenerator::Base { policy_threshold, max_edges }
    }

    pub fn solver(policy_threshold: f32, max_edges: usize) -> EdgeGenerator {
        EdgeGenerator::Solver { policy_threshold, max_edges }
    }

    /// Fill `task`'s edges for expansion.
    pub fn generate(&self, rules: GameRules, task: &mut SearchTask) {
        debug_assert!(task.is_ready());
        match self {
            EdgeGenerator::Base { policy_threshold, max_edges } => {
                moves_from_policy(task, *policy_threshold);
                finish_with_terminal_checks(rules, task, Some(*max_edges));
            }
            EdgeGenerator::Solver { policy_threshold, max_edges } => {
                if task.must_defend() || task.is_ready_solver() {
                    if task.prior_edges().is_empty() {
                        // a solved terminal with no candidates: nothing
                        // to expand, the backup uses the task value alone
                        return;
                    }
                    moves_from_solver(task);
                    let prune = if task.must_defend() { None } else { Some(*max_edges) };
                    override_proven(task);
                    prune_and_normalize(task, prune);
                } else {
                    moves_from_policy(task, *policy_threshold);
                    finish_with_terminal_checks(rules, task, Some(*max_edges));
                }
            }
            EdgeGenerator::Noisy { noise_matrix, noise_weight, base } => {
                if task.relative_depth() == 0 {
                    if (task.must_defend() || task.is_ready_solver())
                        && !task.prior_edges().is_empty()
                    {
                        moves_from_solver(task);
                    } else {
                        moves_from_policy(task, 0.0);
                    }
                    check_terminal(rules, task);
                    override_proven(task);
                    let cols = task.board().cols();
                    for edge in task.edges_mut() {
                        let mv = edge.mv();
                        let noise = noise_matrix[mv.row as usize * cols + mv.col as usize];
                        let prior = (1.0 - noise_weight) * edge.policy_prior() + noise_weight * noise;
                        edge.set_policy_prior(prior);
                    }
                    prune_and_normalize(task, None);
                } else {
                    base.generate(rules, task);
                }
            }
            EdgeGenerator::Balanced { balance_depth, base } => {
                if task.absolute_depth() < *balance_depth {
                    moves_from_policy(task, 0.0);
                    finish_with_terminal_checks(rules, task, None);
                } else {
                    base.generate(rules, task);
                }
            }
            EdgeGenerator::CenterExcluding { square_size, base } => {
                if task.relative_depth() == 0 {
                    moves_filtered(task, |board, mv| !in_center_square(board, *square_size, mv));
                    finish_with_terminal_checks(rules, task, None);
                } else {
                    base.generate(rules, task);
                }
            }
            EdgeGenerator::CenterOnly { square_size, base } => {
                if task.relative_depth() == 0 {
                    moves_filtered(task, |board, mv| in_center_square(board, *square_size, mv));
                    finish_with_terminal_checks(rules, task, None);
                } else {
                    base.generate(rules, task);
                }
            }
            EdgeGenerator::SymmetricalExcluding { base } => {
                if task.relative_depth() == 0 {
                    moves_without_symmetric_duplicates(task);
                    finish_with_terminal_checks(rules, task, None);
                } else {
                    base.generate(rules, task);
                }
            }
        }
    }
}

fn finish_with_terminal_checks(rules: GameRules, task: &mut SearchTask, max_edges: Option<usize>) {
    check_terminal(rules, task);
    seed_action_values(task);
    override_proven(task);
    prune_and_normalize(task, max_edges);
}

/// Seed unproven edges with the evaluator's action-value head, when one
/// was produced; the QHead selector reads these before any backup.
fn seed_action_values(task: &mut SearchTask) {
    if task.action_values().is_empty() {
        return;
    }
    let values: Vec<(Move, Option<Value>)> = task
        .edges()
        .iter()
        .map(|edge| (edge.mv(), task.action_value_at(edge.mv())))
        .collect();
    for (edge, (_, value)) in task.edges_mut().iter_mut().zip(values) {
        if !edge.is_proven()
            && let Some(value) = value
        {
            edge.set_value(value);
        }
    }
}

/// One edge per empty square whose policy clears the threshold.
fn moves_from_policy(task: &mut SearchTask, policy_threshold: f32) {
    let sign = task.sign_to_move();
    let board = task.board().clone();
    for mv in board.empty_squares() {
        let prior = task.policy_at(mv);
        if prior >= policy_threshold {
            task.add_edge(Edge::new(mv.with_sign(sign), prior));
        }
    }
}

/// Copy solver prior edges according to the solved outcome: a win keeps
/// only winning edges, a loss must keep every losing reply, anything
/// else drops the pointless losses.
fn moves_from_solver(task: &mut SearchTask) {
    debug_assert!(!task.prior_edges().is_empty(), "solver left no prior edges");
    let outcome = task.score().proven_value();
    let picked: Vec<Edge> = task
        .prior_edges()
        .iter()
        .filter(|edge| match outcome {
            ProvenValue::Win => edge.score().is_win(),
            ProvenValue::Loss => true,
            _ => !edge.score().is_loss(),
        })
        .cloned()
        .collect();
    for mut edge in picked {
        edge.set_policy_prior(task.policy_at(edge.mv()));
        task.add_edge(edge);
    }
}

fn moves_filtered(task: &mut SearchTask, keep: impl Fn(&sente_core::Board, Move) -> bool) {
    let sign = task.sign_to_move();
    let board = task.board().clone();
    for mv in board.empty_squares() {
        if keep(&board, mv) {
            let prior = task.policy_at(mv);
            task.add_edge(Edge::new(mv.with_sign(sign), prior));
        }
    }
}

fn in_center_square(board: &sente_core::Board, size: usize, mv: Move) -> bool {
    let top = board.rows() / 2 - size / 2;
    let left = board.cols() / 2 - size / 2;
    let (row, col) = (mv.row as usize, mv.col as usize);
    row >= top && row < top + size && col >= left && col < left + size
}

/// Index of `(row, col)` under one of the eight square-board symmetries.
fn transform(rows: usize, row: usize, col: usize, symmetry: usize) -> (usize, usize) {
    let n = rows - 1;
    match symmetry {
        1 => (col, row),
        2 => (row, n - col),
        3 => (n - col, row),
        4 => (n - row, col),
        5 => (col, n - row),
        6 => (n - row, n - col),
        7 => (n - col, n - row),
        _ => (row, col),
    }
}

/// Keep one representative move per symmetry orbit of the position.
fn moves_without_symmetric_duplicates(task: &mut SearchTask) {
    let sign = task.sign_to_move();
    let board = task.board().clone();
    if board.rows() != board.cols() {
        moves_from_policy(task, 0.0);
        return;
    }

    let invariant: Vec<usize> = (1..8)
        .filter(|&s| {
            (0..board.rows()).all(|row| {
                (0..board.cols()).all(|col| {
                    let (tr, tc) = transform(board.rows(), row, col, s);
                    board.at(row as u8, col as u8) == board.at(tr as u8, tc as u8)
                })
            })
        })
        .collect();

    let mut dropped = vec![false; board.size()];
    for mv in board.empty_squares() {
        let index = mv.row as usize * board.cols() + mv.col as usize;
        if dropped[index] {
            continue;
        }
        let prior = task.policy_at(mv);
        task.add_edge(Edge::new(mv.with_sign(sign), prior));
        for &s in &invariant {
            let (tr, tc) = transform(board.rows(), mv.row as usize, mv.col as usize, s);
            let twin = tr * board.cols() + tc;
            if twin != index {
                dropped[twin] = true;
            }
        }
    }
}

/// Apply each edge's move and test the rules for an immediate outcome.
fn check_terminal(rules: GameRules, task: &mut SearchTask) {
    let mut board = task.board().clone();
    let edges: &mut Vec<Edge> = task.edges_mut();
    for edge in edges.iter_mut() {
        if edge.is_proven() {
            continue;
        }
        let mv = edge.mv();
        board.put_move(mv).expect("generated move must be legal");
        if let Some(outcome) = game_outcome(rules, &board, mv) {
            edge.set_score(outcome_to_edge_score(outcome, mv.sign));
        }
        board.undo_move(mv).expect("undo of a just-made move");
    }
}

fn outcome_to_edge_score(outcome: GameOutcome, mover: Sign) -> Score {
    match outcome.winner() {
        Some(winner) if winner == mover => Score::win_in(1),
        Some(_) => Score::loss_in(1),
        None => Score::draw(),
    }
}

/// Proven-edge policy override: losses get zero prior and a certain-loss
/// value, wins a dominating prior and a certain-win value.
fn override_proven(task: &mut SearchTask) {
    for edge in task.edges_mut().iter_mut() {
        match edge.score().proven_value() {
            ProvenValue::Loss => {
                edge.set_policy_prior(0.0);
                edge.set_value(Value::LOSS);
            }
            ProvenValue::Win => {
                edge.set_policy_prior(1.0e3);
                edge.set_value(Value::WIN);
            }
            ProvenValue::Draw => {
                edge.set_value(Value::DRAW);
            }
            ProvenValue::Unknown => {}
        }
    }
}

/// Drop the weakest edges beyond `max_edges`, then normalize priors to
/// sum to one (uniform when the sum is zero).
fn prune_and_normalize(task: &mut SearchTask, max_edges: Option<usize>) {
    let edges = task.edges_mut();
    if let Some(limit) = max_edges
        && edges.len() > limit
    {
        edges.sort_by(|a, b| {
            b.policy_prior().partial_cmp(&a.policy_prior()).unwrap_or(std::cmp::Ordering::Equal)
        });
        edges.truncate(limit);
    }

    let sum: f32 = edges.iter().map(Edge::policy_prior).sum();
    if sum <= 0.0 {
        let uniform = 1.0 / edges.len().max(1) as f32;
        for edge in edges.iter_mut() {
            edge.set_policy_prior(uniform);
        }
    } else if (sum - 1.0).abs() > 0.01 {
        for edge in edges.iter_mut() {
            edge.set_policy_prior(edge.policy_prior() / sum);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sente_core::{Board, GameConfig};

    fn ready_task(board: Board, sign: Sign) -> SearchTask {
        let config = GameConfig::with_size(GameRules::Standard, board.rows(), board.cols());
        let mut task = SearchTask::new(config);
        task.set(&board, sign);
        task.mark_ready_network();
        task
    }

    fn uniform_policy(task: &mut SearchTask) {
        let board = task.board().clone();
        let count = board.empty_squares().count().max(1);
        for mv in board.empty_squares() {
            let index = mv.row as usize * board.cols() + mv.col as usize;
            task.policy_mut()[index] = 1.0 / count as f32;
        }
    }

    #[test]
    fn base_generator_normalizes_priors() {
        let mut task = ready_task(Board::empty(15, 15), Sign::Cross);
        uniform_policy(&mut task);
        EdgeGenerator::base(0.0, 32).generate(GameRules::Standard, &mut task);
        assert_eq!(task.edges().len(), 32);
        let sum: f32 = task.edges().iter().map(Edge::policy_prior).sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn zero_policy_distributes_uniformly() {
        let mut task = ready_task(Board::empty(5, 5), Sign::Cross);
        EdgeGenerator::base(0.0, 100).generate(GameRules::Standard, &mut task);
        assert_eq!(task.edges().len(), 25);
        for edge in task.edges() {
            assert!((edge.policy_prior() - 1.0 / 25.0).abs() < 1e-6);
        }
    }

    #[test]
    fn terminal_moves_are_marked() {
        let mut board = Board::empty(15, 15);
        for col in 4..8 {
            board.put_move(Move::new(7, col, Sign::Cross)).unwrap();
        }
        for col in 4..8 {
            board.put_move(Move::new(0, col, Sign::Circle)).unwrap();
        }
        let mut task = ready_task(board, Sign::Cross);
        uniform_policy(&mut task);
        EdgeGenerator::base(0.0, 500).generate(GameRules::Standard, &mut task);

        let winning = task
            .edges()
            .iter()
            .find(|e| e.mv() == Move::new(7, 8, Sign::Cross))
            .expect("completion move present");
        assert_eq!(winning.score(), Score::win_in(1));
        assert_eq!(winning.value(), Value::WIN);
        // both completion squares win, so each takes about half the mass
        assert!(winning.policy_prior() > 0.4, "winning edge must dominate the prior");
    }

    #[test]
    fn solver_edges_are_used_verbatim() {
        let mut task = ready_task(Board::empty(15, 15), Sign::Cross);
        task.set_score(Score::win_in(3));
        task.set_value(Value::WIN);
        task.mark_ready_solver();
        task.add_prior_edge(Move::new(7, 7, Sign::Cross), Value::WIN, ProvenValue::Win);
        task.add_prior_edge(Move::new(0, 0, Sign::Cross), Value::LOSS, ProvenValue::Loss);

        EdgeGenerator::solver(0.0, 32).generate(GameRules::Standard, &mut task);
        // a proven win keeps only the winning edges
        assert_eq!(task.edges().len(), 1);
        assert_eq!(task.edges()[0].mv(), Move::new(7, 7, Sign::Cross));
    }

    #[test]
    fn noisy_generator_mixes_noise_at_the_root() {
        let config = 15 * 15;
        let mut noise = vec![0.0; config];
        noise[0] = 1.0; // all noise mass on (0, 0)
        let generator = EdgeGenerator::Noisy {
            noise_matrix: noise,
            noise_weight: 0.5,
            base: Box::new(EdgeGenerator::base(0.0, 32)),
        };

        let mut task = ready_task(Board::empty(15, 15), Sign::Cross);
        uniform_policy(&mut task);
        generator.generate(GameRules::Standard, &mut task);
        let corner = task
            .edges()
            .iter()
            .find(|e| e.mv() == Move::new(0, 0, Sign::Cross))
            .expect("corner edge present");
        let other = task.edges().iter().find(|e| e.mv() == Move::new(5, 5, Sign::Cross)).unwrap();
        assert!(corner.policy_prior() > 10.0 * other.policy_prior());
    }

    #[test]
    fn center_only_restricts_the_root() {
        let generator = EdgeGenerator::CenterOnly {
            square_size: 3,
            base: Box::new(EdgeGenerator::base(0.0, 32)),
        };
        let mut task = ready_task(Board::empty(15, 15), Sign::Cross);
        uniform_policy(&mut task);
        generator.generate(GameRules::Standard, &mut task);
        assert_eq!(task.edges().len(), 9);
        for edge in task.edges() {
            assert!((6..=8).contains(&edge.mv().row));
            assert!((6..=8).contains(&edge.mv().col));
        }
    }

    #[test]
    fn symmetry_exclusion_prunes_the_empty_board() {
        let generator =
            EdgeGenerator::SymmetricalExcluding { base: Box::new(EdgeGenerator::base(0.0, 500)) };
        let mut task = ready_task(Board::empty(15, 15), Sign::Cross);
        uniform_policy(&mut task);
        generator.generate(GameRules::Standard, &mut task);
        // the empty 15x15 board has 8 symmetries: only the triangular
        // eighth of the squares survives
        assert!(task.edges().len() < 50, "got {}", task.edges().len());
        assert!(task.edges().iter().any(|e| e.mv() == Move::new(7, 7, Sign::Cross)));
    }
}
