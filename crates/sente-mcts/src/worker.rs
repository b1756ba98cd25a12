//! The worker loop: `select -> (solve + evaluate) -> expand -> backup`,
//! run by a pool of threads sharing one tree.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use sente_core::{GameConfig, Value};
use sente_engine::{SharedHashTable, ThreatSpaceSearch, TssMode};
use tracing::debug;

use crate::generate::EdgeGenerator;
use crate::lock::TwoTierLock;
use crate::select::EdgeSelector;
use crate::task::SearchTask;
use crate::tree::{ExpandOutcome, SelectOutcome, Tree};

/// Fills a task's policy, value, and moves-left estimate.
///
/// Implementations run lock-free on the worker's own task; batching
/// against an external inference engine happens behind this trait.
pub trait Evaluator: Send {
    fn evaluate(&mut self, task: &mut SearchTask);
}

/// Fallback evaluator used when no network is attached: a neutral value
/// with a center-weighted policy, so openings gravitate toward the
/// middle of the board the way a trained policy would.
pub struct UniformEvaluator;

impl Evaluator for UniformEvaluator {
    fn evaluate(&mut self, task: &mut SearchTask) {
        let board = task.board().clone();
        let center_row = board.rows() as f32 / 2.0 - 0.5;
        let center_col = board.cols() as f32 / 2.0 - 0.5;
        let mut sum = 0.0f32;
        for mv in board.empty_squares() {
            let distance = (mv.row as f32 - center_row)
                .abs()
                .max((mv.col as f32 - center_col).abs());
            let weight = 1.0 / (1.0 + distance);
            task.policy_mut()[mv.row as usize * board.cols() + mv.col as usize] = weight;
            sum += weight;
        }
        if sum > 0.0 {
            for prior in task.policy_mut() {
                *prior /= sum;
            }
        }
        let empties = board.empty_squares().count();
        task.set_value(Value::from_expectation(0.5));
        task.set_moves_left(empties as f32 / 2.0);
    }
}

/// Shared stop condition for a running search.
pub struct SearchControl {
    stopped: Arc<AtomicBool>,
    deadline: Option<Instant>,
    max_simulations: Option<u32>,
}

impl SearchControl {
    /// Run until stopped externally.
    pub fn infinite(stopped: Arc<AtomicBool>) -> SearchControl {
        SearchControl { stopped, deadline: None, max_simulations: None }
    }

    /// Run until the wall-clock deadline.
    pub fn until(stopped: Arc<AtomicBool>, deadline: Instant) -> SearchControl {
        SearchControl { stopped, deadline: Some(deadline), max_simulations: None }
    }

    /// Run for a fixed number of simulations.
    pub fn simulations(stopped: Arc<AtomicBool>, max_simulations: u32) -> SearchControl {
        SearchControl { stopped, deadline: None, max_simulations: Some(max_simulations) }
    }

    /// Cap the simulation count on top of other limits.
    pub fn with_max_simulations(mut self, max_simulations: u32) -> SearchControl {
        self.max_simulations = Some(max_simulations);
        self
    }

    /// Request an asynchronous stop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Polled by workers between simulations.
    pub fn is_running(&self, simulations_done: u32) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        if let Some(max) = self.max_simulations
            && simulations_done >= max
        {
            return false;
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return false;
        }
        true
    }
}

/// Per-pool options for the workers.
pub struct WorkerConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Solver effort per leaf.
    pub solver_mode: TssMode,
    /// Position budget per solver call.
    pub solver_budget: u64,
    /// Exploration constant of the in-tree selector.
    pub exploration: f32,
    /// Policy pruning threshold of the edge generator.
    pub policy_threshold: f32,
    /// Edge cap of the edge generator.
    pub max_edges: usize,
}

impl Default for WorkerConfig {
    fn default() -> WorkerConfig {
        WorkerConfig {
            threads: 1,
            solver_mode: TssMode::Recursive,
            solver_budget: 400,
            exploration: 1.25,
            policy_threshold: 1.0e-4,
            max_edges: 64,
        }
    }
}

/// Run simulations until the control stops them.
///
/// Each thread owns its calculator-backed solver, its task, and its
/// evaluator; the tree and the shared hash table are the only contended
/// state. Returns the number of completed simulations.
pub fn run_search<F>(
    tree: &TwoTierLock<Tree>,
    shared_table: &Arc<SharedHashTable>,
    game_config: GameConfig,
    worker_config: &WorkerConfig,
    control: &SearchControl,
    make_evaluator: F,
) -> u64
where
    F: Fn() -> Box<dyn Evaluator> + Sync,
{
    let completed = AtomicU64::new(0);

    std::thread::scope(|scope| {
        for _ in 0..worker_config.threads.max(1) {
            let completed = &completed;
            let make_evaluator = &make_evaluator;
            let shared_table = Arc::clone(shared_table);
            scope.spawn(move || {
                let mut solver = ThreatSpaceSearch::new(game_config, shared_table);
                let mut evaluator = make_evaluator();
                let mut task = SearchTask::new(game_config);
                let mut selector = EdgeSelector::puct(worker_config.exploration);
                let generator = EdgeGenerator::solver(
                    worker_config.policy_threshold,
                    worker_config.max_edges,
                );

                loop {
                    let simulations = {
                        let guard = tree.lock_low();
                        guard.simulation_count()
                    };
                    if !control.is_running(simulations) {
                        break;
                    }

                    run_simulation(
                        tree,
                        &mut solver,
                        evaluator.as_mut(),
                        &generator,
                        &mut selector,
                        &mut task,
                        worker_config,
                        control,
                    );
                    completed.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    let total = completed.load(Ordering::Relaxed);
    debug!(simulations = total, "search workers finished");
    total
}

#[allow(clippy::too_many_arguments)]
fn run_simulation(
    tree: &TwoTierLock<Tree>,
    solver: &mut ThreatSpaceSearch,
    evaluator: &mut dyn Evaluator,
    generator: &EdgeGenerator,
    selector: &mut EdgeSelector,
    task: &mut SearchTask,
    worker_config: &WorkerConfig,
    control: &SearchControl,
) {
    let outcome = {
        let mut guard = tree.lock_low();
        guard.select(selector, task)
    };

    match outcome {
        SelectOutcome::InformationLeak => {
            let mut guard = tree.lock_low();
            guard.correct_information_leak(task);
            guard.cancel_virtual_loss(task);
        }
        SelectOutcome::ReachedProvenEdge => {
            let proven = {
                let guard = tree.lock_low();
                let step = task.last_step().expect("a proven edge was visited");
                guard.node(step.node).edge(step.edge_index).score().proven_value()
            };
            // the edge is seen from the parent; the final position
            // belongs to the opponent
            let value = Value::from_proven(proven.invert()).unwrap_or_default();
            task.set_value(value);
            task.mark_ready_solver();
            let mut guard = tree.lock_low();
            guard.backup(task);
        }
        SelectOutcome::ReachedLeaf => {
            if control.stopped.load(Ordering::Acquire) {
                // cancelled mid-simulation: sweep the virtual losses
                let mut guard = tree.lock_low();
                guard.cancel_virtual_loss(task);
                return;
            }

            solve_leaf(solver, task, worker_config);
            if !task.is_ready() {
                evaluator.evaluate(task);
                task.mark_ready_network();
            }
            generator.generate(solver.calculator_mut().config().rules, task);

            let mut guard = tree.lock_low();
            match guard.expand(task) {
                ExpandOutcome::SkippedExpansion => {
                    if task.is_ready() {
                        guard.backup(task);
                    } else {
                        guard.cancel_virtual_loss(task);
                    }
                }
                ExpandOutcome::Success | ExpandOutcome::AlreadyExpanded => {
                    guard.backup(task);
                }
            }
        }
    }
}

/// Run the tactical solver on the leaf and copy its products into the
/// task.
fn solve_leaf(solver: &mut ThreatSpaceSearch, task: &mut SearchTask, config: &WorkerConfig) {
    let result = match solver.solve(
        task.board(),
        task.sign_to_move(),
        config.solver_mode,
        config.solver_budget,
    ) {
        Ok(result) => result,
        Err(_) => return, // a malformed leaf cannot be solved; leave it to the evaluator
    };

    task.set_must_defend(result.must_defend);
    for action in &result.actions {
        let proven = action.score.proven_value();
        let value = Value::from_proven(proven).unwrap_or_default();
        task.add_prior_edge(action.mv, value, proven);
    }
    if result.score.is_proven() {
        task.set_score(result.score);
        task.set_value(
            Value::from_proven(result.score.proven_value()).unwrap_or_default(),
        );
        task.set_moves_left(result.score.distance() as f32);
        task.mark_ready_solver();
    }
}
