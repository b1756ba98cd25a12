//! MCTS orchestration: selection, expansion, backup, and the root
//! bookkeeping around the node cache.

use sente_core::{Board, GameConfig, Sign};
use tracing::debug;

use crate::cache::{CacheConfig, NodeCache};
use crate::node::{Edge, Node, NodeId, update_edge_score, update_node_score};
use crate::select::EdgeSelector;
use crate::task::SearchTask;

/// Outcome of the select phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The path ended at an unexpanded edge; the task board describes
    /// the leaf to evaluate.
    ReachedLeaf,
    /// The path hit an edge with a proven score; no evaluation needed.
    ReachedProvenEdge,
    /// A stored edge value disagrees materially with its child node; the
    /// path should be corrected instead of simulated.
    InformationLeak,
}

/// Outcome of the expand phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// A new node was inserted.
    Success,
    /// Another simulation created the node first (transposition).
    AlreadyExpanded,
    /// No edges were generated; nothing to insert.
    SkippedExpansion,
}

/// Tuning knobs of the tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeConfig {
    /// Largest tolerated difference between an edge value and its child
    /// node's inverted value; `1.0` disables leak detection.
    pub information_leak_threshold: f32,
    /// Node cache sizing.
    pub cache: CacheConfig,
}

impl Default for TreeConfig {
    fn default() -> TreeConfig {
        TreeConfig { information_leak_threshold: 0.05, cache: CacheConfig::default() }
    }
}

/// The search tree: a node cache plus root management.
///
/// All methods take `&mut self`; concurrent workers serialize through
/// the two-tier lock wrapping the tree.
pub struct Tree {
    config: TreeConfig,
    game_config: GameConfig,
    cache: NodeCache,
    base_board: Board,
    sign_to_move: Sign,
    root: Option<NodeId>,
    move_number: usize,
    evaluation: f32,
    moves_left: f32,
    max_depth: usize,
}

impl Tree {
    pub fn new(game_config: GameConfig, config: TreeConfig) -> Tree {
        Tree {
            config,
            game_config,
            cache: NodeCache::new(game_config, config.cache),
            base_board: Board::empty(game_config.rows, game_config.cols),
            sign_to_move: Sign::Cross,
            root: None,
            move_number: 0,
            evaluation: 0.0,
            moves_left: 0.0,
            max_depth: 0,
        }
    }

    /// Install a new root position, retaining every cached node still
    /// reachable from it.
    pub fn set_board(&mut self, board: &Board, sign_to_move: Sign, force_remove_root: bool) {
        self.cache.cleanup(board, sign_to_move);
        self.base_board = board.clone();
        self.sign_to_move = sign_to_move;
        self.move_number = board.move_count();
        self.evaluation = 0.0;
        self.moves_left = 0.0;
        self.max_depth = 0;

        if force_remove_root && self.cache.seek(board, sign_to_move).is_some() {
            self.cache.remove(board, sign_to_move);
        }
        self.root = self.cache.seek(board, sign_to_move);
        if let Some(root) = self.root {
            self.cache.node_mut(root).mark_as_root();
            debug!(visits = self.cache.node(root).visits(), "root reused from cache");
        }
    }

    /// Drop every cached node.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.root = None;
    }

    #[inline]
    pub fn board(&self) -> &Board {
        &self.base_board
    }

    #[inline]
    pub fn sign_to_move(&self) -> Sign {
        self.sign_to_move
    }

    #[inline]
    pub fn move_number(&self) -> usize {
        self.move_number
    }

    /// Expected outcome at the root after the last backup.
    #[inline]
    pub fn evaluation(&self) -> f32 {
        self.evaluation
    }

    #[inline]
    pub fn moves_left(&self) -> f32 {
        self.moves_left
    }

    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn node_count(&self) -> usize {
        self.cache.stored_nodes()
    }

    pub fn memory(&self) -> usize {
        self.cache.memory()
    }

    /// Visits of the root node.
    pub fn simulation_count(&self) -> u32 {
        self.root.map_or(0, |root| self.cache.node(root).visits())
    }

    pub fn root_node(&self) -> Option<&Node> {
        self.root.map(|root| self.cache.node(root))
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.cache.node(id)
    }

    pub fn is_root_proven(&self) -> bool {
        self.root_node().is_some_and(Node::is_proven)
    }

    pub fn has_all_moves_proven(&self) -> bool {
        self.root_node().is_some_and(|root| root.edges().iter().all(Edge::is_proven))
    }

    pub fn has_single_move(&self) -> bool {
        self.root_node().is_some_and(|root| root.edges().len() == 1)
    }

    pub fn has_single_non_losing_move(&self) -> bool {
        self.root_node().is_some_and(|root| {
            root.edges().iter().filter(|edge| !edge.score().is_loss()).count() == 1
        })
    }

    /// Walk from the root, placing virtual losses along the way, until
    /// an unexpanded edge, a proven edge, or an information leak stops
    /// the descent.
    pub fn select(&mut self, selector: &mut EdgeSelector, task: &mut SearchTask) -> SelectOutcome {
        task.set(&self.base_board, self.sign_to_move);
        let mut current = self.root;

        while let Some(node_id) = current {
            let edge_index = selector.select(node_id, self.cache.node(node_id));
            let mv = self.cache.node(node_id).edge(edge_index).mv();
            task.append(node_id, edge_index, mv);
            {
                let node = self.cache.node_mut(node_id);
                node.increase_virtual_loss();
                node.edge_mut(edge_index).increase_virtual_loss();
            }

            if self.cache.node(node_id).edge(edge_index).is_proven() {
                return SelectOutcome::ReachedProvenEdge;
            }

            let child = self.cache.seek(task.board(), task.sign_to_move());
            task.set_final_node(child);
            match child {
                None => {
                    self.cache.node_mut(node_id).edge_mut(edge_index).mark_as_being_expanded();
                    current = None;
                }
                Some(child_id) => {
                    let edge = self.cache.node(node_id).edge(edge_index);
                    if self.has_information_leak(edge, child_id) {
                        return SelectOutcome::InformationLeak;
                    }
                    current = Some(child_id);
                }
            }
        }

        self.max_depth = self.max_depth.max(task.relative_depth());
        SelectOutcome::ReachedLeaf
    }

    /// Insert the expanded leaf into the cache using the generated edges.
    pub fn expand(&mut self, task: &mut SearchTask) -> ExpandOutcome {
        if task.edges().is_empty() {
            return ExpandOutcome::SkippedExpansion;
        }

        if let Some(existing) = self.cache.seek(task.board(), task.sign_to_move()) {
            // the same state was reached from a different path, or
            // another simulation expanded it first
            task.set_final_node(Some(existing));
            if let Some(step) = task.last_step() {
                let edge = self.cache.node(step.node).edge(step.edge_index);
                if self.has_information_leak(edge, existing) {
                    self.correct_information_leak(task);
                }
            }
            return ExpandOutcome::AlreadyExpanded;
        }

        let edges = task.take_edges();
        let edge_count = edges.len();
        let id = self.cache.insert(task.board(), task.sign_to_move(), edges);
        {
            let board_size = self.game_config.size();
            let node = self.cache.node_mut(id);
            node.update_value(task.value());
            node.update_moves_left(task.moves_left());
            if task.must_defend() || edge_count + node.depth() as usize == board_size {
                node.mark_as_fully_expanded();
            }
            update_node_score(node);
            if task.score().is_proven() {
                node.set_score(task.score());
            }
        }
        task.set_final_node(Some(id));

        if task.relative_depth() == 0 {
            // the tree was empty: the new node becomes the root
            self.root = Some(id);
            self.cache.node_mut(id).mark_as_root();
        }
        ExpandOutcome::Success
    }

    /// Propagate the task's value and proven scores from the leaf to the
    /// root, releasing the virtual losses placed by select.
    pub fn backup(&mut self, task: &SearchTask) {
        debug_assert!(task.is_ready());
        let mut moves_left = task.moves_left();
        let steps = task.visited();

        for i in (0..steps.len()).rev() {
            let step = steps[i];
            let next_node = if i + 1 == steps.len() {
                task.final_node()
            } else {
                Some(steps[i + 1].node)
            };
            let child_score = next_node.map(|id| self.cache.node(id).score());

            let value = if self.cache.node(step.node).sign_to_move() == task.sign_to_move() {
                task.value()
            } else {
                task.value().invert()
            };

            let node = self.cache.node_mut(step.node);
            node.update_value(value);
            node.update_moves_left(moves_left);
            moves_left += 1.0;

            let edge = node.edge_mut(step.edge_index);
            edge.update_value(value);
            if let Some(child_score) = child_score {
                update_edge_score(edge, child_score);
            }
            update_node_score(node);

            node.decrease_virtual_loss();
            let edge = node.edge_mut(step.edge_index);
            edge.decrease_virtual_loss();
            edge.clear_flags();
        }

        if let Some(root) = self.root {
            self.evaluation = self.cache.node(root).expectation();
            self.moves_left = self.cache.node(root).moves_left();
        }
    }

    /// Rewrite a stale path: each edge takes its child's inverted value
    /// and the upstream node absorbs the difference weighted by
    /// `edge_visits / node_visits`.
    pub fn correct_information_leak(&mut self, task: &SearchTask) {
        let steps = task.visited();
        for i in (0..steps.len()).rev() {
            let step = steps[i];
            let next_node = if i + 1 == steps.len() {
                task.final_node()
            } else {
                Some(steps[i + 1].node)
            };
            let Some(next_id) = next_node else {
                continue;
            };
            let child_value = self.cache.node(next_id).value();
            let child_score = self.cache.node(next_id).score();

            let node = self.cache.node_mut(step.node);
            if node.visits() == 0 {
                continue;
            }
            let edge_visits = node.edge(step.edge_index).visits() as f32;
            let scale = edge_visits / node.visits() as f32;

            let current_edge_value = node.edge(step.edge_index).value();
            let target_edge_value = child_value.invert();
            let target_node_value =
                node.value() + (target_edge_value - current_edge_value) * scale;

            node.edge_mut(step.edge_index).set_value(target_edge_value);
            node.set_value(target_node_value);
            update_edge_score(node.edge_mut(step.edge_index), child_score);
            update_node_score(node);
        }
    }

    /// Release the virtual losses of a simulation that will not be
    /// backed up (cancellation, information leaks).
    pub fn cancel_virtual_loss(&mut self, task: &SearchTask) {
        for step in task.visited() {
            let node = self.cache.node_mut(step.node);
            node.decrease_virtual_loss();
            let edge = node.edge_mut(step.edge_index);
            edge.decrease_virtual_loss();
            edge.clear_flags();
        }
    }

    fn has_information_leak(&self, edge: &Edge, child: NodeId) -> bool {
        if self.config.information_leak_threshold >= 1.0 {
            return false;
        }
        let child_node = self.cache.node(child);
        let expected = (-child_node.score()).increase_distance();
        if edge.score() != expected {
            return true;
        }
        let diff = edge.value() - child_node.value().invert();
        diff.max_abs() > self.config.information_leak_threshold
    }

    /// Node reached by playing `moves` from the root, if cached.
    pub fn lookup_line(&self, moves: &[sente_core::Move]) -> Option<&Node> {
        let mut board = self.base_board.clone();
        let mut sign = self.sign_to_move;
        for mv in moves {
            board.put_move(mv.with_sign(sign)).ok()?;
            sign = sign.invert();
        }
        self.cache.seek(&board, sign).map(|id| self.cache.node(id))
    }
}
