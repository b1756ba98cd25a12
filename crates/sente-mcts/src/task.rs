//! The per-simulation work item handed between tree, solver, and
//! evaluator.

use std::fmt;
use std::str::FromStr;

use sente_core::{Board, GameConfig, Move, ParseBoardError, ProvenValue, Score, Sign, Value};

use crate::node::{Edge, NodeId};

/// One step of the selected path: a node and the edge taken from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitedStep {
    pub node: NodeId,
    pub edge_index: usize,
}

/// Mutable description of one simulation: the board reached by the
/// select phase, the solver/evaluator products, and the generated edges.
#[derive(Debug, Clone)]
pub struct SearchTask {
    board: Board,
    sign_to_move: Sign,
    visited: Vec<VisitedStep>,
    final_node: Option<NodeId>,

    /// Candidate edges produced by the solver, if any.
    prior_edges: Vec<Edge>,
    /// Edges generated for expansion.
    edges: Vec<Edge>,
    /// Policy over the board, row-major; filled by the evaluator.
    policy: Vec<f32>,
    /// Per-square action values; filled by the evaluator when available.
    action_values: Vec<Value>,

    value: Value,
    moves_left: f32,
    score: Score,
    must_defend: bool,
    ready_solver: bool,
    ready_network: bool,
}

impl SearchTask {
    pub fn new(config: GameConfig) -> SearchTask {
        SearchTask {
            board: Board::empty(config.rows, config.cols),
            sign_to_move: Sign::Cross,
            visited: Vec::with_capacity(64),
            final_node: None,
            prior_edges: Vec::new(),
            edges: Vec::new(),
            policy: vec![0.0; config.size()],
            action_values: Vec::new(),
            value: Value::default(),
            moves_left: 0.0,
            score: Score::none(),
            must_defend: false,
            ready_solver: false,
            ready_network: false,
        }
    }

    /// Reset to the root position of a new simulation.
    pub fn set(&mut self, board: &Board, sign_to_move: Sign) {
        self.board = board.clone();
        self.sign_to_move = sign_to_move;
        self.visited.clear();
        self.final_node = None;
        self.prior_edges.clear();
        self.edges.clear();
        self.policy.fill(0.0);
        self.action_values.clear();
        self.value = Value::default();
        self.moves_left = 0.0;
        self.score = Score::none();
        self.must_defend = false;
        self.ready_solver = false;
        self.ready_network = false;
    }

    /// Record a step of the select phase and apply its move.
    pub fn append(&mut self, node: NodeId, edge_index: usize, mv: Move) {
        self.visited.push(VisitedStep { node, edge_index });
        self.board.put_move(mv).expect("select phase picked an illegal move");
        self.sign_to_move = self.sign_to_move.invert();
    }

    #[inline]
    pub fn board(&self) -> &Board {
        &self.board
    }

    #[inline]
    pub fn sign_to_move(&self) -> Sign {
        self.sign_to_move
    }

    #[inline]
    pub fn visited(&self) -> &[VisitedStep] {
        &self.visited
    }

    /// Depth of the leaf relative to the root of this simulation.
    #[inline]
    pub fn relative_depth(&self) -> usize {
        self.visited.len()
    }

    /// Depth of the leaf in game plies.
    pub fn absolute_depth(&self) -> usize {
        self.board.move_count()
    }

    #[inline]
    pub fn final_node(&self) -> Option<NodeId> {
        self.final_node
    }

    pub fn set_final_node(&mut self, node: Option<NodeId>) {
        self.final_node = node;
    }

    pub fn last_step(&self) -> Option<VisitedStep> {
        self.visited.last().copied()
    }

    #[inline]
    pub fn prior_edges(&self) -> &[Edge] {
        &self.prior_edges
    }

    pub fn add_prior_edge(&mut self, mv: Move, value: Value, proven: ProvenValue) {
        let mut edge = Edge::new(mv, 0.0);
        edge.set_value(value);
        if let Some(score) = proven_to_score(proven) {
            edge.set_score(score);
        }
        self.prior_edges.push(edge);
    }

    #[inline]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> &mut Vec<Edge> {
        &mut self.edges
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn take_edges(&mut self) -> Vec<Edge> {
        std::mem::take(&mut self.edges)
    }

    #[inline]
    pub fn policy(&self) -> &[f32] {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut [f32] {
        &mut self.policy
    }

    #[inline]
    pub fn policy_at(&self, mv: Move) -> f32 {
        self.policy[mv.row as usize * self.board.cols() + mv.col as usize]
    }

    pub fn action_values(&self) -> &[Value] {
        &self.action_values
    }

    pub fn set_action_values(&mut self, values: Vec<Value>) {
        self.action_values = values;
    }

    pub fn action_value_at(&self, mv: Move) -> Option<Value> {
        self.action_values
            .get(mv.row as usize * self.board.cols() + mv.col as usize)
            .copied()
    }

    #[inline]
    pub fn value(&self) -> Value {
        self.value
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    #[inline]
    pub fn moves_left(&self) -> f32 {
        self.moves_left
    }

    pub fn set_moves_left(&mut self, moves_left: f32) {
        self.moves_left = moves_left;
    }

    #[inline]
    pub fn score(&self) -> Score {
        self.score
    }

    pub fn set_score(&mut self, score: Score) {
        self.score = score;
    }

    #[inline]
    pub fn must_defend(&self) -> bool {
        self.must_defend
    }

    pub fn set_must_defend(&mut self, must_defend: bool) {
        self.must_defend = must_defend;
    }

    /// Whether the solver produced a final value.
    #[inline]
    pub fn is_ready_solver(&self) -> bool {
        self.ready_solver
    }

    pub fn mark_ready_solver(&mut self) {
        self.ready_solver = true;
    }

    /// Whether the network produced policy and value.
    #[inline]
    pub fn is_ready_network(&self) -> bool {
        self.ready_network
    }

    pub fn mark_ready_network(&mut self) {
        self.ready_network = true;
    }

    /// Whether the task carries a value fit for backup.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready_solver || self.ready_network
    }
}

fn proven_to_score(proven: ProvenValue) -> Option<Score> {
    match proven {
        ProvenValue::Win => Some(Score::win_in(1)),
        ProvenValue::Loss => Some(Score::loss_in(1)),
        ProvenValue::Draw => Some(Score::draw()),
        ProvenValue::Unknown => None,
    }
}

/// Position text: the board followed by a line naming the side to move.
impl fmt::Display for SearchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.board)?;
        write!(f, "to move: {}", self.sign_to_move)
    }
}

impl FromStr for SearchTask {
    type Err = ParseBoardError;

    fn from_str(s: &str) -> Result<SearchTask, ParseBoardError> {
        let (board_text, tail) = match s.rfind("to move:") {
            Some(pos) => (&s[..pos], &s[pos..]),
            None => (s, ""),
        };
        let board: Board = board_text.parse()?;
        let sign_to_move = tail
            .trim_start_matches("to move:")
            .trim()
            .chars()
            .next()
            .and_then(Sign::from_char)
            .unwrap_or_else(|| board.inferred_sign_to_move());

        let config = GameConfig::with_size(
            sente_core::GameRules::Freestyle,
            board.rows(),
            board.cols(),
        );
        let mut task = SearchTask::new(config);
        task.set(&board, sign_to_move);
        Ok(task)
    }
}
