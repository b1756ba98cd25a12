//! Edge selectors: the exploration policies steering the select phase,
//! plus the tie-breaking policies for final move choice.

use ordered_float::OrderedFloat;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Gumbel};

use crate::node::{Edge, Node, NodeId};

/// Q value folding the draw rate in with a style factor:
/// `win + style * draw`.
#[inline]
fn q_value(value: sente_core::Value, style_factor: f32) -> f32 {
    value.win + style_factor * value.draw
}

/// Scaling factor discouraging paths other threads are already walking:
/// `visits / (visits + virtual_loss)`.
#[inline]
fn virtual_loss_factor(edge: &Edge) -> f32 {
    let visits = 1.0e-8 + edge.visits() as f32;
    visits / (visits + edge.virtual_loss() as f32)
}

/// `+1` for proven wins, `-1` for proven losses, `0` otherwise.
#[inline]
fn proven_q(edge: &Edge) -> f32 {
    f32::from(edge.score().is_win()) - f32::from(edge.score().is_loss())
}

/// Fallback when every comparison fails: the first edge that is not a
/// proven loss, or the first edge outright.
fn first_acceptable(node: &Node) -> usize {
    node.edges()
        .iter()
        .position(|edge| !edge.score().is_loss())
        .unwrap_or(0)
}

/// Argmax over unproven edges; falls back to [`first_acceptable`].
fn argmax_unproven(node: &Node, mut key: impl FnMut(&Edge) -> f32) -> usize {
    let mut best = None;
    let mut best_value = f32::MIN;
    for (index, edge) in node.edges().iter().enumerate() {
        if edge.is_proven() {
            continue;
        }
        let value = key(edge);
        if best.is_none() || value > best_value {
            best = Some(index);
            best_value = value;
        }
    }
    best.unwrap_or_else(|| first_acceptable(node))
}

/// Per-root state of the sequential-halving schedule.
#[derive(Debug, Default)]
pub struct HalvingState {
    root: Option<NodeId>,
    /// Edge indices with their Gumbel noise and log-prior, kept sorted
    /// between levels.
    entries: Vec<(usize, f32, f32)>,
    expected_visits: u32,
    simulations_left: u32,
    actions_left: usize,
}

/// Pluggable edge selection strategies.
///
/// Stateful variants (noise, halving schedules) carry their state in the
/// variant, so a selector instance belongs to one search.
pub enum EdgeSelector {
    /// `argmax Q + c * P * sqrt(N) / (1 + n)`, Q defaulting to the
    /// parent's Q at zero visits.
    Puct { exploration: f32, style_factor: f32 },
    /// Like PUCT but Q always comes from the edge's own statistics.
    QHead { exploration: f32, style_factor: f32 },
    /// `argmax Q + c * sqrt(log N / (1 + n)) + P / (1 + n)`.
    Uct { exploration: f32, style_factor: f32 },
    /// Gumbel-perturbed priors at the root, PUCT elsewhere.
    NoisyPuct {
        exploration: f32,
        style_factor: f32,
        rng: SmallRng,
        root: Option<NodeId>,
        noisy_policy: Vec<f32>,
    },
    /// Sequential halving at the root, UCT below.
    SequentialHalving {
        max_edges: usize,
        max_simulations: u32,
        c_visit: f32,
        c_scale: f32,
        rng: SmallRng,
        state: HalvingState,
    },
    /// Below `balance_depth` plies, pick the most balanced edge to
    /// generate even training positions; delegate above.
    Balanced { balance_depth: u16, base: Box<EdgeSelector> },
    /// Final-move policy: highest Q, proven results dominating.
    MaxValue { style_factor: f32 },
    /// Final-move policy: most-visited edge.
    MaxVisit,
    /// Final-move policy: blend of visits, Q, and prior.
    BestEdge { style_factor: f32 },
}

impl EdgeSelector {
    pub fn puct(exploration: f32) -> EdgeSelector {
        EdgeSelector::Puct { exploration, style_factor: 0.5 }
    }

    pub fn uct(exploration: f32) -> EdgeSelector {
        EdgeSelector::Uct { exploration, style_factor: 0.5 }
    }

    pub fn noisy_puct(exploration: f32) -> EdgeSelector {
        EdgeSelector::NoisyPuct {
            exploration,
            style_factor: 0.5,
            rng: SmallRng::from_entropy(),
            root: None,
            noisy_policy: Vec::new(),
        }
    }

    pub fn sequential_halving(max_edges: usize, max_simulations: u32) -> EdgeSelector {
        debug_assert!(max_edges.is_power_of_two());
        debug_assert!(max_simulations >= 2 * max_edges as u32 - 1);
        EdgeSelector::SequentialHalving {
            max_edges,
            max_simulations,
            c_visit: 50.0,
            c_scale: 1.0,
            rng: SmallRng::from_entropy(),
            state: HalvingState::default(),
        }
    }

    pub fn balanced(balance_depth: u16, base: EdgeSelector) -> EdgeSelector {
        EdgeSelector::Balanced { balance_depth, base: Box::new(base) }
    }

    /// Choose an edge of `node`, identified by `id` for per-root state.
    ///
    /// Never returns a proven loss while an alternative exists.
    pub fn select(&mut self, id: NodeId, node: &Node) -> usize {
        debug_assert!(!node.is_leaf());
        match self {
            EdgeSelector::Puct { exploration, style_factor } => {
                let parent_q = q_value(node.value(), *style_factor);
                let sqrt_visits = *exploration * (node.visits() as f32).sqrt();
                let style = *style_factor;
                argmax_unproven(node, |edge| {
                    let q = if edge.visits() > 0 {
                        q_value(edge.value(), style) * virtual_loss_factor(edge)
                    } else {
                        parent_q
                    };
                    q + edge.policy_prior() * sqrt_visits / (1.0 + edge.visits() as f32)
                })
            }
            EdgeSelector::QHead { exploration, style_factor } => {
                let sqrt_visits = *exploration * (node.visits() as f32).sqrt();
                let style = *style_factor;
                argmax_unproven(node, |edge| {
                    q_value(edge.value(), style) * virtual_loss_factor(edge)
                        + edge.policy_prior() * sqrt_visits / (1.0 + edge.visits() as f32)
                })
            }
            EdgeSelector::Uct { exploration, style_factor } => {
                let log_visits = (node.visits().max(1) as f32).ln();
                let c = *exploration;
                let style = *style_factor;
                argmax_unproven(node, |edge| {
                    let q = q_value(edge.value(), style) * virtual_loss_factor(edge);
                    let u = c * (log_visits / (1.0 + edge.visits() as f32)).sqrt();
                    let p = edge.policy_prior() / (1.0 + edge.visits() as f32);
                    q + u + p
                })
            }
            EdgeSelector::NoisyPuct { exploration, style_factor, rng, root, noisy_policy } => {
                if !node.is_root() {
                    let mut plain =
                        EdgeSelector::Puct { exploration: *exploration, style_factor: *style_factor };
                    return plain.select(id, node);
                }
                if *root != Some(id) || noisy_policy.len() != node.edges().len() {
                    *root = Some(id);
                    let gumbel = Gumbel::new(0.0f32, 1.0f32).expect("valid gumbel parameters");
                    *noisy_policy = node
                        .edges()
                        .iter()
                        .map(|edge| safe_log(edge.policy_prior()) + gumbel.sample(rng))
                        .collect();
                    softmax(noisy_policy);
                }
                let sqrt_visits = *exploration * (node.visits() as f32).sqrt();
                let style = *style_factor;
                let noisy = &*noisy_policy;
                let mut best = None;
                let mut best_value = f32::MIN;
                for (index, edge) in node.edges().iter().enumerate() {
                    if edge.is_proven() {
                        continue;
                    }
                    let q = q_value(edge.value(), style) * virtual_loss_factor(edge);
                    let u = noisy[index] * sqrt_visits / (1.0 + edge.visits() as f32);
                    if best.is_none() || q + u > best_value {
                        best = Some(index);
                        best_value = q + u;
                    }
                }
                best.unwrap_or_else(|| first_acceptable(node))
            }
            EdgeSelector::SequentialHalving {
                max_edges,
                max_simulations,
                c_visit,
                c_scale,
                rng,
                state,
            } => {
                if !node.is_root() {
                    return EdgeSelector::uct(1.0).select(id, node);
                }
                if state.root != Some(id) {
                    reset_halving(state, id, node, *max_simulations, rng);
                }
                select_halving(state, node, *max_edges, *c_visit, *c_scale)
            }
            EdgeSelector::Balanced { balance_depth, base } => {
                if node.depth() < *balance_depth {
                    argmax_unproven(node, |edge| {
                        let balance = 1.0 - (edge.value().win - edge.value().loss).abs();
                        balance * virtual_loss_factor(edge)
                    })
                } else {
                    base.select(id, node)
                }
            }
            EdgeSelector::MaxValue { style_factor } => {
                let style = *style_factor;
                best_index(node, |edge| q_value(edge.value(), style) + 1.0e6 * proven_q(edge))
            }
            EdgeSelector::MaxVisit => best_index(node, |edge| edge.visits() as f32),
            EdgeSelector::BestEdge { style_factor } => {
                let style = *style_factor;
                let node_visits = node.visits() as f32;
                best_index(node, |edge| {
                    edge.visits() as f32
                        + q_value(edge.value(), style) * node_visits
                        + 0.001 * edge.policy_prior()
                        + 1.0e9 * proven_q(edge)
                })
            }
        }
    }
}

/// Plain argmax over all edges (final-move policies consider proven
/// edges too).
fn best_index(node: &Node, mut key: impl FnMut(&Edge) -> f32) -> usize {
    node.edges()
        .iter()
        .enumerate()
        .max_by_key(|(_, edge)| OrderedFloat(key(edge)))
        .map(|(index, _)| index)
        .unwrap_or(0)
}

fn safe_log(x: f32) -> f32 {
    (x.max(1.0e-12)).ln()
}

fn softmax(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::MIN, f32::max);
    let mut sum = 0.0;
    for value in values.iter_mut() {
        *value = (*value - max).exp();
        sum += *value;
    }
    if sum > 0.0 {
        for value in values.iter_mut() {
            *value /= sum;
        }
    }
}

fn reset_halving(
    state: &mut HalvingState,
    id: NodeId,
    node: &Node,
    max_simulations: u32,
    rng: &mut SmallRng,
) {
    state.root = Some(id);
    state.expected_visits = 0;
    // one simulation went into expanding the root itself
    state.simulations_left = max_simulations.saturating_sub(1);
    state.actions_left = node.edges().len();
    let gumbel = Gumbel::new(0.0f32, 1.0f32).expect("valid gumbel parameters");
    state.entries = node
        .edges()
        .iter()
        .enumerate()
        .map(|(index, edge)| (index, gumbel.sample(rng), safe_log(edge.policy_prior())))
        .collect();
}

fn select_halving(
    state: &mut HalvingState,
    node: &Node,
    max_edges: usize,
    c_visit: f32,
    c_scale: f32,
) -> usize {
    let level_complete = state.entries[..state.actions_left].iter().all(|&(index, _, _)| {
        let edge = node.edge(index);
        edge.visits() >= state.expected_visits || edge.is_proven()
    });

    if level_complete {
        if state.actions_left > 1 {
            let unproven = state.entries.iter().filter(|&&(i, _, _)| !node.edge(i).is_proven()).count();
            state.actions_left =
                halve(state.actions_left, max_edges, unproven.max(1));
            sort_halving_entries(state, node, c_visit, c_scale);

            if state.actions_left > 1 {
                // the final level is reached with two actions left
                let levels_left = (state.actions_left as f32).log2() as u32;
                let for_this_level = state.simulations_left / levels_left.max(1);
                state.expected_visits += (for_this_level / state.actions_left as u32).max(1);
            }
        }
        if state.actions_left <= 1 {
            return state.entries[0].0;
        }
    }

    let choice = state.entries[..state.actions_left]
        .iter()
        .min_by_key(|&&(index, _, _)| {
            let edge = node.edge(index);
            edge.visits() + edge.virtual_loss() + 1_000_000 * u32::from(edge.is_proven())
        })
        .map(|&(index, _, _)| index)
        .unwrap_or(0);
    state.simulations_left = state.simulations_left.saturating_sub(1);
    choice
}

fn halve(actions_left: usize, max_edges: usize, unproven: usize) -> usize {
    let halved = actions_left - actions_left / 2;
    halved.min(max_edges).min(unproven)
}

fn sort_halving_entries(state: &mut HalvingState, node: &Node, c_visit: f32, c_scale: f32) {
    let max_visits =
        node.edges().iter().map(Edge::visits).max().unwrap_or(0) as f32;
    let scale = (c_visit + max_visits) * c_scale;
    state.entries.sort_by_key(|&(index, noise, logit)| {
        let edge = node.edge(index);
        let q = if edge.visits() > 0 { edge.value().expectation() } else { 0.0 };
        let value = noise + logit + scale * q - 1.0e6 * f32::from(edge.is_proven());
        std::cmp::Reverse(OrderedFloat(value))
    });
}
