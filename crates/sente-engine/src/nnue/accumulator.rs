//! Incremental NNUE inference: a per-depth accumulator stack updated
//! from the calculator's change sets.

use std::sync::Arc;

use sente_core::{GameConfig, Sign};

use crate::nnue::features::{
    SIDE_TO_MOVE_FEATURE, active_features, feature_count, stone_feature, threat_feature,
};
use crate::nnue::network::{NnueWeights, QUANT_SCALE};
use crate::patterns::calculator::PatternCalculator;
use crate::patterns::threat_table::ThreatType;

/// Incrementally updated evaluator state for one search thread.
///
/// One accumulator per search depth lives on an internal stack, so
/// undoing a move is free: the accumulator written on the way down is
/// still valid when the search returns to that depth.
pub struct InferenceNnue {
    weights: Arc<NnueWeights>,
    config: GameConfig,
    /// `depth_capacity * neurons` accumulator values.
    stack: Vec<i32>,
    current_depth: usize,
    /// Scratch buffers for the dense layers.
    hidden: Vec<f32>,
    output: Vec<f32>,
}

impl InferenceNnue {
    /// Create inference state for the given board size.
    ///
    /// The weight file must match `feature_count(rows * cols)` inputs.
    pub fn new(config: GameConfig, weights: Arc<NnueWeights>) -> InferenceNnue {
        assert_eq!(weights.layer_1.inputs, feature_count(config.size()));
        let neurons = weights.layer_1.neurons;
        let hidden = vec![0.0; weights.layer_2.neurons];
        InferenceNnue {
            config,
            stack: vec![0; (config.size() + 1) * neurons],
            current_depth: 0,
            hidden,
            output: vec![0.0; 1],
            weights,
        }
    }

    /// Rebuild the accumulator for the calculator's position from all
    /// active features.
    pub fn refresh(&mut self, calc: &PatternCalculator) {
        self.current_depth = calc.current_depth();
        let neurons = self.weights.layer_1.neurons;
        let base = self.current_depth * neurons;
        self.stack[base..base + neurons]
            .iter_mut()
            .zip(&self.weights.layer_1.bias)
            .for_each(|(acc, &b)| *acc = b);

        for feature in active_features(calc) {
            let row = self.weights.layer_1.row(feature);
            for (acc, &w) in self.stack[base..base + neurons].iter_mut().zip(row) {
                *acc += w as i32;
            }
        }
    }

    /// Synchronize after a single move was added or removed on the
    /// calculator, using its change set.
    ///
    /// Undo needs no arithmetic: the accumulator of the shallower depth
    /// is still current. Must be called after every edit so the depth
    /// cursor stays in step.
    pub fn update(&mut self, calc: &PatternCalculator) {
        let depth = calc.current_depth();
        if depth <= self.current_depth || depth == 0 {
            self.current_depth = depth;
            return;
        }
        let neurons = self.weights.layer_1.neurons;
        let old_base = self.current_depth * neurons;
        let new_base = depth * neurons;
        self.current_depth = depth;

        let (removed, added) = self.collect_changes(calc);

        let (old, new) = if old_base < new_base {
            let (head, tail) = self.stack.split_at_mut(new_base);
            (&head[old_base..old_base + neurons], &mut tail[..neurons])
        } else {
            unreachable!("deeper accumulator must live above the current one")
        };
        new.copy_from_slice(old);
        for feature in added {
            let row = self.weights.layer_1.row(feature);
            for (acc, &w) in new.iter_mut().zip(row) {
                *acc += w as i32;
            }
        }
        for feature in removed {
            let row = self.weights.layer_1.row(feature);
            for (acc, &w) in new.iter_mut().zip(row) {
                *acc -= w as i32;
            }
        }
    }

    /// Pure forward pass through the dense layers.
    ///
    /// Returns the expected outcome for the side to move in `[0, 1]`.
    pub fn forward(&mut self) -> f32 {
        let neurons = self.weights.layer_1.neurons;
        let base = self.current_depth * neurons;

        // clipped ReLU on the quantized accumulator
        let activated: Vec<f32> = self.stack[base..base + neurons]
            .iter()
            .map(|&acc| (acc.max(0) as f32) / QUANT_SCALE as f32)
            .collect();

        self.weights.layer_2.forward(&activated, &mut self.hidden);
        for value in &mut self.hidden {
            *value = value.max(0.0);
        }
        self.weights.layer_3.forward(&self.hidden, &mut self.output);
        sigmoid(self.output[0])
    }

    fn collect_changes(&self, calc: &PatternCalculator) -> (Vec<usize>, Vec<usize>) {
        let mut removed = Vec::with_capacity(16);
        let mut added = Vec::with_capacity(16);

        // the side to move flipped with the edit
        if calc.sign_to_move() == Sign::Cross {
            added.push(SIDE_TO_MOVE_FEATURE);
        } else {
            removed.push(SIDE_TO_MOVE_FEATURE);
        }

        for change in calc.threat_changes() {
            let cell = change.location.row as usize * self.config.cols
                + change.location.col as usize;
            for sign in Sign::BOTH {
                let previous = change.previous.for_sign(sign);
                let current = change.current.for_sign(sign);
                if previous != current {
                    if previous != ThreatType::None {
                        removed.push(threat_feature(cell, sign, previous));
                    }
                    if current != ThreatType::None {
                        added.push(threat_feature(cell, sign, current));
                    }
                }
            }
        }

        if let Some(change) = calc.move_change() {
            let cell =
                change.location.row as usize * self.config.cols + change.location.col as usize;
            if change.previous == Sign::None && change.current != Sign::None {
                added.push(stone_feature(cell, change.current));
            }
            if change.previous != Sign::None && change.current == Sign::None {
                removed.push(stone_feature(cell, change.previous));
            }
        }
        (removed, added)
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sente_core::{Board, GameRules, Move};

    fn test_weights(config: GameConfig) -> Arc<NnueWeights> {
        let inputs = feature_count(config.size());
        let mut weights = NnueWeights::zeroed(inputs, 8, 4);
        // deterministic pseudo-random fill so features actually matter
        let mut state = 0x1234_5678u32;
        for w in &mut weights.layer_1.weights {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            *w = ((state >> 16) as i16) % 32;
        }
        for (i, b) in weights.layer_1.bias.iter_mut().enumerate() {
            *b = i as i32 * 3 - 8;
        }
        for (i, w) in weights.layer_2.weights.iter_mut().enumerate() {
            *w = ((i % 7) as f32 - 3.0) * 0.125;
        }
        for (i, w) in weights.layer_3.weights.iter_mut().enumerate() {
            *w = (i as f32 - 1.5) * 0.25;
        }
        Arc::new(weights)
    }

    #[test]
    fn update_matches_refresh() {
        let config = GameConfig::new(GameRules::Standard);
        let weights = test_weights(config);
        let mut calc = PatternCalculator::new(config);
        calc.set_board(&Board::empty(15, 15), Sign::Cross).unwrap();

        let mut incremental = InferenceNnue::new(config, Arc::clone(&weights));
        incremental.refresh(&calc);

        let moves = [
            Move::new(7, 7, Sign::Cross),
            Move::new(7, 8, Sign::Circle),
            Move::new(8, 7, Sign::Cross),
            Move::new(6, 6, Sign::Circle),
        ];
        for mv in moves {
            calc.add_move(mv);
            incremental.update(&calc);
        }

        let mut fresh = InferenceNnue::new(config, weights);
        fresh.refresh(&calc);
        assert_eq!(incremental.forward(), fresh.forward());
    }

    #[test]
    fn add_then_undo_restores_the_output() {
        let config = GameConfig::new(GameRules::Standard);
        let weights = test_weights(config);
        let mut calc = PatternCalculator::new(config);
        calc.set_board(&Board::empty(15, 15), Sign::Cross).unwrap();

        let mut nnue = InferenceNnue::new(config, weights);
        nnue.refresh(&calc);
        let before = nnue.forward();

        let mv = Move::new(7, 7, Sign::Cross);
        calc.add_move(mv);
        nnue.update(&calc);
        let during = nnue.forward();

        calc.undo_move(mv);
        nnue.update(&calc);
        let after = nnue.forward();

        assert_eq!(before, after);
        assert_ne!(before, during);
    }

    #[test]
    fn forward_is_a_probability() {
        let config = GameConfig::new(GameRules::Standard);
        let weights = test_weights(config);
        let mut calc = PatternCalculator::new(config);
        calc.set_board(&Board::empty(15, 15), Sign::Cross).unwrap();

        let mut nnue = InferenceNnue::new(config, weights);
        nnue.refresh(&calc);
        let value = nnue.forward();
        assert!((0.0..=1.0).contains(&value));
    }
}
