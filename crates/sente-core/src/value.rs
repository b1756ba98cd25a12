//! Win/draw/loss probability triples and the coarse proven-value view.

use std::ops::{Add, Mul, Sub};

/// Coarse solver verdict attached to nodes and edges at the MCTS layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ProvenValue {
    /// Not solved.
    #[default]
    Unknown = 0,
    /// Proven loss for the side to move.
    Loss = 1,
    /// Proven draw.
    Draw = 2,
    /// Proven win for the side to move.
    Win = 3,
}

impl ProvenValue {
    /// Swap win and loss for the opponent's perspective.
    #[inline]
    pub const fn invert(self) -> ProvenValue {
        match self {
            ProvenValue::Win => ProvenValue::Loss,
            ProvenValue::Loss => ProvenValue::Win,
            other => other,
        }
    }
}

/// A `(win, draw, loss)` probability triple summing to one.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Value {
    pub win: f32,
    pub draw: f32,
    pub loss: f32,
}

impl Value {
    /// The all-draw triple.
    pub const DRAW: Value = Value { win: 0.0, draw: 1.0, loss: 0.0 };
    /// The certain-win triple.
    pub const WIN: Value = Value { win: 1.0, draw: 0.0, loss: 0.0 };
    /// The certain-loss triple.
    pub const LOSS: Value = Value { win: 0.0, draw: 0.0, loss: 1.0 };

    #[inline]
    pub const fn new(win: f32, draw: f32, loss: f32) -> Value {
        Value { win, draw, loss }
    }

    /// Build from an expectation in `[0, 1]`, with no draw mass.
    #[inline]
    pub fn from_expectation(expectation: f32) -> Value {
        Value { win: expectation, draw: 0.0, loss: 1.0 - expectation }
    }

    /// The triple corresponding to a proven outcome, if any.
    pub fn from_proven(proven: ProvenValue) -> Option<Value> {
        match proven {
            ProvenValue::Win => Some(Value::WIN),
            ProvenValue::Draw => Some(Value::DRAW),
            ProvenValue::Loss => Some(Value::LOSS),
            ProvenValue::Unknown => None,
        }
    }

    /// Expected outcome: `win + draw / 2`.
    #[inline]
    pub fn expectation(self) -> f32 {
        self.win + 0.5 * self.draw
    }

    /// The opponent's view: win and loss swapped.
    #[inline]
    #[must_use]
    pub fn invert(self) -> Value {
        Value { win: self.loss, draw: self.draw, loss: self.win }
    }

    /// Largest absolute component, used for leak-threshold comparisons.
    #[inline]
    pub fn max_abs(self) -> f32 {
        self.win.abs().max(self.draw.abs()).max(self.loss.abs())
    }
}

impl Add for Value {
    type Output = Value;

    #[inline]
    fn add(self, rhs: Value) -> Value {
        Value {
            win: self.win + rhs.win,
            draw: self.draw + rhs.draw,
            loss: self.loss + rhs.loss,
        }
    }
}

impl Sub for Value {
    type Output = Value;

    #[inline]
    fn sub(self, rhs: Value) -> Value {
        Value {
            win: self.win - rhs.win,
            draw: self.draw - rhs.draw,
            loss: self.loss - rhs.loss,
        }
    }
}

impl Mul<f32> for Value {
    type Output = Value;

    #[inline]
    fn mul(self, rhs: f32) -> Value {
        Value {
            win: self.win * rhs,
            draw: self.draw * rhs,
            loss: self.loss * rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expectation_counts_half_draw() {
        let v = Value::new(0.4, 0.2, 0.4);
        assert!((v.expectation() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn invert_swaps_win_and_loss() {
        let v = Value::new(0.7, 0.1, 0.2);
        let inv = v.invert();
        assert_eq!(inv.win, 0.2);
        assert_eq!(inv.draw, 0.1);
        assert_eq!(inv.loss, 0.7);
        assert_eq!(inv.invert(), v);
    }

    #[test]
    fn proven_value_invert() {
        assert_eq!(ProvenValue::Win.invert(), ProvenValue::Loss);
        assert_eq!(ProvenValue::Loss.invert(), ProvenValue::Win);
        assert_eq!(ProvenValue::Draw.invert(), ProvenValue::Draw);
        assert_eq!(ProvenValue::Unknown.invert(), ProvenValue::Unknown);
    }

    #[test]
    fn proven_triples() {
        assert_eq!(Value::from_proven(ProvenValue::Win), Some(Value::WIN));
        assert_eq!(Value::from_proven(ProvenValue::Unknown), None);
    }
}
