//! Bounded evaluation scores with proven win/draw/loss bands.

use std::fmt;
use std::ops::Neg;

use crate::value::ProvenValue;

/// Largest magnitude of an unproven evaluation.
pub const MAX_EVAL: i32 = 4000;

/// Base of the proven bands; `WIN_IN(n)` is stored as `PROVEN_BASE - n`.
const PROVEN_BASE: i32 = 16000;

/// Threshold separating proven scores from evaluations and the draw mark.
const PROVEN_THRESHOLD: i32 = 8000;

/// Internal representation of a proven draw.
const DRAW_MARK: i32 = 5000;

/// A search score: either a bounded evaluation or a proven outcome with a
/// plies-to-outcome distance.
///
/// Ordering follows the outcome hierarchy: every loss sorts below every
/// evaluation, a draw sorts between negative and positive evaluations, and
/// every win sorts above. Within the proven bands, a shorter win (and a
/// longer loss) is better.
///
/// The 16-bit internal encoding is also the transposition-table wire
/// format: evaluations occupy `[-4000, 4000]`, a draw is a reserved mark,
/// and proven scores live beyond `+-8000`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Score(i16);

impl Default for Score {
    #[inline]
    fn default() -> Self {
        Score::none()
    }
}

impl Score {
    /// The minimum possible score: an immediate loss.
    pub const MIN: Score = Score(-PROVEN_BASE as i16);
    /// The maximum possible score: an immediate win.
    pub const MAX: Score = Score(PROVEN_BASE as i16);

    /// An unproven evaluation, saturated to `[-MAX_EVAL, MAX_EVAL]`.
    #[inline]
    pub fn eval(value: i32) -> Score {
        Score(value.clamp(-MAX_EVAL, MAX_EVAL) as i16)
    }

    /// A proven win in `plies` plies.
    #[inline]
    pub fn win_in(plies: u32) -> Score {
        Score((PROVEN_BASE - plies.min(1024) as i32) as i16)
    }

    /// A proven loss in `plies` plies.
    #[inline]
    pub fn loss_in(plies: u32) -> Score {
        Score((-PROVEN_BASE + plies.min(1024) as i32) as i16)
    }

    /// A proven draw.
    #[inline]
    pub const fn draw() -> Score {
        Score(DRAW_MARK as i16)
    }

    /// An unproven zero evaluation, the "no information" score.
    #[inline]
    pub const fn none() -> Score {
        Score(0)
    }

    #[inline]
    pub fn is_win(self) -> bool {
        self.0 as i32 >= PROVEN_THRESHOLD
    }

    #[inline]
    pub fn is_loss(self) -> bool {
        (self.0 as i32) <= -PROVEN_THRESHOLD
    }

    #[inline]
    pub fn is_draw(self) -> bool {
        self.0 as i32 == DRAW_MARK
    }

    #[inline]
    pub fn is_proven(self) -> bool {
        self.is_win() || self.is_loss() || self.is_draw()
    }

    #[inline]
    pub fn is_unproven(self) -> bool {
        !self.is_proven()
    }

    /// Plies to the outcome, for proven win/loss scores.
    #[inline]
    pub fn distance(self) -> u32 {
        if self.is_win() {
            (PROVEN_BASE - self.0 as i32) as u32
        } else if self.is_loss() {
            (self.0 as i32 + PROVEN_BASE) as u32
        } else {
            0
        }
    }

    /// The unproven evaluation, zero for proven scores.
    #[inline]
    pub fn valuation(self) -> i32 {
        if self.is_proven() { 0 } else { self.0 as i32 }
    }

    /// Move a proven score one ply farther from its outcome.
    ///
    /// Applied once per move boundary during score propagation so that
    /// distances count plies from the current node.
    #[inline]
    #[must_use]
    pub fn increase_distance(self) -> Score {
        if self.is_win() {
            Score(self.0 - 1)
        } else if self.is_loss() {
            Score(self.0 + 1)
        } else {
            self
        }
    }

    /// Coarse view of this score for the MCTS layer.
    pub fn proven_value(self) -> ProvenValue {
        if self.is_win() {
            ProvenValue::Win
        } else if self.is_loss() {
            ProvenValue::Loss
        } else if self.is_draw() {
            ProvenValue::Draw
        } else {
            ProvenValue::Unknown
        }
    }

    /// The 16-bit wire encoding (identical to the internal representation).
    #[inline]
    pub const fn to_i16(self) -> i16 {
        self.0
    }

    /// Decode the 16-bit wire encoding.
    #[inline]
    pub const fn from_i16(raw: i16) -> Score {
        Score(raw)
    }

    /// Total-order key implementing the outcome hierarchy.
    #[inline]
    fn key(self) -> i32 {
        let raw = self.0 as i32;
        if self.is_win() {
            raw + MAX_EVAL
        } else if self.is_loss() {
            raw - MAX_EVAL
        } else if self.is_draw() {
            0
        } else {
            raw
        }
    }
}

impl Neg for Score {
    type Output = Score;

    /// Negate across a move boundary: wins become losses at the same
    /// distance, draws stay draws, evaluations flip sign.
    #[inline]
    fn neg(self) -> Score {
        if self.is_draw() { self } else { Score(-self.0) }
    }
}

impl PartialOrd for Score {
    #[inline]
    fn partial_cmp(&self, other: &Score) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    #[inline]
    fn cmp(&self, other: &Score) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_win() {
            write!(f, "WIN in {}", self.distance())
        } else if self.is_loss() {
            write!(f, "LOSS in {}", self.distance())
        } else if self.is_draw() {
            write!(f, "DRAW")
        } else {
            write!(f, "{:+}", self.0)
        }
    }
}

impl fmt::Debug for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Score({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_hierarchy() {
        assert!(Score::loss_in(2) < Score::eval(-4000));
        assert!(Score::eval(-1) < Score::draw());
        assert!(Score::draw() < Score::eval(1));
        assert!(Score::eval(4000) < Score::win_in(30));
        assert!(Score::win_in(3) > Score::win_in(5));
        assert!(Score::loss_in(5) > Score::loss_in(3));
    }

    #[test]
    fn negation() {
        assert_eq!(-Score::win_in(3), Score::loss_in(3));
        assert_eq!(-Score::loss_in(7), Score::win_in(7));
        assert_eq!(-Score::draw(), Score::draw());
        assert_eq!(-Score::eval(120), Score::eval(-120));
    }

    #[test]
    fn distance_increase() {
        assert_eq!(Score::win_in(1).increase_distance(), Score::win_in(2));
        assert_eq!(Score::loss_in(4).increase_distance(), Score::loss_in(5));
        assert_eq!(Score::draw().increase_distance(), Score::draw());
        assert_eq!(Score::eval(10).increase_distance(), Score::eval(10));
    }

    #[test]
    fn eval_saturates() {
        assert_eq!(Score::eval(100_000), Score::eval(MAX_EVAL));
        assert_eq!(Score::eval(-100_000), Score::eval(-MAX_EVAL));
        assert!(Score::eval(100_000).is_unproven());
    }

    #[test]
    fn wire_roundtrip() {
        for score in [
            Score::win_in(5),
            Score::loss_in(0),
            Score::draw(),
            Score::eval(-321),
            Score::none(),
        ] {
            assert_eq!(Score::from_i16(score.to_i16()), score);
        }
    }

    #[test]
    fn proven_value_projection() {
        assert_eq!(Score::win_in(3).proven_value(), ProvenValue::Win);
        assert_eq!(Score::loss_in(2).proven_value(), ProvenValue::Loss);
        assert_eq!(Score::draw().proven_value(), ProvenValue::Draw);
        assert_eq!(Score::eval(50).proven_value(), ProvenValue::Unknown);
    }
}
