//! NNUE input features: one-hot threat and stone planes per square,
//! plus a side-to-move bias feature.

use sente_core::Sign;

use crate::patterns::calculator::PatternCalculator;
use crate::patterns::threat_table::{ThreatEncoding, ThreatType};

/// Features per square: 9 cross threat levels, 9 circle threat levels,
/// and the two stone occupancy planes.
pub const FEATURES_PER_SQUARE: usize = 20;

/// Feature index 0: set when cross is the side to move.
pub const SIDE_TO_MOVE_FEATURE: usize = 0;

/// Total feature count for a board of `cells` squares.
pub const fn feature_count(cells: usize) -> usize {
    1 + cells * FEATURES_PER_SQUARE
}

/// Base feature index of a square.
#[inline]
pub const fn square_base(cell_index: usize) -> usize {
    1 + cell_index * FEATURES_PER_SQUARE
}

/// Feature index of a non-`None` threat level for one side.
#[inline]
pub fn threat_feature(cell_index: usize, sign: Sign, threat: ThreatType) -> usize {
    debug_assert!(threat != ThreatType::None);
    let side_offset = if sign == Sign::Cross { 0 } else { 9 };
    square_base(cell_index) + side_offset + threat as usize - 1
}

/// Feature index of a stone on a square.
#[inline]
pub fn stone_feature(cell_index: usize, sign: Sign) -> usize {
    debug_assert!(sign == Sign::Cross || sign == Sign::Circle);
    square_base(cell_index) + 18 + sign.index()
}

/// Push all features of one square's threat encoding.
pub fn push_threat_features(features: &mut Vec<usize>, cell_index: usize, encoding: ThreatEncoding) {
    if encoding.for_cross() != ThreatType::None {
        features.push(threat_feature(cell_index, Sign::Cross, encoding.for_cross()));
    }
    if encoding.for_circle() != ThreatType::None {
        features.push(threat_feature(cell_index, Sign::Circle, encoding.for_circle()));
    }
}

/// All currently active features of a position.
pub fn active_features(calc: &PatternCalculator) -> Vec<usize> {
    let config = calc.config();
    let mut features = Vec::with_capacity(128);
    if calc.sign_to_move() == Sign::Cross {
        features.push(SIDE_TO_MOVE_FEATURE);
    }
    for row in 0..config.rows as u8 {
        for col in 0..config.cols as u8 {
            let cell_index = row as usize * config.cols + col as usize;
            push_threat_features(&mut features, cell_index, calc.threat_at(row, col));
            match calc.sign_at(row, col) {
                Sign::Cross | Sign::Circle => {
                    features.push(stone_feature(cell_index, calc.sign_at(row, col)));
                }
                _ => {}
            }
        }
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_indices_do_not_overlap() {
        let mut seen = std::collections::HashSet::new();
        assert!(seen.insert(SIDE_TO_MOVE_FEATURE));
        for cell in 0..4 {
            for threat in ThreatType::ALL.into_iter().skip(1) {
                assert!(seen.insert(threat_feature(cell, Sign::Cross, threat)));
                assert!(seen.insert(threat_feature(cell, Sign::Circle, threat)));
            }
            assert!(seen.insert(stone_feature(cell, Sign::Cross)));
            assert!(seen.insert(stone_feature(cell, Sign::Circle)));
        }
        assert_eq!(seen.len(), 1 + 4 * FEATURES_PER_SQUARE);
        assert!(seen.iter().all(|&f| f < feature_count(4)));
    }

    #[test]
    fn active_features_on_an_empty_board() {
        use sente_core::{Board, GameConfig, GameRules};

        let mut calc = PatternCalculator::new(GameConfig::new(GameRules::Standard));
        calc.set_board(&Board::empty(15, 15), Sign::Cross).unwrap();
        let features = active_features(&calc);
        assert_eq!(features, vec![SIDE_TO_MOVE_FEATURE]);
    }
}
