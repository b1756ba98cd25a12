//! Hand-crafted evaluation from the threat histograms, used when no
//! NNUE weights are available.

use sente_core::{Score, Sign};

use crate::patterns::calculator::PatternCalculator;
use crate::patterns::threat_table::ThreatType;

/// Weight of each own threat level, indexed by [`ThreatType`].
const OWN_THREAT_VALUES: [i32; ThreatType::COUNT] = [0, 0, 1, 5, 10, 50, 100, 100, 1000, 0];

/// Weight of each opponent threat level, indexed by [`ThreatType`].
const OPP_THREAT_VALUES: [i32; ThreatType::COUNT] = [0, 0, 0, 0, 1, 5, 10, 10, 100, 0];

/// Weighted count of both sides' threats, from the mover's perspective.
pub fn static_evaluation(calc: &PatternCalculator) -> Score {
    let own = calc.sign_to_move();
    let opp = own.invert();
    let mut result = 0i32;
    for threat in threat_range() {
        result += OWN_THREAT_VALUES[threat as usize] * calc.histogram(own).get(threat).len() as i32;
        result -= OPP_THREAT_VALUES[threat as usize] * calc.histogram(opp).get(threat).len() as i32;
    }
    Score::eval(result)
}

fn threat_range() -> impl Iterator<Item = ThreatType> {
    ThreatType::ALL
        .into_iter()
        .filter(|t| (ThreatType::Open3..=ThreatType::Five).contains(t))
}

/// Map an NNUE expectation in `[0, 1]` to an evaluation score.
pub fn score_from_expectation(expectation: f32) -> Score {
    Score::eval((2000.0 * expectation) as i32 - 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sente_core::{Board, GameConfig, GameRules, Move};

    #[test]
    fn more_threats_score_higher() {
        let config = GameConfig::new(GameRules::Standard);
        let mut calc = PatternCalculator::new(config);

        let mut board = Board::empty(15, 15);
        board.put_move(Move::new(7, 6, Sign::Cross)).unwrap();
        board.put_move(Move::new(7, 7, Sign::Cross)).unwrap();
        board.put_move(Move::new(0, 0, Sign::Circle)).unwrap();
        board.put_move(Move::new(0, 2, Sign::Circle)).unwrap();
        calc.set_board(&board, Sign::Cross).unwrap();
        let pair = static_evaluation(&calc);

        board.put_move(Move::new(8, 7, Sign::Cross)).unwrap();
        board.put_move(Move::new(0, 4, Sign::Circle)).unwrap();
        calc.set_board(&board, Sign::Cross).unwrap();
        let triangle = static_evaluation(&calc);

        assert!(triangle > pair, "{triangle} should beat {pair}");
    }

    #[test]
    fn evaluation_flips_with_the_mover() {
        let config = GameConfig::new(GameRules::Standard);
        let mut calc = PatternCalculator::new(config);
        let mut board = Board::empty(15, 15);
        board.put_move(Move::new(7, 5, Sign::Cross)).unwrap();
        board.put_move(Move::new(7, 6, Sign::Cross)).unwrap();
        board.put_move(Move::new(0, 0, Sign::Circle)).unwrap();
        board.put_move(Move::new(0, 2, Sign::Circle)).unwrap();

        calc.set_board(&board, Sign::Cross).unwrap();
        let for_cross = static_evaluation(&calc);
        calc.set_board(&board, Sign::Circle).unwrap();
        let for_circle = static_evaluation(&calc);
        assert!(for_cross > for_circle);
    }

    #[test]
    fn expectation_mapping_is_centered() {
        assert_eq!(score_from_expectation(0.5), Score::eval(0));
        assert!(score_from_expectation(1.0) > Score::eval(900));
        assert!(score_from_expectation(0.0) < Score::eval(-900));
    }
}
