//! Ordered candidate-move production from the threat histograms.

pub mod action;

use sente_core::{GameConfig, Move, Score, Sign};

use crate::movegen::action::{ActionList, ActionStack};
use crate::patterns::calculator::PatternCalculator;
use crate::patterns::pattern::{Direction, PatternType, find_direction_of};
use crate::patterns::threat_table::ThreatType;
use crate::solver::static_solver::StaticSolver;

/// What kind of candidate list to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorMode {
    /// Every empty square.
    Legal,
    /// Forcing moves only: wins, forced defenses, fours, open threes.
    Threats,
    /// Threats plus all empty squares in the crown of existing stones.
    Reduced,
    /// Like [`GeneratorMode::Reduced`] with weak threats included.
    Normal,
    /// Four-making moves and forced defenses only.
    Vcf,
    /// Delegate to the static solver at full depth.
    Static,
    /// Delegate to the static solver, immediate outcomes only.
    Basic,
}

/// Crown neighborhood offsets: a 7x7 reach pattern around each stone.
///
/// Row masks 1001001 / 0111110 / 0111110 / 1110111 / 0111110 / 0111110 /
/// 1001001: the full ring at distance one and two, plus the line
/// extensions at distance three.
const CROWN: [u8; 7] = [0b1001001, 0b0111110, 0b0111110, 0b1110111, 0b0111110, 0b0111110, 0b1001001];

/// Produces an [`ActionList`] from the current pattern state.
pub struct ThreatGenerator {
    config: GameConfig,
    solver: StaticSolver,
    /// Scratch mask of already-admitted squares, reused across calls.
    admitted: Vec<bool>,
}

impl ThreatGenerator {
    pub fn new(config: GameConfig) -> ThreatGenerator {
        ThreatGenerator {
            config,
            solver: StaticSolver::new(config),
            admitted: vec![false; config.size()],
        }
    }

    /// Treat the game as drawn once this many stones are on the board.
    pub fn set_draw_after(&mut self, moves: usize) {
        self.solver.set_draw_after(moves);
    }

    /// Fill `actions` according to `mode`; returns the static solver's
    /// score, proven when the position is tactically decided.
    pub fn generate(
        &mut self,
        calc: &mut PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
        mode: GeneratorMode,
    ) -> Score {
        actions.clear(stack);
        self.admitted.fill(false);

        match mode {
            GeneratorMode::Legal => {
                let own = calc.sign_to_move();
                for row in 0..self.config.rows as u8 {
                    for col in 0..self.config.cols as u8 {
                        if calc.sign_at(row, col) == Sign::None {
                            self.add(stack, actions, Move::new(row, col, own));
                        }
                    }
                }
                actions.is_fully_expanded = true;
                Score::none()
            }
            GeneratorMode::Basic => self.solver.solve(calc, stack, actions, 1),
            GeneratorMode::Static => self.solver.solve(calc, stack, actions, 5),
            GeneratorMode::Threats
            | GeneratorMode::Reduced
            | GeneratorMode::Normal
            | GeneratorMode::Vcf => {
                let score = self.solver.solve(calc, stack, actions, 5);
                if score.is_proven() {
                    return score;
                }
                actions.clear(stack);
                self.admitted.fill(false);
                self.generate_staged(calc, stack, actions, mode);
                score
            }
        }
    }

    fn generate_staged(
        &mut self,
        calc: &mut PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
        mode: GeneratorMode,
    ) {
        let own = calc.sign_to_move();
        let opp = own.invert();

        if self.defend_loss_in_2(calc, stack, actions) {
            actions.is_fully_expanded = true;
            return;
        }
        if self.defend_loss_in_4(calc, stack, actions) {
            actions.is_fully_expanded = true;
            return;
        }

        // attacking threats, strongest first
        self.add_threats(calc, stack, actions, own, ThreatType::Open4);
        if !self.config.rules.has_forbidden_moves(own) {
            self.add_threats(calc, stack, actions, own, ThreatType::Fork4x4);
        }
        self.add_threats(calc, stack, actions, own, ThreatType::Fork4x3);
        self.add_threats(calc, stack, actions, own, ThreatType::HalfOpen4);
        if !actions.is_empty() {
            // four-class threats keep the attacking initiative
            actions.has_initiative = true;
        }

        match mode {
            GeneratorMode::Vcf => {
                actions.is_fully_expanded = actions.must_defend;
            }
            GeneratorMode::Threats => {
                self.add_nonforbidden_forks_3x3(calc, stack, actions);
                self.add_threats(calc, stack, actions, own, ThreatType::Open3);
                actions.is_fully_expanded = false;
            }
            GeneratorMode::Reduced | GeneratorMode::Normal => {
                self.add_nonforbidden_forks_3x3(calc, stack, actions);
                self.add_threats(calc, stack, actions, own, ThreatType::Open3);
                if mode == GeneratorMode::Normal {
                    self.add_threats(calc, stack, actions, own, ThreatType::HalfOpen3);
                    self.add_threats(calc, stack, actions, opp, ThreatType::HalfOpen4);
                    self.add_threats(calc, stack, actions, opp, ThreatType::Open3);
                    self.add_threats(calc, stack, actions, opp, ThreatType::HalfOpen3);
                }
                self.add_crown_neighborhood(calc, stack, actions);
                actions.is_fully_expanded = true;
            }
            _ => {}
        }
    }

    /// Opponent five on the board: the reply set is the union of
    /// defensive moves against every five. Restricts the mover.
    fn defend_loss_in_2(
        &mut self,
        calc: &mut PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
    ) -> bool {
        let own = calc.sign_to_move();
        let opp = own.invert();
        let fives = calc.histogram(opp).get(ThreatType::Five).to_vec();
        if fives.is_empty() {
            return false;
        }
        actions.must_defend = true;

        for five in &fives {
            let group = calc.pattern_group_at(opp, five.row, five.col);
            if let Some(dir) = find_direction_of(&group, PatternType::Five) {
                self.add_defensive_moves(calc, stack, actions, *five, dir);
            }
        }
        if actions.is_empty() {
            // unrefutable, but some reply must still be offered
            for five in fives {
                self.add(stack, actions, five.with_sign(own));
            }
        }
        true
    }

    /// Opponent open four or 4x4 fork: block it or keep checking with
    /// our own fours.
    fn defend_loss_in_4(
        &mut self,
        calc: &mut PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
    ) -> bool {
        let own = calc.sign_to_move();
        let opp = own.invert();

        let open_fours = calc.histogram(opp).get(ThreatType::Open4).to_vec();
        for threat in &open_fours {
            let group = calc.pattern_group_at(opp, threat.row, threat.col);
            if let Some(dir) = find_direction_of(&group, PatternType::Open4) {
                self.add_defensive_moves(calc, stack, actions, *threat, dir);
            }
        }

        let forks = calc.histogram(opp).get(ThreatType::Fork4x4).to_vec();
        let forks_forbidden = self.config.rules.has_forbidden_moves(opp);
        if !forks_forbidden {
            for threat in &forks {
                let group = calc.pattern_group_at(opp, threat.row, threat.col);
                for dir in Direction::ALL {
                    if matches!(
                        group[dir.index()],
                        PatternType::Open4 | PatternType::HalfOpen4 | PatternType::Double4
                    ) {
                        self.add_defensive_moves(calc, stack, actions, *threat, dir);
                    }
                }
            }
        }

        let danger_count = open_fours.len() + if forks_forbidden { 0 } else { forks.len() };
        if danger_count == 0 {
            return false;
        }
        actions.must_defend = true;
        // a four of our own keeps the initiative one ply longer
        self.add_threats(calc, stack, actions, own, ThreatType::HalfOpen4);
        self.add_threats(calc, stack, actions, own, ThreatType::Fork4x3);
        true
    }

    fn add_defensive_moves(
        &mut self,
        calc: &mut PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
        threat: Move,
        dir: Direction,
    ) {
        let own = calc.sign_to_move();
        let defenses = calc.defensive_moves(own, threat.row, threat.col, dir);
        let check_forbidden = self.config.rules.has_forbidden_moves(own);
        for defense in defenses {
            if check_forbidden && calc.is_forbidden(own, defense.row, defense.col) {
                continue;
            }
            self.add(stack, actions, defense.with_sign(own));
        }
    }

    fn add_threats(
        &mut self,
        calc: &PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
        sign: Sign,
        threat: ThreatType,
    ) {
        let own = calc.sign_to_move();
        for &location in calc.histogram(sign).get(threat) {
            self.add(stack, actions, location.with_sign(own));
        }
    }

    fn add_nonforbidden_forks_3x3(
        &mut self,
        calc: &mut PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
    ) {
        let own = calc.sign_to_move();
        let forks = calc.histogram(own).get(ThreatType::Fork3x3).to_vec();
        let check_forbidden = self.config.rules.has_forbidden_moves(own);
        for location in forks {
            if check_forbidden && calc.is_forbidden(own, location.row, location.col) {
                continue;
            }
            self.add(stack, actions, location.with_sign(own));
        }
    }

    /// Admit every empty square within the crown of any stone; on an
    /// empty board, just the center square.
    fn add_crown_neighborhood(
        &mut self,
        calc: &PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
    ) {
        let own = calc.sign_to_move();
        if calc.current_depth() == 0 {
            let center = Move::new(self.config.rows as u8 / 2, self.config.cols as u8 / 2, own);
            self.add(stack, actions, center);
            return;
        }

        let mut near = vec![false; self.config.size()];
        for row in 0..self.config.rows as i32 {
            for col in 0..self.config.cols as i32 {
                if calc.sign_at(row as u8, col as u8) == Sign::None {
                    continue;
                }
                for (dr, mask) in CROWN.iter().enumerate() {
                    let r = row + dr as i32 - 3;
                    if r < 0 || r >= self.config.rows as i32 {
                        continue;
                    }
                    for dc in 0..7 {
                        if (mask >> dc) & 1 == 0 {
                            continue;
                        }
                        let c = col + dc as i32 - 3;
                        if c < 0 || c >= self.config.cols as i32 {
                            continue;
                        }
                        near[r as usize * self.config.cols + c as usize] = true;
                    }
                }
            }
        }
        for row in 0..self.config.rows as u8 {
            for col in 0..self.config.cols as u8 {
                if near[row as usize * self.config.cols + col as usize]
                    && calc.sign_at(row, col) == Sign::None
                {
                    self.add(stack, actions, Move::new(row, col, own));
                }
            }
        }
    }

    fn add(&mut self, stack: &mut ActionStack, actions: &mut ActionList, mv: Move) {
        let index = mv.row as usize * self.config.cols + mv.col as usize;
        if !self.admitted[index] {
            self.admitted[index] = true;
            actions.add(stack, mv, Score::none());
        }
    }
}

/// Prepend the hash move and killers to an already generated list.
///
/// Stable for the remaining entries; repeat calls before any move is
/// made produce the same order.
pub fn apply_ordering(
    stack: &mut ActionStack,
    actions: &ActionList,
    hash_move: Option<Move>,
    killers: &[Move],
) {
    let mut offset = 0;
    if let Some(mv) = hash_move
        && actions.move_closer_to_front(stack, mv, offset)
    {
        offset += 1;
    }
    for killer in killers {
        if actions.move_closer_to_front(stack, *killer, offset) {
            offset += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sente_core::{Board, GameRules};

    fn generator_setup(
        stones: &[(u8, u8, Sign)],
        to_move: Sign,
    ) -> (PatternCalculator, ThreatGenerator, ActionStack) {
        let config = GameConfig::new(GameRules::Standard);
        let mut board = Board::empty(15, 15);
        for &(row, col, sign) in stones {
            board.put_move(Move::new(row, col, sign)).unwrap();
        }
        let mut calc = PatternCalculator::new(config);
        calc.set_board(&board, to_move).unwrap();
        (calc, ThreatGenerator::new(config), ActionStack::new(225))
    }

    #[test]
    fn legal_mode_lists_every_empty_square() {
        let (mut calc, mut generator, mut stack) =
            generator_setup(&[(7, 7, Sign::Cross)], Sign::Circle);
        let mut actions = stack.push_list();
        generator.generate(&mut calc, &mut stack, &mut actions, GeneratorMode::Legal);
        assert_eq!(actions.len(), 224);
        assert!(actions.is_fully_expanded);
    }

    #[test]
    fn empty_board_reduced_mode_offers_the_center() {
        let (mut calc, mut generator, mut stack) = generator_setup(&[], Sign::Cross);
        let mut actions = stack.push_list();
        generator.generate(&mut calc, &mut stack, &mut actions, GeneratorMode::Reduced);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions.get(&stack, 0).mv, Move::new(7, 7, Sign::Cross));
    }

    #[test]
    fn opponent_five_forces_the_block() {
        let (mut calc, mut generator, mut stack) = generator_setup(
            &[
                (7, 4, Sign::Circle),
                (7, 5, Sign::Circle),
                (7, 6, Sign::Circle),
                (7, 7, Sign::Circle),
                (7, 3, Sign::Cross),
                (0, 0, Sign::Cross),
                (0, 2, Sign::Cross),
                (1, 5, Sign::Cross),
            ],
            Sign::Cross,
        );
        let mut actions = stack.push_list();
        let score =
            generator.generate(&mut calc, &mut stack, &mut actions, GeneratorMode::Threats);
        assert!(score.is_unproven());
        assert!(actions.must_defend);
        assert!(actions.is_fully_expanded);
        assert!(actions.contains(&stack, Move::new(7, 8, Sign::Cross)));
    }

    #[test]
    fn threats_mode_surfaces_open_three_completions() {
        let (mut calc, mut generator, mut stack) = generator_setup(
            &[
                (7, 5, Sign::Cross),
                (7, 6, Sign::Cross),
                (0, 0, Sign::Circle),
                (0, 2, Sign::Circle),
            ],
            Sign::Cross,
        );
        let mut actions = stack.push_list();
        generator.generate(&mut calc, &mut stack, &mut actions, GeneratorMode::Threats);
        assert!(!actions.must_defend);
        assert!(!actions.is_fully_expanded);
        // (7,7) turns the pair into an open three
        assert!(actions.contains(&stack, Move::new(7, 7, Sign::Cross)));
    }

    #[test]
    fn ordering_pulls_hash_move_and_killers_forward() {
        let (mut calc, mut generator, mut stack) =
            generator_setup(&[(7, 7, Sign::Cross)], Sign::Circle);
        let mut actions = stack.push_list();
        generator.generate(&mut calc, &mut stack, &mut actions, GeneratorMode::Reduced);
        assert!(actions.len() >= 3);

        let hash_move = actions.get(&stack, actions.len() - 1).mv;
        let killer = actions.get(&stack, actions.len() - 2).mv;
        apply_ordering(&mut stack, &actions, Some(hash_move), &[killer]);
        assert_eq!(actions.get(&stack, 0).mv, hash_move);
        assert_eq!(actions.get(&stack, 1).mv, killer);
    }

    #[test]
    fn vcf_mode_only_offers_four_makers() {
        let (mut calc, mut generator, mut stack) = generator_setup(
            &[
                (7, 5, Sign::Cross),
                (7, 6, Sign::Cross),
                (7, 7, Sign::Cross),
                (7, 4, Sign::Circle),
                (0, 0, Sign::Circle),
                (2, 2, Sign::Circle),
            ],
            Sign::Cross,
        );
        let mut actions = stack.push_list();
        generator.generate(&mut calc, &mut stack, &mut actions, GeneratorMode::Vcf);
        // the only fours come from extending the blocked three at (7,8)
        for action in actions.as_slice(&stack) {
            assert!(
                calc.threat_for(Sign::Cross, action.mv.row, action.mv.col).is_four(),
                "{} is not a four-making move",
                action.mv
            );
        }
    }
}
