//! Static tactical enumeration: forced outcomes up to five plies found
//! by direct queries to the threat histograms, with no tree search.

use sente_core::{GameConfig, Move, Score, Sign};

use crate::movegen::action::{ActionList, ActionStack};
use crate::patterns::calculator::PatternCalculator;
use crate::patterns::pattern::{PatternType, find_direction_of};
use crate::patterns::threat_table::ThreatType;

/// Outcome of one check stage.
struct StageResult {
    can_continue: bool,
    score: Score,
}

impl StageResult {
    fn open() -> StageResult {
        StageResult { can_continue: true, score: Score::none() }
    }

    fn closed(score: Score) -> StageResult {
        StageResult { can_continue: false, score }
    }
}

/// 1/3/5-ply tactical solver.
pub struct StaticSolver {
    config: GameConfig,
    moves_for_draw: usize,
}

impl StaticSolver {
    pub fn new(config: GameConfig) -> StaticSolver {
        StaticSolver { config, moves_for_draw: config.size() }
    }

    /// Treat the game as drawn once this many stones are on the board.
    pub fn set_draw_after(&mut self, moves: usize) {
        self.moves_for_draw = moves;
    }

    /// Enumerate forced wins and losses up to `depth` plies.
    ///
    /// Fills `actions` with the relevant moves and returns the proven
    /// score, or an unproven score when nothing conclusive was found.
    pub fn solve(
        &self,
        calc: &mut PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
        depth: u32,
    ) -> Score {
        actions.clear(stack);
        let mut result = self.check_win_in_1(calc, stack, actions);
        if result.can_continue {
            result = self.check_draw_in_1(calc, stack, actions);
        }
        if result.can_continue && depth >= 2 {
            result = self.check_loss_in_2(calc, stack, actions);
        }
        if result.can_continue && depth >= 3 {
            result = self.check_win_in_3(calc, stack, actions);
        }
        if result.can_continue && depth >= 5 {
            result = self.check_win_in_5(calc, stack, actions);
        }
        result.score
    }

    fn check_win_in_1(
        &self,
        calc: &mut PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
    ) -> StageResult {
        let own = calc.sign_to_move();
        let fives = calc.histogram(own).get(ThreatType::Five).to_vec();
        if fives.is_empty() {
            return StageResult::open();
        }
        for location in fives {
            actions.add(stack, location.with_sign(own), Score::win_in(1));
        }
        actions.is_fully_expanded = true;
        StageResult::closed(Score::win_in(1))
    }

    fn check_draw_in_1(
        &self,
        calc: &mut PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
    ) -> StageResult {
        if calc.current_depth() + 1 < self.moves_for_draw {
            return StageResult::open();
        }
        let own = calc.sign_to_move();

        if self.config.rules.has_forbidden_moves(own) {
            // renju cross: the last empty squares may all be forbidden
            let mut possible_forks: Vec<Move> = Vec::new();
            for row in 0..self.config.rows as u8 {
                for col in 0..self.config.cols as u8 {
                    if calc.sign_at(row, col) != Sign::None {
                        continue;
                    }
                    match calc.threat_for(own, row, col) {
                        ThreatType::Fork3x3 => possible_forks.push(Move::location(row, col)),
                        ThreatType::Fork4x4 | ThreatType::Overline => {
                            actions.add(stack, Move::new(row, col, own), Score::loss_in(0));
                        }
                        _ => {
                            actions.add(stack, Move::new(row, col, own), Score::draw());
                            actions.is_fully_expanded = true;
                            return StageResult::closed(Score::draw());
                        }
                    }
                }
            }
            // 3x3 forks need the full forbiddenness check
            for location in possible_forks {
                if calc.is_forbidden(own, location.row, location.col) {
                    actions.add(stack, location.with_sign(own), Score::loss_in(0));
                } else {
                    actions.add(stack, location.with_sign(own), Score::draw());
                    actions.is_fully_expanded = true;
                    return StageResult::closed(Score::draw());
                }
            }
            StageResult::open()
        } else if let Some(location) = first_empty(calc, self.config) {
            actions.add(stack, location.with_sign(own), Score::draw());
            actions.is_fully_expanded = true;
            StageResult::closed(Score::draw())
        } else {
            StageResult::open()
        }
    }

    fn check_loss_in_2(
        &self,
        calc: &mut PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
    ) -> StageResult {
        let own = calc.sign_to_move();
        let opp = own.invert();
        // copied out: forbidden checks below may reorder the histogram
        let opponent_fives = calc.histogram(opp).get(ThreatType::Five).to_vec();

        match opponent_fives.len() {
            0 => StageResult::open(),
            1 => {
                let five = opponent_fives[0];
                let defenses = self.defenses_against_five(calc, opp, five);
                for defense in &defenses {
                    if let Some(stage) =
                        self.winning_counter_at(calc, stack, actions, *defense)
                    {
                        return stage;
                    }
                }
                // defense is forced but nothing is proven here
                StageResult::closed(Score::none())
            }
            _ => {
                if !self.config.rules.blocked_five_wins() {
                    // caro: one stone may refute several fives at once
                    let mut common: Option<Vec<Move>> = None;
                    for five in &opponent_fives {
                        let defenses = self.defenses_against_five(calc, opp, *five);
                        common = Some(match common {
                            None => defenses,
                            Some(prev) => {
                                prev.into_iter().filter(|m| defenses.contains(m)).collect()
                            }
                        });
                    }
                    if common.as_ref().is_some_and(|c| !c.is_empty()) {
                        return StageResult::closed(Score::none());
                    }
                }
                for five in opponent_fives {
                    actions.add(stack, five.with_sign(own), Score::loss_in(2));
                }
                actions.is_fully_expanded = true;
                StageResult::closed(Score::loss_in(2))
            }
        }
    }

    fn check_win_in_3(
        &self,
        calc: &mut PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
    ) -> StageResult {
        let own = calc.sign_to_move();
        let open_fours = calc.histogram(own).get(ThreatType::Open4).to_vec();
        let forks_4x4 = calc.histogram(own).get(ThreatType::Fork4x4).to_vec();
        let forbidden = self.config.rules.has_forbidden_moves(own);

        let count = open_fours.len() + if forbidden { 0 } else { forks_4x4.len() };
        if count == 0 {
            return StageResult::open();
        }
        for location in open_fours {
            actions.add(stack, location.with_sign(own), Score::win_in(3));
        }
        if !forbidden {
            for location in forks_4x4 {
                actions.add(stack, location.with_sign(own), Score::win_in(3));
            }
        }
        actions.is_fully_expanded = true;
        StageResult::closed(Score::win_in(3))
    }

    fn check_win_in_5(
        &self,
        calc: &mut PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
    ) -> StageResult {
        let own = calc.sign_to_move();
        let opp = own.invert();

        let forks_4x3 = calc.histogram(own).get(ThreatType::Fork4x3).to_vec();
        for location in forks_4x3 {
            let solution = self.try_solve_fork_4x3(calc, location);
            if solution.is_win() {
                actions.add(stack, location.with_sign(own), solution);
                actions.is_fully_expanded = true;
                return StageResult::closed(solution);
            }
        }

        if !self.config.rules.has_forbidden_moves(own)
            && !calc.histogram(opp).has_any_four()
        {
            let forks_3x3 = calc.histogram(own).get(ThreatType::Fork3x3).to_vec();
            if let Some(location) = forks_3x3.first() {
                actions.add(stack, location.with_sign(own), Score::win_in(5));
                actions.is_fully_expanded = true;
                return StageResult::closed(Score::win_in(5));
            }
        }
        StageResult::open()
    }

    /// All single moves defending against an opponent five at `five`.
    ///
    /// Outside the caro rules there is exactly one: the completion square
    /// itself. Under caro the defensive-move table may add flank blocks.
    fn defenses_against_five(
        &self,
        calc: &PatternCalculator,
        opp: Sign,
        five: Move,
    ) -> Vec<Move> {
        if self.config.rules.blocked_five_wins() {
            return vec![five];
        }
        let own = opp.invert();
        let group = calc.pattern_group_at(opp, five.row, five.col);
        match find_direction_of(&group, PatternType::Five) {
            Some(dir) => calc.defensive_moves(own, five.row, five.col, dir),
            None => vec![five],
        }
    }

    /// If defending at `defense` also creates a winning counter-threat,
    /// close the stage with that win; renju forbidden defenses close it
    /// with a loss.
    fn winning_counter_at(
        &self,
        calc: &mut PatternCalculator,
        stack: &mut ActionStack,
        actions: &mut ActionList,
        defense: Move,
    ) -> Option<StageResult> {
        let own = calc.sign_to_move();
        let opp = own.invert();
        let response = defense.with_sign(own);

        match calc.threat_for(own, defense.row, defense.col) {
            ThreatType::Open4 => {
                actions.add(stack, response, Score::win_in(3));
                actions.is_fully_expanded = true;
                Some(StageResult::closed(Score::win_in(3)))
            }
            ThreatType::Fork4x4 => {
                if self.config.rules.has_forbidden_moves(own) {
                    actions.add(stack, response, Score::loss_in(2));
                    actions.is_fully_expanded = true;
                    Some(StageResult::closed(Score::loss_in(2)))
                } else {
                    actions.has_initiative = true;
                    actions.add(stack, response, Score::win_in(3));
                    actions.is_fully_expanded = true;
                    Some(StageResult::closed(Score::win_in(3)))
                }
            }
            ThreatType::Fork4x3 => {
                let solution = self.try_solve_fork_4x3(calc, defense);
                if solution.is_win() {
                    actions.add(stack, response, solution);
                    actions.is_fully_expanded = true;
                    Some(StageResult::closed(solution))
                } else {
                    None
                }
            }
            ThreatType::Fork3x3 => {
                if self.config.rules.has_forbidden_moves(own) {
                    if calc.is_forbidden(own, defense.row, defense.col) {
                        actions.add(stack, response, Score::loss_in(2));
                        actions.is_fully_expanded = true;
                        return Some(StageResult::closed(Score::loss_in(2)));
                    }
                    None
                } else if !calc.histogram(opp).has_any_four() {
                    actions.has_initiative = true;
                    actions.add(stack, response, Score::win_in(5));
                    actions.is_fully_expanded = true;
                    Some(StageResult::closed(Score::win_in(5)))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Can a 4x3 fork at `location` be converted into a forced win?
    ///
    /// The defender must answer the half-open four; if none of the
    /// defensive squares gives the defender a four of their own, the
    /// fork's open three decides the game.
    fn try_solve_fork_4x3(&self, calc: &mut PatternCalculator, location: Move) -> Score {
        let own = calc.sign_to_move();
        let opp = own.invert();
        if self.config.rules.has_forbidden_moves(own) {
            // the three may later run into a forbidden completion
            return Score::none();
        }

        let group = calc.pattern_group_at(own, location.row, location.col);
        let Some(dir) = find_direction_of(&group, PatternType::HalfOpen4) else {
            return Score::none();
        };
        let mut defenses = calc.defensive_moves(opp, location.row, location.col, dir);
        defenses.retain(|m| *m != location);

        let mut best_counter = ThreatType::None;
        for defense in &defenses {
            best_counter = best_counter.max(calc.threat_for(opp, defense.row, defense.col));
        }

        match best_counter {
            ThreatType::None | ThreatType::HalfOpen3 | ThreatType::Open3 => Score::win_in(5),
            ThreatType::Fork3x3 => {
                if self.config.rules.has_forbidden_moves(opp) {
                    match defenses.first() {
                        Some(defense)
                            if calc.is_forbidden(opp, defense.row, defense.col) =>
                        {
                            Score::win_in(3)
                        }
                        _ => Score::win_in(5),
                    }
                } else {
                    Score::win_in(5)
                }
            }
            ThreatType::HalfOpen4 | ThreatType::Fork4x3 => Score::none(),
            ThreatType::Fork4x4 => {
                if self.config.rules.has_forbidden_moves(opp) {
                    Score::win_in(3)
                } else {
                    Score::loss_in(4)
                }
            }
            ThreatType::Open4 => Score::loss_in(4),
            ThreatType::Five => Score::loss_in(2),
            ThreatType::Overline => {
                if self.config.rules.has_forbidden_moves(opp) {
                    Score::win_in(3)
                } else {
                    Score::loss_in(2)
                }
            }
        }
    }
}

fn first_empty(calc: &PatternCalculator, config: GameConfig) -> Option<Move> {
    for row in 0..config.rows as u8 {
        for col in 0..config.cols as u8 {
            if calc.sign_at(row, col) == Sign::None {
                return Some(Move::location(row, col));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use sente_core::{Board, GameRules};

    fn setup(rules: GameRules, text: &str, to_move: Sign) -> (PatternCalculator, StaticSolver) {
        let board: Board = text.parse().unwrap();
        let config = GameConfig::with_size(rules, board.rows(), board.cols());
        let mut calc = PatternCalculator::new(config);
        calc.set_board(&board, to_move).unwrap();
        (calc, StaticSolver::new(config))
    }

    fn empty_15() -> String {
        let row = vec!["_"; 15].join(" ");
        vec![row; 15].join("\n")
    }

    fn board_text(stones: &[(u8, u8, char)]) -> String {
        let mut grid = vec![vec!['_'; 15]; 15];
        for &(row, col, c) in stones {
            grid[row as usize][col as usize] = c;
        }
        grid.into_iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn win_in_1_from_an_open_four() {
        // four in a row with both completion squares open
        let text = board_text(&[
            (7, 5, 'X'),
            (7, 6, 'X'),
            (7, 7, 'X'),
            (7, 8, 'X'),
            (0, 0, 'O'),
            (0, 2, 'O'),
            (0, 4, 'O'),
            (0, 6, 'O'),
        ]);
        let (mut calc, solver) = setup(GameRules::Standard, &text, Sign::Cross);
        let mut stack = ActionStack::new(225);
        let mut actions = stack.push_list();

        let score = solver.solve(&mut calc, &mut stack, &mut actions, 1);
        assert_eq!(score, Score::win_in(1));
        assert!(actions.is_fully_expanded);
        assert!(actions.contains(&stack, Move::new(7, 9, Sign::Cross)));
    }

    #[test]
    fn loss_in_2_from_two_separate_fives() {
        // circle has two disjoint fours; cross cannot block both
        let mut stones = vec![];
        for col in 3..7 {
            stones.push((2u8, col as u8, 'O'));
            stones.push((10u8, col as u8, 'O'));
        }
        for col in 3..7 {
            stones.push((5u8, col as u8, 'X'));
        }
        for col in 8..12 {
            stones.push((6u8, col as u8, 'X'));
        }
        // block the cross fours so only circle threatens
        stones.push((5, 2, 'O'));
        stones.push((5, 7, 'O'));
        stones.push((6, 7, 'O'));
        stones.push((6, 12, 'O'));
        let (mut calc, solver) = setup(GameRules::Standard, &board_text(&stones), Sign::Cross);
        let mut stack = ActionStack::new(225);
        let mut actions = stack.push_list();

        let score = solver.solve(&mut calc, &mut stack, &mut actions, 5);
        assert_eq!(score, Score::loss_in(2));
        assert!(actions.is_fully_expanded);
    }

    #[test]
    fn win_in_3_from_open_three() {
        let text = board_text(&[
            (7, 5, 'X'),
            (7, 6, 'X'),
            (7, 7, 'X'),
            (0, 0, 'O'),
            (0, 2, 'O'),
            (0, 4, 'O'),
        ]);
        let (mut calc, solver) = setup(GameRules::Standard, &text, Sign::Cross);
        let mut stack = ActionStack::new(225);
        let mut actions = stack.push_list();

        // playing (7,4) or (7,8) makes an open four
        let score = solver.solve(&mut calc, &mut stack, &mut actions, 3);
        assert_eq!(score, Score::win_in(3));
        assert!(
            actions.contains(&stack, Move::new(7, 4, Sign::Cross))
                || actions.contains(&stack, Move::new(7, 8, Sign::Cross))
        );
    }

    #[test]
    fn single_five_defense_is_not_a_proven_loss() {
        let text = board_text(&[
            (7, 5, 'O'),
            (7, 6, 'O'),
            (7, 7, 'O'),
            (7, 8, 'O'),
            (7, 4, 'X'),
            (0, 0, 'X'),
            (0, 2, 'X'),
            (1, 4, 'X'),
        ]);
        let (mut calc, solver) = setup(GameRules::Standard, &text, Sign::Cross);
        let mut stack = ActionStack::new(225);
        let mut actions = stack.push_list();

        let score = solver.solve(&mut calc, &mut stack, &mut actions, 5);
        assert!(score.is_unproven());
    }

    #[test]
    fn caro_one_stone_refutes_two_fives() {
        // circle four with one end already blocked: O at col 6 flanks,
        // cross refutes by occupying the gap or the open flank
        let text = board_text(&[
            (7, 2, 'O'),
            (7, 3, 'O'),
            (7, 4, 'O'),
            (7, 5, 'O'),
            (7, 7, 'X'),
            (0, 0, 'X'),
            (0, 2, 'X'),
            (0, 4, 'X'),
        ]);
        let (mut calc, solver) = setup(GameRules::Caro5, &text, Sign::Cross);
        let mut stack = ActionStack::new(225);
        let mut actions = stack.push_list();

        // circle threatens five at (7,1) and (7,6); (7,6) is taken by
        // blocking either — the position must not be scored a loss
        let score = solver.solve(&mut calc, &mut stack, &mut actions, 5);
        assert!(!score.is_loss());
    }

    #[test]
    fn full_board_minus_one_is_a_draw() {
        // period-4 tiling XXOO shifted by two per row has no run longer
        // than two in any direction; removing one cross stone leaves a
        // balanced position with a single empty square
        let mut grid = vec![vec!['_'; 15]; 15];
        for (row, grid_row) in grid.iter_mut().enumerate() {
            for (col, cell) in grid_row.iter_mut().enumerate() {
                *cell = if (col + 2 * row) % 4 < 2 { 'X' } else { 'O' };
            }
        }
        assert_eq!(grid[7][2], 'X');
        grid[7][2] = '_';
        let text = grid
            .into_iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n");

        let board: Board = text.parse().unwrap();
        assert_eq!(board.inferred_sign_to_move(), Sign::Cross);
        let config = GameConfig::new(GameRules::Freestyle);
        let mut calc = PatternCalculator::new(config);
        calc.set_board(&board, Sign::Cross).unwrap();

        let solver = StaticSolver::new(config);
        let mut stack = ActionStack::new(225);
        let mut actions = stack.push_list();
        let score = solver.solve(&mut calc, &mut stack, &mut actions, 5);
        assert_eq!(score, Score::draw());
        assert!(actions.contains(&stack, Move::new(7, 2, Sign::Cross)));
    }

    #[test]
    fn empty_board_has_no_static_result() {
        let (mut calc, solver) = setup(GameRules::Standard, &empty_15(), Sign::Cross);
        let mut stack = ActionStack::new(225);
        let mut actions = stack.push_list();
        let score = solver.solve(&mut calc, &mut stack, &mut actions, 5);
        assert!(score.is_unproven());
        assert!(actions.is_empty());
    }
}
