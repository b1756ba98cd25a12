//! Rule-aware terminal detection for a just-completed move.

use crate::board::Board;
use crate::mov::Move;
use crate::rules::GameRules;
use crate::sign::Sign;

/// Outcome of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    /// Cross (black) has won.
    CrossWin,
    /// Circle (white) has won.
    CircleWin,
    /// The board filled up with no winner.
    Draw,
}

impl GameOutcome {
    /// The winning sign, if any.
    pub fn winner(self) -> Option<Sign> {
        match self {
            GameOutcome::CrossWin => Some(Sign::Cross),
            GameOutcome::CircleWin => Some(Sign::Circle),
            GameOutcome::Draw => None,
        }
    }

    /// Outcome in which `sign` is the winner.
    pub fn win_for(sign: Sign) -> GameOutcome {
        match sign {
            Sign::Cross => GameOutcome::CrossWin,
            _ => GameOutcome::CircleWin,
        }
    }
}

/// Row/column steps for the four line directions.
const DIRECTIONS: [(i32, i32); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// Check whether `last_move` finished the game.
///
/// Only lines through `last_move` are inspected, so the check is O(1) in
/// board size. Returns `None` while the game continues. Renju fork
/// forbiddenness is judged by the pattern calculator, not here; this
/// routine covers line outcomes (five, overline, blocked five) and the
/// full-board draw.
pub fn game_outcome(rules: GameRules, board: &Board, last_move: Move) -> Option<GameOutcome> {
    debug_assert!(last_move.sign == Sign::Cross || last_move.sign == Sign::Circle);
    let sign = last_move.sign;

    for (dr, dc) in DIRECTIONS {
        let (run, front, back) = run_through(board, last_move, dr, dc);
        if run >= 5 && line_wins(rules, sign, run, front, back) {
            return Some(GameOutcome::win_for(sign));
        }
        if run >= 6 && rules == GameRules::Renju && sign == Sign::Cross {
            // An overline is forbidden for cross; playing it loses outright.
            return Some(GameOutcome::CircleWin);
        }
    }

    if board.is_full() {
        return Some(GameOutcome::Draw);
    }
    None
}

/// Length of the run of `mv.sign` stones through `mv` along `(dr, dc)`,
/// plus the two cells flanking the run (`Sign::Illegal` off the board).
fn run_through(board: &Board, mv: Move, dr: i32, dc: i32) -> (u32, Sign, Sign) {
    let probe = |mut r: i32, mut c: i32, step: i32| -> (u32, Sign) {
        let mut len = 0;
        loop {
            r += dr * step;
            c += dc * step;
            if r < 0 || c < 0 || r >= board.rows() as i32 || c >= board.cols() as i32 {
                return (len, Sign::Illegal);
            }
            let cell = board.at(r as u8, c as u8);
            if cell != mv.sign {
                return (len, cell);
            }
            len += 1;
        }
    };

    let (ahead, front) = probe(mv.row as i32, mv.col as i32, 1);
    let (behind, back) = probe(mv.row as i32, mv.col as i32, -1);
    (1 + ahead + behind, front, back)
}

/// Rule-specific judgement of a completed run of length `run >= 5`.
fn line_wins(rules: GameRules, sign: Sign, run: u32, front: Sign, back: Sign) -> bool {
    let opponent = sign.invert();
    match rules {
        GameRules::Freestyle => true,
        GameRules::Standard => run == 5,
        GameRules::Renju => {
            if sign == Sign::Cross { run == 5 } else { true }
        }
        GameRules::Caro5 => run == 5 && !(front == opponent && back == opponent),
        GameRules::Caro6 => run >= 6 || !(front == opponent && back == opponent),
    }
}
