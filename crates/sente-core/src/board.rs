//! The game board: stone placement, legality, and the text format.

use std::fmt;
use std::str::FromStr;

use crate::error::{BoardError, ParseBoardError};
use crate::mov::Move;
use crate::sign::Sign;

/// Rectangular mapping from `(row, col)` to [`Sign`], origin top-left.
///
/// The board is a plain value type; incremental pattern state lives in the
/// engine's calculator, which mirrors board edits.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Board {
    rows: usize,
    cols: usize,
    cells: Vec<Sign>,
}

impl Board {
    /// An empty board of the given dimensions.
    pub fn empty(rows: usize, cols: usize) -> Board {
        assert!(rows > 0 && cols > 0 && rows <= 32 && cols <= 32);
        Board { rows, cols, cells: vec![Sign::None; rows * cols] }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of cells.
    #[inline]
    pub fn size(&self) -> usize {
        self.rows * self.cols
    }

    /// Whether `(row, col)` lies on the board.
    #[inline]
    pub fn contains(&self, row: u8, col: u8) -> bool {
        (row as usize) < self.rows && (col as usize) < self.cols
    }

    /// The sign at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is out of range.
    #[inline]
    pub fn at(&self, row: u8, col: u8) -> Sign {
        self.cells[row as usize * self.cols + col as usize]
    }

    /// Raw cell access for compressed-board construction.
    #[inline]
    pub fn cell(&self, index: usize) -> Sign {
        self.cells[index]
    }

    /// Whether the square is on the board and empty.
    #[inline]
    pub fn is_empty_at(&self, row: u8, col: u8) -> bool {
        self.contains(row, col) && self.at(row, col) == Sign::None
    }

    /// Number of stones on the board.
    pub fn move_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c != Sign::None).count()
    }

    /// Whether every cell is occupied.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|&c| c != Sign::None)
    }

    /// The side to move inferred from stone counts (cross moves first).
    pub fn inferred_sign_to_move(&self) -> Sign {
        let cross = self.cells.iter().filter(|&&c| c == Sign::Cross).count();
        let circle = self.cells.iter().filter(|&&c| c == Sign::Circle).count();
        if cross <= circle { Sign::Cross } else { Sign::Circle }
    }

    /// Place a stone. The move must carry a sign and target an empty square.
    pub fn put_move(&mut self, mv: Move) -> Result<(), BoardError> {
        if mv.sign != Sign::Cross && mv.sign != Sign::Circle {
            return Err(BoardError::MissingSign);
        }
        if !self.contains(mv.row, mv.col) {
            return Err(BoardError::OutOfRange { row: mv.row, col: mv.col });
        }
        if self.at(mv.row, mv.col) != Sign::None {
            return Err(BoardError::NotEmpty { row: mv.row, col: mv.col });
        }
        self.cells[mv.row as usize * self.cols + mv.col as usize] = mv.sign;
        Ok(())
    }

    /// Remove a stone previously placed by `mv`.
    pub fn undo_move(&mut self, mv: Move) -> Result<(), BoardError> {
        if !self.contains(mv.row, mv.col) {
            return Err(BoardError::OutOfRange { row: mv.row, col: mv.col });
        }
        if self.at(mv.row, mv.col) != mv.sign {
            return Err(BoardError::WrongStone { row: mv.row, col: mv.col });
        }
        self.cells[mv.row as usize * self.cols + mv.col as usize] = Sign::None;
        Ok(())
    }

    /// Check stone-count consistency. Runs before any engine sync so a
    /// bad setup is rejected without mutating engine state.
    pub fn validate(&self) -> Result<(), BoardError> {
        let cross = self.cells.iter().filter(|&&c| c == Sign::Cross).count();
        let circle = self.cells.iter().filter(|&&c| c == Sign::Circle).count();
        if cross != circle && cross != circle + 1 {
            return Err(BoardError::ImbalancedCounts { cross, circle });
        }
        Ok(())
    }

    /// Iterate over all empty squares as bare locations.
    pub fn empty_squares(&self) -> impl Iterator<Item = Move> + '_ {
        (0..self.rows).flat_map(move |row| {
            (0..self.cols).filter_map(move |col| {
                if self.cells[row * self.cols + col] == Sign::None {
                    Some(Move::location(row as u8, col as u8))
                } else {
                    None
                }
            })
        })
    }
}

/// One row per line, cells separated by single spaces.
impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            for col in 0..self.cols {
                if col > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", self.cells[row * self.cols + col])?;
            }
            if row + 1 < self.rows {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Board({}x{})", self.rows, self.cols)?;
        write!(f, "{self}")
    }
}

impl FromStr for Board {
    type Err = ParseBoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rows: Vec<Vec<Sign>> = Vec::new();
        for (row_index, line) in s.lines().map(str::trim).filter(|l| !l.is_empty()).enumerate() {
            let mut row = Vec::new();
            for token in line.split_whitespace() {
                let mut chars = token.chars();
                let c = chars.next().unwrap();
                if chars.next().is_some() {
                    return Err(ParseBoardError::InvalidCell { character: c });
                }
                let sign =
                    Sign::from_char(c).ok_or(ParseBoardError::InvalidCell { character: c })?;
                row.push(sign);
            }
            if let Some(first) = rows.first()
                && row.len() != first.len()
            {
                return Err(ParseBoardError::RaggedRow {
                    row_index,
                    found: row.len(),
                    expected: first.len(),
                });
            }
            rows.push(row);
        }
        if rows.is_empty() || rows[0].is_empty() {
            return Err(ParseBoardError::Empty);
        }

        let board = Board {
            rows: rows.len(),
            cols: rows[0].len(),
            cells: rows.into_iter().flatten().collect(),
        };
        board.validate()?;
        Ok(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_undo() {
        let mut board = Board::empty(15, 15);
        let mv = Move::new(7, 7, Sign::Cross);
        board.put_move(mv).unwrap();
        assert_eq!(board.at(7, 7), Sign::Cross);
        assert_eq!(board.move_count(), 1);
        board.undo_move(mv).unwrap();
        assert_eq!(board.at(7, 7), Sign::None);
        assert_eq!(board.move_count(), 0);
    }

    #[test]
    fn illegal_moves_leave_state_unchanged() {
        let mut board = Board::empty(15, 15);
        board.put_move(Move::new(7, 7, Sign::Cross)).unwrap();
        let before = board.clone();

        assert_eq!(
            board.put_move(Move::new(7, 7, Sign::Circle)),
            Err(BoardError::NotEmpty { row: 7, col: 7 })
        );
        assert_eq!(
            board.put_move(Move::new(20, 3, Sign::Circle)),
            Err(BoardError::OutOfRange { row: 20, col: 3 })
        );
        assert_eq!(
            board.put_move(Move::location(3, 3)),
            Err(BoardError::MissingSign)
        );
        assert_eq!(board, before);
    }

    #[test]
    fn text_roundtrip() {
        let mut board = Board::empty(5, 5);
        board.put_move(Move::new(2, 2, Sign::Cross)).unwrap();
        board.put_move(Move::new(1, 3, Sign::Circle)).unwrap();
        board.put_move(Move::new(4, 0, Sign::Cross)).unwrap();
        board.put_move(Move::new(0, 4, Sign::Circle)).unwrap();

        let text = board.to_string();
        let parsed: Board = text.parse().unwrap();
        assert_eq!(parsed, board);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            "_ _ ?\n_ _ _".parse::<Board>(),
            Err(ParseBoardError::InvalidCell { character: '?' })
        ));
        assert!(matches!(
            "_ _\n_".parse::<Board>(),
            Err(ParseBoardError::RaggedRow { .. })
        ));
        assert!(matches!("".parse::<Board>(), Err(ParseBoardError::Empty)));
    }

    #[test]
    fn parse_rejects_imbalanced_position() {
        let result = "X X\nX _".parse::<Board>();
        assert!(matches!(result, Err(ParseBoardError::InvalidPosition { .. })));
    }

    #[test]
    fn inferred_sign_to_move() {
        let mut board = Board::empty(15, 15);
        assert_eq!(board.inferred_sign_to_move(), Sign::Cross);
        board.put_move(Move::new(7, 7, Sign::Cross)).unwrap();
        assert_eq!(board.inferred_sign_to_move(), Sign::Circle);
        board.put_move(Move::new(7, 8, Sign::Circle)).unwrap();
        assert_eq!(board.inferred_sign_to_move(), Sign::Cross);
    }
}
