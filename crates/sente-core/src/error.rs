//! Error types for board setup, move application, and text parsing.

/// Errors from applying a move or validating a position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// The target square lies outside the board.
    #[error("square ({row}, {col}) is outside the board")]
    OutOfRange {
        /// Row of the offending square.
        row: u8,
        /// Column of the offending square.
        col: u8,
    },
    /// The target square is already occupied.
    #[error("square ({row}, {col}) is not empty")]
    NotEmpty {
        /// Row of the offending square.
        row: u8,
        /// Column of the offending square.
        col: u8,
    },
    /// Undo was asked to remove a stone that is not there.
    #[error("square ({row}, {col}) does not hold the stone being removed")]
    WrongStone {
        /// Row of the offending square.
        row: u8,
        /// Column of the offending square.
        col: u8,
    },
    /// A move carries no stone.
    #[error("move has no sign attached")]
    MissingSign,
    /// The stone counts are impossible: cross moves first, so its count
    /// must equal circle's or exceed it by exactly one.
    #[error("impossible stone counts: {cross} cross vs {circle} circle")]
    ImbalancedCounts {
        /// Number of cross stones.
        cross: usize,
        /// Number of circle stones.
        circle: usize,
    },
}

/// Errors from parsing the board text format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseBoardError {
    /// The input holds no rows at all.
    #[error("empty board text")]
    Empty,
    /// A row describes a different number of cells than the first row.
    #[error("row {row_index} has {found} cells, expected {expected}")]
    RaggedRow {
        /// Zero-based index of the offending row.
        row_index: usize,
        /// Cells found in that row.
        found: usize,
        /// Cells expected, taken from the first row.
        expected: usize,
    },
    /// A cell character outside `{_, X, O, |}`.
    #[error("invalid cell character: '{character}'")]
    InvalidCell {
        /// The offending character.
        character: char,
    },
    /// The parsed position fails validation.
    #[error("invalid position: {source}")]
    InvalidPosition {
        /// The underlying board error.
        #[from]
        source: BoardError,
    },
}
