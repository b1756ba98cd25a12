//! Zobrist hashing keys for position deduplication.
//!
//! One random 64-bit constant per `(cell, sign)` pair plus one constant
//! for the side to move, XOR-accumulated. Adding or removing a stone is a
//! single XOR with the square's constant.

use crate::board::Board;
use crate::mov::Move;
use crate::sign::Sign;

/// Largest supported board, 32x32.
const MAX_CELLS: usize = 1024;

/// Zobrist key for each (sign, cell) pair. Indexed by
/// `[Sign::index()][row * cols + col]`.
static STONE_KEYS: [[u64; MAX_CELLS]; 2] = {
    let mut table = [[0u64; MAX_CELLS]; 2];
    let mut state = SEED;
    let mut sign = 0;
    while sign < 2 {
        let mut cell = 0;
        while cell < MAX_CELLS {
            let (val, next) = xorshift64(state);
            table[sign][cell] = val;
            state = next;
            cell += 1;
        }
        sign += 1;
    }
    table
};

/// Key XORed into the hash when circle is the side to move.
static SIDE_TO_MOVE: u64 = {
    // State continues from STONE_KEYS generation
    let mut state = SEED;
    let mut i = 0;
    while i < 2 * MAX_CELLS {
        let (_, next) = xorshift64(state);
        state = next;
        i += 1;
    }
    let (val, _) = xorshift64(state);
    val
};

const SEED: u64 = 0x5345_4e54_4531_3233; // "SENTE123"

/// Xorshift64 PRNG. Returns (value, next_state).
const fn xorshift64(mut state: u64) -> (u64, u64) {
    state ^= state << 13;
    state ^= state >> 7;
    state ^= state << 17;
    (state, state)
}

/// Key for a single stone on a board `cols` columns wide.
#[inline]
pub fn stone_key(cols: usize, mv: Move) -> u64 {
    STONE_KEYS[mv.sign.index()][mv.row as usize * cols + mv.col as usize]
}

/// Compute a hash from scratch for the given board and side to move.
pub fn hash_board(board: &Board, side_to_move: Sign) -> u64 {
    let mut hash = 0u64;
    for row in 0..board.rows() as u8 {
        for col in 0..board.cols() as u8 {
            let sign = board.at(row, col);
            if sign == Sign::Cross || sign == Sign::Circle {
                hash ^= stone_key(board.cols(), Move::new(row, col, sign));
            }
        }
    }
    if side_to_move == Sign::Circle {
        hash ^= SIDE_TO_MOVE;
    }
    hash
}

/// Toggle one move in the hash, flipping the side to move as well.
///
/// Self-inverse, so the same call undoes a move.
#[inline]
pub fn update_move(hash: u64, cols: usize, mv: Move) -> u64 {
    hash ^ stone_key(cols, mv) ^ SIDE_TO_MOVE
}
