//! Incremental per-square pattern and threat state, kept in sync with
//! board edits.
//!
//! The calculator owns a padded copy of the board (a ring of `Illegal`
//! cells of width [`PAD`] so neighborhood reads never branch on bounds),
//! the raw 11-cell lines through every square, the classified pattern and
//! threat types for both sides, and the two threat histograms. A Zobrist
//! hash is maintained as a side output.

use std::sync::Arc;

use sente_core::{Board, BoardError, GameConfig, Move, Sign, zobrist};

use crate::patterns::defensive::{DefensiveBits, DefensiveMoveTable, EXT_LEN, EXT_PAD, ExtPattern};
use crate::patterns::pattern::{Direction, DirectionGroup, LINE_LEN, PAD, PatternType, RawPattern};
use crate::patterns::pattern_table::{PatternEncoding, PatternTable};
use crate::patterns::threat_table::{ThreatEncoding, ThreatTable, ThreatType};

/// Ordered sets of empty squares bucketed by threat type, one per side.
#[derive(Debug, Clone, Default)]
pub struct ThreatHistogram {
    buckets: [Vec<Move>; ThreatType::COUNT],
}

impl ThreatHistogram {
    /// Squares currently carrying the given threat, in insertion order.
    #[inline]
    pub fn get(&self, threat: ThreatType) -> &[Move] {
        &self.buckets[threat as usize]
    }

    /// Whether any four-class threat exists.
    pub fn has_any_four(&self) -> bool {
        !self.buckets[ThreatType::HalfOpen4 as usize].is_empty()
            || !self.buckets[ThreatType::Fork4x3 as usize].is_empty()
            || !self.buckets[ThreatType::Fork4x4 as usize].is_empty()
            || !self.buckets[ThreatType::Open4 as usize].is_empty()
    }

    fn add(&mut self, threat: ThreatType, location: Move) {
        if threat != ThreatType::None {
            self.buckets[threat as usize].push(location);
        }
    }

    fn remove(&mut self, threat: ThreatType, location: Move) {
        if threat != ThreatType::None {
            let bucket = &mut self.buckets[threat as usize];
            if let Some(pos) = bucket.iter().position(|&m| m == location) {
                bucket.remove(pos);
            }
        }
    }

    fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}

/// A square whose threat classification changed during the last edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreatChange {
    pub location: Move,
    pub previous: ThreatEncoding,
    pub current: ThreatEncoding,
}

/// The stone change of the last edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveChange {
    pub location: Move,
    pub previous: Sign,
    pub current: Sign,
}

/// Incremental pattern and threat calculator.
pub struct PatternCalculator {
    config: GameConfig,
    pattern_table: Arc<PatternTable>,
    threat_table: Arc<ThreatTable>,
    defensive_table: Arc<DefensiveMoveTable>,

    padded_cols: usize,
    /// Padded board, `Illegal` ring of width [`PAD`].
    board: Vec<Sign>,
    /// Raw 11-cell lines per padded square, one per direction.
    raw_patterns: Vec<[u32; 4]>,
    /// Per playable square, per direction: the table encoding.
    pattern_types: Vec<[PatternEncoding; 4]>,
    /// Per playable square: threat levels for both sides.
    threat_types: Vec<ThreatEncoding>,
    histograms: [ThreatHistogram; 2],

    sign_to_move: Sign,
    depth: usize,
    hash: u64,

    /// Change set of the last `add_move`/`undo_move`, for NNUE updates.
    threat_changes: Vec<ThreatChange>,
    move_change: Option<MoveChange>,
    /// Encodings of the last edited square's four lines, read before the
    /// edit; their update masks drive the neighborhood pass.
    central_encodings: [PatternEncoding; 4],
}

impl PatternCalculator {
    pub fn new(config: GameConfig) -> PatternCalculator {
        let padded_rows = config.rows + 2 * PAD;
        let padded_cols = config.cols + 2 * PAD;
        PatternCalculator {
            config,
            pattern_table: PatternTable::get(config.rules),
            threat_table: ThreatTable::get(config.rules),
            defensive_table: DefensiveMoveTable::get(config.rules),
            padded_cols,
            board: vec![Sign::Illegal; padded_rows * padded_cols],
            raw_patterns: vec![[0u32; 4]; padded_rows * padded_cols],
            pattern_types: vec![[PatternEncoding::default(); 4]; config.size()],
            threat_types: vec![ThreatEncoding::default(); config.size()],
            histograms: [ThreatHistogram::default(), ThreatHistogram::default()],
            sign_to_move: Sign::Cross,
            depth: 0,
            hash: 0,
            threat_changes: Vec::with_capacity(64),
            move_change: None,
            central_encodings: [PatternEncoding::default(); 4],
        }
    }

    #[inline]
    pub fn config(&self) -> GameConfig {
        self.config
    }

    #[inline]
    pub fn sign_to_move(&self) -> Sign {
        self.sign_to_move
    }

    #[inline]
    pub fn current_depth(&self) -> usize {
        self.depth
    }

    /// The Zobrist key of the current position and side to move.
    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    #[inline]
    fn padded_index(&self, row: i32, col: i32) -> usize {
        ((row + PAD as i32) as usize) * self.padded_cols + (col + PAD as i32) as usize
    }

    #[inline]
    fn playable_index(&self, row: u8, col: u8) -> usize {
        row as usize * self.config.cols + col as usize
    }

    #[inline]
    pub fn sign_at(&self, row: u8, col: u8) -> Sign {
        self.board[self.padded_index(row as i32, col as i32)]
    }

    /// The raw line through `(row, col)` in the given direction.
    #[inline]
    pub fn raw_pattern_at(&self, row: u8, col: u8, dir: Direction) -> RawPattern {
        RawPattern(self.raw_patterns[self.padded_index(row as i32, col as i32)][dir.index()])
    }

    /// Pattern type for one side, one direction.
    #[inline]
    pub fn pattern_type_at(&self, sign: Sign, row: u8, col: u8, dir: Direction) -> PatternType {
        self.pattern_types[self.playable_index(row, col)][dir.index()].for_sign(sign)
    }

    /// Pattern types for one side in all four directions.
    pub fn pattern_group_at(&self, sign: Sign, row: u8, col: u8) -> DirectionGroup<PatternType> {
        let encodings = &self.pattern_types[self.playable_index(row, col)];
        [
            encodings[0].for_sign(sign),
            encodings[1].for_sign(sign),
            encodings[2].for_sign(sign),
            encodings[3].for_sign(sign),
        ]
    }

    /// Threat levels of a square for both sides.
    #[inline]
    pub fn threat_at(&self, row: u8, col: u8) -> ThreatEncoding {
        self.threat_types[self.playable_index(row, col)]
    }

    /// Threat level of a square for one side.
    #[inline]
    pub fn threat_for(&self, sign: Sign, row: u8, col: u8) -> ThreatType {
        self.threat_at(row, col).for_sign(sign)
    }

    /// The threat histogram of one side.
    #[inline]
    pub fn histogram(&self, sign: Sign) -> &ThreatHistogram {
        &self.histograms[sign.index()]
    }

    /// Change set of the last edit, for NNUE accumulator updates.
    pub fn threat_changes(&self) -> &[ThreatChange] {
        &self.threat_changes
    }

    /// Stone change of the last edit.
    pub fn move_change(&self) -> Option<MoveChange> {
        self.move_change
    }

    /// Defender squares refuting the attacker threat through
    /// `(row, col, dir)`, clipped to the board.
    pub fn defensive_moves(&self, defender: Sign, row: u8, col: u8, dir: Direction) -> Vec<Move> {
        let bits = self.defensive_bits(defender, row, col, dir);
        let mut result = Vec::with_capacity(4);
        for offset in bits.offsets() {
            let r = row as i32 + offset * dir.row_step();
            let c = col as i32 + offset * dir.col_step();
            if r >= 0 && c >= 0 && (r as usize) < self.config.rows && (c as usize) < self.config.cols
            {
                result.push(Move::location(r as u8, c as u8));
            }
        }
        result
    }

    /// Raw defensive bitmask over the extended line positions.
    pub fn defensive_bits(&self, defender: Sign, row: u8, col: u8, dir: Direction) -> DefensiveBits {
        self.defensive_table.lookup(self.ext_pattern_at(row, col, dir), defender)
    }

    /// The extended 13-cell line through `(row, col)`, read directly
    /// from the padded board; cells beyond the padding ring count as
    /// border.
    pub fn ext_pattern_at(&self, row: u8, col: u8, dir: Direction) -> ExtPattern {
        let mut line = 0u32;
        for k in 0..EXT_LEN as i32 {
            let r = row as i32 + (k - EXT_PAD as i32) * dir.row_step();
            let c = col as i32 + (k - EXT_PAD as i32) * dir.col_step();
            let sign = if r < -(PAD as i32)
                || c < -(PAD as i32)
                || r >= (self.config.rows + PAD) as i32
                || c >= (self.config.cols + PAD) as i32
            {
                Sign::Illegal
            } else {
                self.board[self.padded_index(r, c)]
            };
            line |= sign.bits() << (2 * k);
        }
        ExtPattern(line)
    }

    /// Reset all internal state from a board position.
    ///
    /// Reports setup errors before any internal mutation.
    pub fn set_board(&mut self, board: &Board, sign_to_move: Sign) -> Result<(), BoardError> {
        assert_eq!(board.rows(), self.config.rows);
        assert_eq!(board.cols(), self.config.cols);
        board.validate()?;

        self.board.fill(Sign::Illegal);
        for row in 0..self.config.rows as u8 {
            for col in 0..self.config.cols as u8 {
                let index = self.padded_index(row as i32, col as i32);
                self.board[index] = board.at(row, col);
            }
        }

        self.sign_to_move = sign_to_move;
        self.depth = board.move_count();
        self.hash = zobrist::hash_board(board, sign_to_move);
        self.threat_changes.clear();
        self.move_change = None;

        self.calculate_raw_patterns();
        self.classify_pattern_types();
        self.prepare_threat_lists();
        Ok(())
    }

    /// Place a stone and update patterns, threats, histograms, and hash.
    ///
    /// The square must be empty and the sign a stone color.
    pub fn add_move(&mut self, mv: Move) {
        assert!(mv.sign == Sign::Cross || mv.sign == Sign::Circle);
        assert_eq!(self.sign_at(mv.row, mv.col), Sign::None, "move on an occupied square");

        self.threat_changes.clear();
        self.move_change =
            Some(MoveChange { location: mv, previous: Sign::None, current: mv.sign });

        self.update_central_spot(mv, true);

        let index = self.padded_index(mv.row as i32, mv.col as i32);
        self.board[index] = mv.sign;
        self.apply_raw_update(mv, true);

        self.update_neighborhood(mv.row, mv.col);

        self.hash = zobrist::update_move(self.hash, self.config.cols, mv);
        self.sign_to_move = self.sign_to_move.invert();
        self.depth += 1;
    }

    /// Remove a stone previously placed by `mv`, restoring all state.
    pub fn undo_move(&mut self, mv: Move) {
        assert_eq!(self.sign_at(mv.row, mv.col), mv.sign, "undo of a move that is not there");

        self.threat_changes.clear();
        self.move_change =
            Some(MoveChange { location: mv, previous: mv.sign, current: Sign::None });

        let index = self.padded_index(mv.row as i32, mv.col as i32);
        self.board[index] = Sign::None;
        self.apply_raw_update(mv, false);

        self.update_central_spot(mv, false);
        self.update_neighborhood(mv.row, mv.col);

        self.hash = zobrist::update_move(self.hash, self.config.cols, mv);
        self.sign_to_move = self.sign_to_move.invert();
        self.depth -= 1;
    }

    /// Renju forbidden-move check for cross: overlines, 4x4 forks, and
    /// 3x3 forks whose open threes genuinely promote to straight fours.
    ///
    /// Recursive: a three only counts when some promotion square is
    /// itself playable and not forbidden.
    pub fn is_forbidden(&mut self, sign: Sign, row: u8, col: u8) -> bool {
        if !self.config.rules.has_forbidden_moves(sign) {
            return false;
        }
        if self.sign_at(row, col) != Sign::None {
            // occupied squares are illegal, not forbidden
            return false;
        }
        match self.threat_for(Sign::Cross, row, col) {
            ThreatType::Overline | ThreatType::Fork4x4 => true,
            ThreatType::Fork3x3 => {
                let dirs: Vec<Direction> = Direction::ALL
                    .into_iter()
                    .filter(|&dir| {
                        self.pattern_type_at(Sign::Cross, row, col, dir) == PatternType::Open3
                    })
                    .collect();

                let mv = Move::new(row, col, Sign::Cross);
                self.add_move(mv);
                let mut real_threes = 0;
                for dir in dirs {
                    if self.has_real_straight_four(row, col, dir) {
                        real_threes += 1;
                        if real_threes >= 2 {
                            break;
                        }
                    }
                }
                self.undo_move(mv);
                real_threes >= 2
            }
            _ => false,
        }
    }

    /// After the fork stone is placed, look along `dir` for an empty
    /// square that would complete a straight four and is not itself
    /// forbidden.
    fn has_real_straight_four(&mut self, row: u8, col: u8, dir: Direction) -> bool {
        for offset in -(PAD as i32)..=(PAD as i32) {
            if offset == 0 {
                continue;
            }
            let r = row as i32 + offset * dir.row_step();
            let c = col as i32 + offset * dir.col_step();
            if r < 0 || c < 0 || r as usize >= self.config.rows || c as usize >= self.config.cols {
                continue;
            }
            let (r, c) = (r as u8, c as u8);
            if self.sign_at(r, c) != Sign::None {
                continue;
            }
            if self.pattern_type_at(Sign::Cross, r, c, dir) == PatternType::Open4
                && !self.is_forbidden(Sign::Cross, r, c)
            {
                return true;
            }
        }
        false
    }

    fn calculate_raw_patterns(&mut self) {
        for row in 0..self.config.rows as i32 {
            for col in 0..self.config.cols as i32 {
                let mut lines = [0u32; 4];
                for dir in Direction::ALL {
                    let mut line = 0u32;
                    for k in 0..LINE_LEN as i32 {
                        let r = row + (k - PAD as i32) * dir.row_step();
                        let c = col + (k - PAD as i32) * dir.col_step();
                        let sign = if r < -(PAD as i32)
                            || c < -(PAD as i32)
                            || r >= (self.config.rows + PAD) as i32
                            || c >= (self.config.cols + PAD) as i32
                        {
                            Sign::Illegal
                        } else {
                            self.board[self.padded_index(r, c)]
                        };
                        line |= sign.bits() << (2 * k);
                    }
                    lines[dir.index()] = line;
                }
                let index = self.padded_index(row, col);
                self.raw_patterns[index] = lines;
            }
        }
    }

    fn classify_pattern_types(&mut self) {
        for row in 0..self.config.rows as u8 {
            for col in 0..self.config.cols as u8 {
                let playable = self.playable_index(row, col);
                if self.sign_at(row, col) == Sign::None {
                    for dir in Direction::ALL {
                        let raw = self.raw_pattern_at(row, col, dir);
                        self.pattern_types[playable][dir.index()] = self.pattern_table.lookup(raw);
                    }
                } else {
                    self.pattern_types[playable] = [PatternEncoding::default(); 4];
                }
            }
        }
    }

    fn prepare_threat_lists(&mut self) {
        self.histograms[0].clear();
        self.histograms[1].clear();
        for row in 0..self.config.rows as u8 {
            for col in 0..self.config.cols as u8 {
                let playable = self.playable_index(row, col);
                if self.sign_at(row, col) == Sign::None {
                    let threat = self.threat_from_encodings(playable);
                    self.threat_types[playable] = threat;
                    let location = Move::location(row, col);
                    self.histograms[0].add(threat.for_cross(), location);
                    self.histograms[1].add(threat.for_circle(), location);
                } else {
                    self.threat_types[playable] = ThreatEncoding::default();
                }
            }
        }
    }

    fn threat_from_encodings(&self, playable: usize) -> ThreatEncoding {
        let encodings = &self.pattern_types[playable];
        let cross = [
            encodings[0].for_cross(),
            encodings[1].for_cross(),
            encodings[2].for_cross(),
            encodings[3].for_cross(),
        ];
        let circle = [
            encodings[0].for_circle(),
            encodings[1].for_circle(),
            encodings[2].for_circle(),
            encodings[3].for_circle(),
        ];
        self.threat_table.lookup(&cross, &circle)
    }

    /// XOR the moved stone into (or out of) the raw lines of the
    /// `2 * PAD + 1` squares along each direction.
    fn apply_raw_update(&mut self, mv: Move, place: bool) {
        let (row, col) = (mv.row as i32, mv.col as i32);
        for i in -(PAD as i32)..=(PAD as i32) {
            let shift = 2 * (PAD as i32 - i) as u32;
            let targets = [
                (row, col + i, Direction::Horizontal),
                (row + i, col, Direction::Vertical),
                (row + i, col + i, Direction::Diagonal),
                (row + i, col - i, Direction::Antidiagonal),
            ];
            for (r, c, dir) in targets {
                let index = self.padded_index(r, c);
                if place {
                    self.raw_patterns[index][dir.index()] |= mv.sign.bits() << shift;
                } else {
                    self.raw_patterns[index][dir.index()] &= !(3u32 << shift);
                }
            }
        }
    }

    /// The edited square itself: cache its line encodings (whose update
    /// masks steer the neighborhood pass) and swap its own threat state.
    fn update_central_spot(&mut self, mv: Move, placed: bool) {
        let playable = self.playable_index(mv.row, mv.col);
        for dir in Direction::ALL {
            self.central_encodings[dir.index()] =
                self.pattern_table.lookup(self.raw_pattern_at(mv.row, mv.col, dir));
        }
        let location = Move::location(mv.row, mv.col);

        if placed {
            let old_threat = self.threat_types[playable];
            self.histograms[0].remove(old_threat.for_cross(), location);
            self.histograms[1].remove(old_threat.for_circle(), location);

            self.pattern_types[playable] = [PatternEncoding::default(); 4];
            self.threat_types[playable] = ThreatEncoding::default();
            if old_threat != ThreatEncoding::default() {
                self.threat_changes.push(ThreatChange {
                    location,
                    previous: old_threat,
                    current: ThreatEncoding::default(),
                });
            }
        } else {
            self.pattern_types[playable] = self.central_encodings;
            let new_threat = self.threat_from_encodings(playable);
            self.threat_types[playable] = new_threat;
            self.histograms[0].add(new_threat.for_cross(), location);
            self.histograms[1].add(new_threat.for_circle(), location);
            if new_threat != ThreatEncoding::default() {
                self.threat_changes.push(ThreatChange {
                    location,
                    previous: ThreatEncoding::default(),
                    current: new_threat,
                });
            }
        }
    }

    /// Re-classify the squares flagged by the central update masks.
    ///
    /// Mask bits are false for occupied and border cells, so every
    /// flagged square is an empty playable one.
    fn update_neighborhood(&mut self, row: u8, col: u8) {
        for i in -(PAD as i32)..=(PAD as i32) {
            if i == 0 {
                continue;
            }
            let spot = (PAD as i32 + i) as usize;
            let (row, col) = (row as i32, col as i32);
            if self.central_encodings[Direction::Horizontal.index()].must_be_updated(spot) {
                self.reclassify(row, col + i, Direction::Horizontal);
            }
            if self.central_encodings[Direction::Vertical.index()].must_be_updated(spot) {
                self.reclassify(row + i, col, Direction::Vertical);
            }
            if self.central_encodings[Direction::Diagonal.index()].must_be_updated(spot) {
                self.reclassify(row + i, col + i, Direction::Diagonal);
            }
            if self.central_encodings[Direction::Antidiagonal.index()].must_be_updated(spot) {
                self.reclassify(row + i, col - i, Direction::Antidiagonal);
            }
        }
    }

    fn reclassify(&mut self, row: i32, col: i32, dir: Direction) {
        debug_assert!(
            row >= 0 && col >= 0 && (row as usize) < self.config.rows && (col as usize) < self.config.cols
        );
        let (row, col) = (row as u8, col as u8);
        let playable = self.playable_index(row, col);

        let encoding = self.pattern_table.lookup(self.raw_pattern_at(row, col, dir));
        self.pattern_types[playable][dir.index()] = encoding;

        let old_threat = self.threat_types[playable];
        let new_threat = self.threat_from_encodings(playable);
        self.threat_types[playable] = new_threat;

        let location = Move::location(row, col);
        if old_threat.for_cross() != new_threat.for_cross() {
            self.histograms[0].remove(old_threat.for_cross(), location);
            self.histograms[0].add(new_threat.for_cross(), location);
        }
        if old_threat.for_circle() != new_threat.for_circle() {
            self.histograms[1].remove(old_threat.for_circle(), location);
            self.histograms[1].add(new_threat.for_circle(), location);
        }
        if old_threat != new_threat {
            self.threat_changes.push(ThreatChange {
                location,
                previous: old_threat,
                current: new_threat,
            });
        }
    }
}
