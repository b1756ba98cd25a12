//! Defensive-move lookup: which defender stones refute a line threat.
//!
//! Works on *extended* lines of 13 cells (center plus six to each side),
//! one cell wider than the classification window on each end so that the
//! flanks of every five window through the center are visible; the caro
//! rules need those flanks to tell a live five from a dead one. For an
//! extended line centered on an attacker's threat square, the table
//! answers which cells, when taken by the defender, stop the attacker
//! from forcing a five through that line. Results come from an
//! exhaustive shallow search (defender move, then up to three
//! alternating plies) and are memoized per rule in a concurrent map, so
//! repeated queries from the move generators are plain lookups.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use lazy_static::lazy_static;
use sente_core::{GameRules, Sign};

/// Half-length of the extended window.
pub const EXT_PAD: usize = 6;

/// Number of cells in an extended line.
pub const EXT_LEN: usize = 2 * EXT_PAD + 1;

/// A raw extended line, 2 bits per cell, cell [`EXT_PAD`] the center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtPattern(pub u32);

impl ExtPattern {
    #[inline]
    pub fn get(self, index: usize) -> Sign {
        debug_assert!(index < EXT_LEN);
        Sign::from_bits(self.0 >> (2 * index))
    }

    #[inline]
    #[must_use]
    pub fn with(self, index: usize, sign: Sign) -> ExtPattern {
        debug_assert!(index < EXT_LEN);
        let cleared = self.0 & !(3 << (2 * index));
        ExtPattern(cleared | (sign.bits() << (2 * index)))
    }

    /// Parse from text of exactly [`EXT_LEN`] cells. Test helper.
    pub fn from_text(text: &str) -> ExtPattern {
        assert_eq!(text.chars().count(), EXT_LEN);
        let mut result = ExtPattern(0);
        for (i, c) in text.chars().enumerate() {
            result = result.with(i, Sign::from_char(c).expect("bad pattern character"));
        }
        result
    }
}

/// Bitmask over the 13 extended-line positions; bit `i` marks a
/// defensive cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DefensiveBits(pub u16);

impl DefensiveBits {
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn get(self, index: usize) -> bool {
        (self.0 >> index) & 1 != 0
    }

    #[inline]
    fn set(&mut self, index: usize) {
        self.0 |= 1 << index;
    }

    /// Iterate over set positions as offsets from the line center,
    /// in `-EXT_PAD..=EXT_PAD`.
    pub fn offsets(self) -> impl Iterator<Item = i32> {
        (0..EXT_LEN as i32).filter(move |i| (self.0 >> i) & 1 != 0).map(|i| i - EXT_PAD as i32)
    }

    /// Keep only positions present in both masks.
    #[inline]
    #[must_use]
    pub fn intersect(self, other: DefensiveBits) -> DefensiveBits {
        DefensiveBits(self.0 & other.0)
    }
}

/// Alternating plies granted to the attacker after the defender's move.
const SEARCH_DEPTH: u32 = 3;

/// Rule-dependent defensive-move table with a concurrent memo cache.
pub struct DefensiveMoveTable {
    rules: GameRules,
    cache: DashMap<u64, u16>,
}

impl DefensiveMoveTable {
    fn new(rules: GameRules) -> DefensiveMoveTable {
        DefensiveMoveTable { rules, cache: DashMap::new() }
    }

    /// The shared table for the given rules.
    pub fn get(rules: GameRules) -> Arc<DefensiveMoveTable> {
        lazy_static! {
            static ref REGISTRY: Mutex<HashMap<GameRules, Arc<DefensiveMoveTable>>> =
                Mutex::new(HashMap::new());
        }
        let mut registry = REGISTRY.lock().expect("defensive table registry poisoned");
        registry
            .entry(rules)
            .or_insert_with(|| Arc::new(DefensiveMoveTable::new(rules)))
            .clone()
    }

    /// Cells that refute the attacker's five threat through this line.
    ///
    /// Returns the empty mask when the attacker cannot force a five here
    /// at all (nothing to defend) or when no single cell stops it.
    pub fn lookup(&self, line: ExtPattern, defender: Sign) -> DefensiveBits {
        debug_assert!(defender == Sign::Cross || defender == Sign::Circle);
        let key = (line.0 as u64) | ((defender.index() as u64) << (2 * EXT_LEN));
        if let Some(cached) = self.cache.get(&key) {
            return DefensiveBits(*cached);
        }
        let result = self.compute(line, defender);
        self.cache.insert(key, result.0);
        result
    }

    fn compute(&self, line: ExtPattern, defender: Sign) -> DefensiveBits {
        let attacker = defender.invert();
        let mut result = DefensiveBits::default();

        if has_five(self.rules, line, attacker) {
            // already a five, nothing left to defend
            return result;
        }
        if !self.attacker_forces_five(line, attacker, true, SEARCH_DEPTH) {
            // no forcible threat in this line
            return result;
        }

        for i in 0..EXT_LEN {
            if line.get(i) != Sign::None {
                continue;
            }
            let defended = line.with(i, defender);
            if !self.attacker_forces_five(defended, attacker, true, SEARCH_DEPTH) {
                result.set(i);
            }
        }
        result
    }

    /// Whether the attacker can force a five within `depth` alternating
    /// plies, both players restricted to this line.
    fn attacker_forces_five(
        &self,
        line: ExtPattern,
        attacker: Sign,
        attacker_to_move: bool,
        depth: u32,
    ) -> bool {
        if depth == 0 {
            return false;
        }
        if attacker_to_move {
            for i in 0..EXT_LEN {
                if line.get(i) != Sign::None {
                    continue;
                }
                let next = line.with(i, attacker);
                if has_five(self.rules, next, attacker)
                    || self.attacker_forces_five(next, attacker, false, depth - 1)
                {
                    return true;
                }
            }
            false
        } else {
            let defender = attacker.invert();
            for i in 0..EXT_LEN {
                if line.get(i) != Sign::None {
                    continue;
                }
                let next = line.with(i, defender);
                if !self.attacker_forces_five(next, attacker, true, depth - 1) {
                    return false; // this reply holds
                }
            }
            // no reply stops the attacker (or no empty cell remains)
            true
        }
    }
}

/// Rule-aware five detection within the extended window.
///
/// Cells beyond the window are unknown and treated as empty, which errs
/// toward treating edge threats as live.
fn has_five(rules: GameRules, line: ExtPattern, attacker: Sign) -> bool {
    let defender = attacker.invert();
    'windows: for start in 0..=(EXT_LEN - 5) {
        for i in start..start + 5 {
            if line.get(i) != attacker {
                continue 'windows;
            }
        }
        let front = if start + 5 < EXT_LEN { line.get(start + 5) } else { Sign::None };
        let back = if start > 0 { line.get(start - 1) } else { Sign::None };

        if !rules.overline_wins(attacker) && (front == attacker || back == attacker) {
            continue; // exact five required
        }
        if !rules.blocked_five_wins() && front == defender && back == defender {
            continue; // dead five under caro rules
        }
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_threat_is_blocked_on_the_gap() {
        // cross threatens OXXXX*; the single completion square defends
        let table = DefensiveMoveTable::get(GameRules::Standard);
        let line = ExtPattern::from_text("_OXXXX_______");
        let bits = table.lookup(line, Sign::Circle);
        assert!(bits.get(EXT_PAD), "occupying the completion square must defend");
        assert!(!bits.get(9), "an unrelated cell defends nothing");
    }

    #[test]
    fn open_four_has_no_single_refutation() {
        let table = DefensiveMoveTable::get(GameRules::Standard);
        let line = ExtPattern::from_text("__XXXX_______");
        assert!(table.lookup(line, Sign::Circle).is_empty());
    }

    #[test]
    fn no_threat_means_no_defensive_moves() {
        let table = DefensiveMoveTable::get(GameRules::Standard);
        let line = ExtPattern::from_text("____X________");
        assert!(table.lookup(line, Sign::Circle).is_empty());
    }

    #[test]
    fn gap_fill_defends_a_broken_four() {
        // X X . X X around the center: the inner gap is the only block
        let table = DefensiveMoveTable::get(GameRules::Standard);
        let line = ExtPattern::from_text("__XX_X_______");
        let bits = table.lookup(line, Sign::Circle);
        assert!(bits.get(4), "filling the inner gap defends");
    }

    #[test]
    fn caro_flank_block_defends() {
        // OXXXX* with the far flank open: in caro5 a circle stone on
        // that flank kills the five because both ends become blocked
        let table = DefensiveMoveTable::get(GameRules::Caro5);
        let line = ExtPattern::from_text("_OXXXX_______");
        let bits = table.lookup(line, Sign::Circle);
        assert!(bits.get(EXT_PAD), "occupying the completion square defends");
        assert!(bits.get(EXT_PAD + 1), "blocking the second flank defends");
    }

    #[test]
    fn freestyle_flank_block_does_not_defend() {
        let table = DefensiveMoveTable::get(GameRules::Freestyle);
        let line = ExtPattern::from_text("_OXXXX_______");
        let bits = table.lookup(line, Sign::Circle);
        assert!(bits.get(EXT_PAD));
        assert!(!bits.get(EXT_PAD + 1), "a flank stone does not stop the five");
    }

    #[test]
    fn caro_single_stone_refutes_two_fives() {
        // the classic !_XXXX_O shape: cross can complete a five on either
        // side of the four, but one circle stone at the open flank kills
        // both at once by leaving every five blocked on both ends
        let table = DefensiveMoveTable::get(GameRules::Caro5);
        let line = ExtPattern::from_text("_______XXXX_O");
        let bits = table.lookup(line, Sign::Circle);
        assert!(bits.get(EXT_PAD), "the open flank is the common defense");
        assert!(!bits.get(11), "occupying one completion square is not enough");
    }

    #[test]
    fn results_are_memoized() {
        let table = DefensiveMoveTable::get(GameRules::Standard);
        let line = ExtPattern::from_text("_OXXXX_______");
        let first = table.lookup(line, Sign::Circle);
        let second = table.lookup(line, Sign::Circle);
        assert_eq!(first, second);
    }
}
