//! Precomputed classification of all raw line values.
//!
//! One entry per possible 11-cell line: the pattern type each side would
//! get by playing the center stone, plus a 10-bit update mask naming the
//! non-center cells whose change can alter either side's classification.
//! Tables are built once per rule behind an initialization guard and
//! shared read-only across threads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use sente_core::{GameRules, Sign};
use tracing::debug;

use crate::patterns::matcher::LineClassifier;
use crate::patterns::pattern::{LINE_LEN, NUM_PATTERNS, PAD, PatternType, RawPattern};

/// Packed table entry.
///
/// Bits `[0..3]` pattern type for cross, `[3..6]` for circle,
/// `[6..16]` the update mask over the 10 non-center cells (front half
/// shifted down by one so the center is skipped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatternEncoding(u16);

impl PatternEncoding {
    fn new(for_cross: PatternType, for_circle: PatternType) -> PatternEncoding {
        PatternEncoding((for_cross as u16) | ((for_circle as u16) << 3))
    }

    /// Pattern type if the given side plays the center stone.
    #[inline]
    pub fn for_sign(self, sign: Sign) -> PatternType {
        match sign {
            Sign::Cross => self.for_cross(),
            _ => self.for_circle(),
        }
    }

    #[inline]
    pub fn for_cross(self) -> PatternType {
        PatternType::from_bits(self.0 as u32)
    }

    #[inline]
    pub fn for_circle(self) -> PatternType {
        PatternType::from_bits((self.0 >> 3) as u32)
    }

    /// Whether the neighbor at line index `spot` (0..11, center excluded)
    /// must be reclassified after the center cell changes.
    #[inline]
    pub fn must_be_updated(self, spot: usize) -> bool {
        debug_assert!(spot < LINE_LEN && spot != PAD);
        let bit = spot - usize::from(spot > PAD);
        (self.0 >> (6 + bit)) & 1 != 0
    }

    fn set_update_bit(&mut self, bit: usize, value: bool) {
        debug_assert!(bit < LINE_LEN - 1);
        if value {
            self.0 |= 1 << (6 + bit);
        } else {
            self.0 &= !(1 << (6 + bit));
        }
    }

    /// Same classification, update mask reversed end-to-end.
    fn flip_mask(self) -> PatternEncoding {
        let mut result = PatternEncoding(self.0 & 0x3F);
        for bit in 0..LINE_LEN - 1 {
            result.set_update_bit(bit, (self.0 >> (6 + (LINE_LEN - 2 - bit))) & 1 != 0);
        }
        result
    }
}

/// Classification table for one rule variant, ~8 MiB.
pub struct PatternTable {
    rules: GameRules,
    entries: Vec<u16>,
}

impl PatternTable {
    /// Build the full table by enumerating all raw line values.
    ///
    /// Line reversal symmetry halves the work: a line and its flip share
    /// a classification, and their update masks are mirror images.
    fn new(rules: GameRules) -> PatternTable {
        let start = std::time::Instant::now();
        let mut table = PatternTable { rules, entries: vec![0u16; NUM_PATTERNS] };
        table.init_classification();
        table.init_update_masks();
        debug!(rule = %rules, elapsed = ?start.elapsed(), "pattern table built");
        table
    }

    /// The shared table for the given rules, built on first use.
    pub fn get(rules: GameRules) -> Arc<PatternTable> {
        lazy_static! {
            static ref REGISTRY: Mutex<HashMap<GameRules, Arc<PatternTable>>> =
                Mutex::new(HashMap::new());
        }
        let mut registry = REGISTRY.lock().expect("pattern table registry poisoned");
        registry
            .entry(rules)
            .or_insert_with(|| Arc::new(PatternTable::new(rules)))
            .clone()
    }

    #[inline]
    pub fn rules(&self) -> GameRules {
        self.rules
    }

    /// Look up the entry for a raw line value.
    #[inline]
    pub fn lookup(&self, raw: RawPattern) -> PatternEncoding {
        PatternEncoding(self.entries[(raw.0 as usize) & (NUM_PATTERNS - 1)])
    }

    fn init_classification(&mut self) {
        let for_cross = LineClassifier::new(self.rules, Sign::Cross);
        let for_circle = LineClassifier::new(self.rules, Sign::Circle);
        let mut processed = vec![false; NUM_PATTERNS];

        for i in 0..NUM_PATTERNS as u32 {
            if processed[i as usize] {
                continue;
            }
            let line = RawPattern(i);
            if !line.is_valid() {
                continue;
            }
            let cross_type = for_cross.classify(line.with(PAD, Sign::Cross));
            let circle_type = for_circle.classify(line.with(PAD, Sign::Circle));
            let encoding = PatternEncoding::new(cross_type, circle_type);

            self.entries[i as usize] = encoding.0;
            processed[i as usize] = true;
            // classification is symmetric under line reversal
            let flipped = line.flip();
            self.entries[flipped.0 as usize] = encoding.0;
            processed[flipped.0 as usize] = true;
        }
    }

    fn init_update_masks(&mut self) {
        let mut processed = vec![false; NUM_PATTERNS];

        for i in 0..NUM_PATTERNS as u32 {
            if processed[i as usize] {
                continue;
            }
            let line = RawPattern(i);
            if !line.is_valid() {
                continue;
            }

            let mut encoding = PatternEncoding(self.entries[i as usize]);
            for spot in 0..LINE_LEN {
                if spot == PAD {
                    continue;
                }
                let bit = spot - usize::from(spot > PAD);
                encoding.set_update_bit(bit, self.spot_is_relevant(line, spot));
            }

            self.entries[i as usize] = encoding.0;
            processed[i as usize] = true;
            let flipped = line.flip();
            self.entries[flipped.0 as usize] = encoding.flip_mask().0;
            processed[flipped.0 as usize] = true;
        }
    }

    /// Decide whether a stone landing at the center can change the
    /// classification of the neighbor at line index `spot`.
    ///
    /// The neighbor's own window extends `d = |spot - PAD|` cells past
    /// this line, so every content of those unknown cells is tried; the
    /// mask bit is set if any of them lets the center toggle flip the
    /// neighbor's classification. For the far spots the enumeration gets
    /// large, so beyond distance three the bit is set conservatively;
    /// the mask promises "might change", never "will change".
    fn spot_is_relevant(&self, line: RawPattern, spot: usize) -> bool {
        if line.get(spot) != Sign::None {
            // the neighbor square itself is occupied, nothing to reclassify
            return false;
        }
        let free_spots = PAD.abs_diff(spot);
        if free_spots > 3 {
            return true;
        }
        let combinations = 1u32 << (2 * free_spots);

        // shift so the neighbor becomes the center of the window
        let shifted = if spot < PAD {
            shift_toward_front(line, free_spots)
        } else {
            shift_toward_back(line, free_spots)
        };
        // after shifting, the original center sits mirrored across the window
        let toggled_spot = LINE_LEN - 1 - spot;

        for combo in 0..combinations {
            let merged = if spot > PAD {
                RawPattern(shifted.0 | (combo << (2 * (LINE_LEN - free_spots))))
            } else {
                RawPattern(shifted.0 | combo)
            };
            if !merged.is_valid() {
                continue;
            }
            let original = PatternEncoding(self.entries[merged.0 as usize]);
            let with_cross = merged.with(toggled_spot, Sign::Cross);
            let with_circle = merged.with(toggled_spot, Sign::Circle);
            let cross_altered = PatternEncoding(self.entries[with_cross.0 as usize]);
            let circle_altered = PatternEncoding(self.entries[with_circle.0 as usize]);

            if (original.0 & 0x3F) != (cross_altered.0 & 0x3F)
                || (original.0 & 0x3F) != (circle_altered.0 & 0x3F)
            {
                return true;
            }
        }
        false
    }
}

/// Drop `n` cells from the back end, leaving unknowns at the front.
fn shift_toward_front(line: RawPattern, n: usize) -> RawPattern {
    RawPattern((line.0 << (2 * n)) & ((1 << (2 * LINE_LEN)) - 1))
}

/// Drop `n` cells from the front end, leaving unknowns at the back.
fn shift_toward_back(line: RawPattern, n: usize) -> RawPattern {
    RawPattern(line.0 >> (2 * n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_direct_classifier() {
        let table = PatternTable::get(GameRules::Standard);
        let for_cross = LineClassifier::new(GameRules::Standard, Sign::Cross);

        for text in ["__XXX______", "_OOO_______", "X_X_X_X_X_X", "||________O"] {
            let line = RawPattern::from_text(text);
            let encoding = table.lookup(line);
            assert_eq!(
                encoding.for_cross(),
                for_cross.classify(line.with(PAD, Sign::Cross)),
                "mismatch for {text}"
            );
        }
    }

    #[test]
    fn five_completion_is_marked() {
        let table = PatternTable::get(GameRules::Standard);
        let line = RawPattern::from_text("_XXXX______");
        assert_eq!(table.lookup(line).for_cross(), PatternType::Five);
        assert_eq!(table.lookup(line).for_circle(), PatternType::None);
    }

    #[test]
    fn update_mask_covers_nearby_stones() {
        let table = PatternTable::get(GameRules::Standard);
        // a lone stone next to the center: toggling the adjacent empties
        // can certainly change classifications
        let line = RawPattern::from_text("____X______");
        let encoding = table.lookup(line);
        assert!(encoding.must_be_updated(3));
        assert!(encoding.must_be_updated(6));
    }

    #[test]
    fn update_mask_flips_with_line() {
        let table = PatternTable::get(GameRules::Standard);
        let line = RawPattern::from_text("_XX________");
        let flipped = line.flip();
        let enc = table.lookup(line);
        let enc_flipped = table.lookup(flipped);
        for spot in 0..LINE_LEN {
            if spot == PAD {
                continue;
            }
            assert_eq!(
                enc.must_be_updated(spot),
                enc_flipped.must_be_updated(LINE_LEN - 1 - spot),
                "asymmetric mask at spot {spot}"
            );
        }
    }
}
