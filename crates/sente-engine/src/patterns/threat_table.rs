//! Threat classification: from four per-direction pattern types to a
//! single threat level per square.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use sente_core::{GameRules, Sign};

use crate::patterns::pattern::{DirectionGroup, PatternType};

/// Threat carried by an empty square for one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum ThreatType {
    #[default]
    None = 0,
    HalfOpen3 = 1,
    Open3 = 2,
    /// Two open threes through one square.
    Fork3x3 = 3,
    HalfOpen4 = 4,
    /// A four and an open three through one square.
    Fork4x3 = 5,
    /// Two fours through one square.
    Fork4x4 = 6,
    Open4 = 7,
    Five = 8,
    Overline = 9,
}

impl ThreatType {
    /// Number of threat levels.
    pub const COUNT: usize = 10;

    /// All threat levels, weakest first.
    pub const ALL: [ThreatType; 10] = [
        ThreatType::None,
        ThreatType::HalfOpen3,
        ThreatType::Open3,
        ThreatType::Fork3x3,
        ThreatType::HalfOpen4,
        ThreatType::Fork4x3,
        ThreatType::Fork4x4,
        ThreatType::Open4,
        ThreatType::Five,
        ThreatType::Overline,
    ];

    #[inline]
    pub const fn from_bits(bits: u32) -> ThreatType {
        match bits {
            1 => ThreatType::HalfOpen3,
            2 => ThreatType::Open3,
            3 => ThreatType::Fork3x3,
            4 => ThreatType::HalfOpen4,
            5 => ThreatType::Fork4x3,
            6 => ThreatType::Fork4x4,
            7 => ThreatType::Open4,
            8 => ThreatType::Five,
            9 => ThreatType::Overline,
            _ => ThreatType::None,
        }
    }

    /// Whether this threat contains a four.
    #[inline]
    pub fn is_four(self) -> bool {
        matches!(
            self,
            ThreatType::HalfOpen4 | ThreatType::Fork4x3 | ThreatType::Fork4x4 | ThreatType::Open4
        )
    }
}

impl fmt::Display for ThreatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreatType::None => "none",
            ThreatType::HalfOpen3 => "half-open 3",
            ThreatType::Open3 => "open 3",
            ThreatType::Fork3x3 => "fork 3x3",
            ThreatType::HalfOpen4 => "half-open 4",
            ThreatType::Fork4x3 => "fork 4x3",
            ThreatType::Fork4x4 => "fork 4x4",
            ThreatType::Open4 => "open 4",
            ThreatType::Five => "five",
            ThreatType::Overline => "overline",
        };
        write!(f, "{name}")
    }
}

/// Threat levels of one square for both sides, packed into a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreatEncoding(u8);

impl ThreatEncoding {
    pub fn new(for_cross: ThreatType, for_circle: ThreatType) -> ThreatEncoding {
        ThreatEncoding((for_cross as u8) | ((for_circle as u8) << 4))
    }

    #[inline]
    pub fn for_cross(self) -> ThreatType {
        ThreatType::from_bits((self.0 & 0x0F) as u32)
    }

    #[inline]
    pub fn for_circle(self) -> ThreatType {
        ThreatType::from_bits((self.0 >> 4) as u32)
    }

    #[inline]
    pub fn for_sign(self, sign: Sign) -> ThreatType {
        match sign {
            Sign::Cross => self.for_cross(),
            _ => self.for_circle(),
        }
    }
}

/// Precomputed mapping from a 4-direction pattern group to a threat type,
/// one table per side. `8^4 = 4096` entries each.
pub struct ThreatTable {
    for_cross: Vec<u8>,
    for_circle: Vec<u8>,
}

const GROUP_COMBINATIONS: usize = 8 * 8 * 8 * 8;

impl ThreatTable {
    fn new(rules: GameRules) -> ThreatTable {
        let _ = rules; // derivation is rule-independent; usage sites apply forbiddenness
        let mut table = ThreatTable {
            for_cross: vec![0; GROUP_COMBINATIONS],
            for_circle: vec![0; GROUP_COMBINATIONS],
        };
        for index in 0..GROUP_COMBINATIONS {
            let group = decode_group(index);
            let threat = derive_threat(&group) as u8;
            table.for_cross[index] = threat;
            table.for_circle[index] = threat;
        }
        table
    }

    /// The shared table for the given rules, built on first use.
    pub fn get(rules: GameRules) -> Arc<ThreatTable> {
        lazy_static! {
            static ref REGISTRY: Mutex<HashMap<GameRules, Arc<ThreatTable>>> =
                Mutex::new(HashMap::new());
        }
        let mut registry = REGISTRY.lock().expect("threat table registry poisoned");
        registry
            .entry(rules)
            .or_insert_with(|| Arc::new(ThreatTable::new(rules)))
            .clone()
    }

    /// Threat for one side given its four per-direction pattern types.
    #[inline]
    pub fn lookup_side(&self, sign: Sign, group: &DirectionGroup<PatternType>) -> ThreatType {
        let index = encode_group(group);
        let table = match sign {
            Sign::Cross => &self.for_cross,
            _ => &self.for_circle,
        };
        ThreatType::from_bits(table[index] as u32)
    }

    /// Threats for both sides from their pattern groups.
    pub fn lookup(
        &self,
        cross_group: &DirectionGroup<PatternType>,
        circle_group: &DirectionGroup<PatternType>,
    ) -> ThreatEncoding {
        ThreatEncoding::new(
            self.lookup_side(Sign::Cross, cross_group),
            self.lookup_side(Sign::Circle, circle_group),
        )
    }
}

#[inline]
fn encode_group(group: &DirectionGroup<PatternType>) -> usize {
    (group[0] as usize)
        | ((group[1] as usize) << 3)
        | ((group[2] as usize) << 6)
        | ((group[3] as usize) << 9)
}

fn decode_group(index: usize) -> DirectionGroup<PatternType> {
    [
        PatternType::from_bits(index as u32),
        PatternType::from_bits((index >> 3) as u32),
        PatternType::from_bits((index >> 6) as u32),
        PatternType::from_bits((index >> 9) as u32),
    ]
}

/// The threat hierarchy, strongest rule first.
fn derive_threat(group: &DirectionGroup<PatternType>) -> ThreatType {
    let mut count = [0u8; 8];
    for &kind in group {
        count[kind as usize] += 1;
    }
    if count[PatternType::Five as usize] > 0 {
        ThreatType::Five
    } else if count[PatternType::Overline as usize] > 0 {
        ThreatType::Overline
    } else if count[PatternType::Open4 as usize] > 0 {
        ThreatType::Open4
    } else if count[PatternType::Double4 as usize] > 0 || count[PatternType::HalfOpen4 as usize] >= 2 {
        ThreatType::Fork4x4
    } else if count[PatternType::HalfOpen4 as usize] == 1 {
        if count[PatternType::Open3 as usize] >= 1 {
            ThreatType::Fork4x3
        } else {
            ThreatType::HalfOpen4
        }
    } else if count[PatternType::Open3 as usize] >= 2 {
        ThreatType::Fork3x3
    } else if count[PatternType::Open3 as usize] == 1 {
        ThreatType::Open3
    } else if count[PatternType::HalfOpen3 as usize] >= 1 {
        ThreatType::HalfOpen3
    } else {
        ThreatType::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(types: [PatternType; 4]) -> DirectionGroup<PatternType> {
        types
    }

    #[test]
    fn single_direction_threats() {
        let table = ThreatTable::get(GameRules::Standard);
        let none = PatternType::None;
        assert_eq!(
            table.lookup_side(Sign::Cross, &group([PatternType::Five, none, none, none])),
            ThreatType::Five
        );
        assert_eq!(
            table.lookup_side(Sign::Cross, &group([none, PatternType::Open4, none, none])),
            ThreatType::Open4
        );
        assert_eq!(
            table.lookup_side(Sign::Circle, &group([none, none, PatternType::Open3, none])),
            ThreatType::Open3
        );
    }

    #[test]
    fn forks_from_combined_directions() {
        let table = ThreatTable::get(GameRules::Standard);
        let none = PatternType::None;
        let h4 = PatternType::HalfOpen4;
        let o3 = PatternType::Open3;
        assert_eq!(
            table.lookup_side(Sign::Cross, &group([h4, h4, none, none])),
            ThreatType::Fork4x4
        );
        assert_eq!(
            table.lookup_side(Sign::Cross, &group([PatternType::Double4, none, none, none])),
            ThreatType::Fork4x4
        );
        assert_eq!(
            table.lookup_side(Sign::Cross, &group([h4, o3, none, none])),
            ThreatType::Fork4x3
        );
        assert_eq!(
            table.lookup_side(Sign::Cross, &group([o3, none, o3, none])),
            ThreatType::Fork3x3
        );
    }

    #[test]
    fn five_dominates_everything() {
        let table = ThreatTable::get(GameRules::Standard);
        let g = group([
            PatternType::Five,
            PatternType::Open4,
            PatternType::HalfOpen4,
            PatternType::Open3,
        ]);
        assert_eq!(table.lookup_side(Sign::Cross, &g), ThreatType::Five);
    }

    #[test]
    fn weak_threats() {
        let table = ThreatTable::get(GameRules::Standard);
        let none = PatternType::None;
        let h3 = PatternType::HalfOpen3;
        assert_eq!(
            table.lookup_side(Sign::Cross, &group([h3, h3, none, none])),
            ThreatType::HalfOpen3
        );
        assert_eq!(
            table.lookup_side(Sign::Cross, &group([none, none, none, none])),
            ThreatType::None
        );
    }

    #[test]
    fn encoding_packs_both_sides() {
        let enc = ThreatEncoding::new(ThreatType::Fork4x3, ThreatType::Overline);
        assert_eq!(enc.for_cross(), ThreatType::Fork4x3);
        assert_eq!(enc.for_circle(), ThreatType::Overline);
        assert_eq!(enc.for_sign(Sign::Cross), ThreatType::Fork4x3);
    }
}
