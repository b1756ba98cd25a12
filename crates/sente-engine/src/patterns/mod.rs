//! Pattern recognition: raw lines, classification tables, threat tables,
//! defensive moves, and the incremental calculator tying them together.

pub mod calculator;
pub mod defensive;
pub mod matcher;
pub mod pattern;
pub mod pattern_table;
pub mod threat_table;

pub use calculator::{MoveChange, PatternCalculator, ThreatChange, ThreatHistogram};
pub use defensive::{DefensiveBits, DefensiveMoveTable, EXT_LEN, EXT_PAD, ExtPattern};
pub use pattern::{Direction, DirectionGroup, LINE_LEN, PAD, PatternType, RawPattern};
pub use pattern_table::{PatternEncoding, PatternTable};
pub use threat_table::{ThreatEncoding, ThreatTable, ThreatType};
