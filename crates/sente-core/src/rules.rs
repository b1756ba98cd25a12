//! Rule variants and their overline / blocked-five legality.

use std::fmt;
use std::str::FromStr;

use crate::sign::Sign;

/// Gomoku rule variant.
///
/// Variants differ in whether six-or-more in a row wins, and whether a
/// five blocked on both ends still counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameRules {
    /// Five or more in a row wins for either side.
    Freestyle,
    /// Exactly five wins; overlines are not a win for either side.
    Standard,
    /// Exactly five wins; overlines, 4x4 forks and 3x3 forks are
    /// forbidden for cross (black) and lose the game.
    Renju,
    /// Exactly five wins, but only if not blocked on both ends.
    Caro5,
    /// Five or more wins, but a plain five must not be blocked on both ends.
    Caro6,
}

impl GameRules {
    /// Half-length of the pattern window: the padding ring width.
    #[inline]
    pub const fn padding(self) -> usize {
        5
    }

    /// Whether an overline (six or more) is a win for the given side.
    #[inline]
    pub const fn overline_wins(self, sign: Sign) -> bool {
        match self {
            GameRules::Freestyle | GameRules::Caro6 => true,
            GameRules::Standard | GameRules::Caro5 => false,
            GameRules::Renju => matches!(sign, Sign::Circle),
        }
    }

    /// Whether a five blocked on both ends by the opponent still wins.
    #[inline]
    pub const fn blocked_five_wins(self) -> bool {
        !matches!(self, GameRules::Caro5 | GameRules::Caro6)
    }

    /// Whether forbidden moves exist for the given side (renju cross only).
    #[inline]
    pub const fn has_forbidden_moves(self, sign: Sign) -> bool {
        matches!(self, GameRules::Renju) && matches!(sign, Sign::Cross)
    }
}

impl fmt::Display for GameRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameRules::Freestyle => "freestyle",
            GameRules::Standard => "standard",
            GameRules::Renju => "renju",
            GameRules::Caro5 => "caro5",
            GameRules::Caro6 => "caro6",
        };
        write!(f, "{name}")
    }
}

impl FromStr for GameRules {
    type Err = UnknownRule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "freestyle" | "0" => Ok(GameRules::Freestyle),
            "standard" | "1" => Ok(GameRules::Standard),
            "renju" | "4" => Ok(GameRules::Renju),
            "caro5" => Ok(GameRules::Caro5),
            "caro" | "caro6" | "2" => Ok(GameRules::Caro6),
            _ => Err(UnknownRule(s.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognized rule name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rule: \"{0}\"")]
pub struct UnknownRule(pub String);

/// Board geometry plus the rule variant, shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameConfig {
    /// Rule variant in play.
    pub rules: GameRules,
    /// Number of board rows.
    pub rows: usize,
    /// Number of board columns.
    pub cols: usize,
}

impl GameConfig {
    /// Standard 15x15 board under the given rules.
    pub fn new(rules: GameRules) -> Self {
        Self { rules, rows: 15, cols: 15 }
    }

    /// Board with explicit dimensions.
    pub fn with_size(rules: GameRules, rows: usize, cols: usize) -> Self {
        Self { rules, rows, cols }
    }

    /// Total number of cells.
    #[inline]
    pub const fn size(&self) -> usize {
        self.rows * self.cols
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig::new(GameRules::Standard)
    }
}
