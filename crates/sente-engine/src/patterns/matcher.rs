//! A tiny pattern-matching language for classifying line shapes.
//!
//! Rules are written as strings of spot specifications that slide over a
//! raw line: `_`, `X`, `O`, `|` match a single cell value, `[XO]` matches
//! a set, `[not X]` everything but one value, `[any]` everything.

use sente_core::{GameRules, Sign};

use crate::patterns::pattern::{PatternType, RawPattern};

/// Allowed cell values at one spot of a sliding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpotSet([bool; 4]);

impl SpotSet {
    fn single(sign: Sign) -> SpotSet {
        let mut allowed = [false; 4];
        allowed[sign.bits() as usize] = true;
        SpotSet(allowed)
    }

    fn all() -> SpotSet {
        SpotSet([true; 4])
    }

    fn not(sign: Sign) -> SpotSet {
        let mut allowed = [true; 4];
        allowed[sign.bits() as usize] = false;
        SpotSet(allowed)
    }

    #[inline]
    fn matches(self, sign: Sign) -> bool {
        self.0[sign.bits() as usize]
    }
}

/// A single sliding rule: a sequence of spot sets.
#[derive(Debug, Clone)]
pub struct MatchingRule {
    spots: Vec<SpotSet>,
}

impl MatchingRule {
    /// Parse a rule string.
    ///
    /// # Panics
    ///
    /// Panics on malformed rule text; rules are compiled-in constants.
    pub fn new(text: &str) -> MatchingRule {
        let mut spots = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '_' | 'X' | 'O' | '|' => {
                    spots.push(SpotSet::single(Sign::from_char(chars[i]).unwrap()));
                    i += 1;
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|&c| c == ']')
                        .map(|p| i + p)
                        .unwrap_or_else(|| panic!("unclosed '[' in rule '{text}'"));
                    let body: String = chars[i + 1..close].iter().collect();
                    if body == "any" {
                        spots.push(SpotSet::all());
                    } else if let Some(rest) = body.strip_prefix("not ") {
                        let c = rest.chars().next().unwrap();
                        spots.push(SpotSet::not(Sign::from_char(c).unwrap()));
                    } else {
                        let mut allowed = [false; 4];
                        for c in body.chars() {
                            let sign = Sign::from_char(c)
                                .unwrap_or_else(|| panic!("bad set in rule '{text}'"));
                            allowed[sign.bits() as usize] = true;
                        }
                        spots.push(SpotSet(allowed));
                    }
                    i = close + 1;
                }
                other => panic!("bad character '{other}' in rule '{text}'"),
            }
        }
        MatchingRule { spots }
    }

    /// Whether the rule matches anywhere along the line.
    pub fn is_matching(&self, line: RawPattern) -> bool {
        let len = crate::patterns::pattern::LINE_LEN;
        if self.spots.len() > len {
            return false;
        }
        'outer: for start in 0..=(len - self.spots.len()) {
            for (offset, spot) in self.spots.iter().enumerate() {
                if !spot.matches(line.get(start + offset)) {
                    continue 'outer;
                }
            }
            return true;
        }
        false
    }
}

/// A group of rules classifying one shape for one side under one rule set.
#[derive(Debug, Clone)]
struct ShapeClassifier {
    rules: Vec<MatchingRule>,
}

impl ShapeClassifier {
    fn new() -> ShapeClassifier {
        ShapeClassifier { rules: Vec::new() }
    }

    fn add(&mut self, text: &str) {
        self.rules.push(MatchingRule::new(text));
    }

    fn add_all(&mut self, texts: &[&str]) {
        for text in texts {
            self.add(text);
        }
    }

    /// Rebuild each rule wrapped with the given prefix and postfix spots.
    fn wrap(base: &[&str], prefix: &str, postfix: &str) -> ShapeClassifier {
        let mut result = ShapeClassifier::new();
        for text in base {
            result.add(&format!("{prefix}{text}{postfix}"));
        }
        result
    }

    fn matches(&self, line: RawPattern) -> bool {
        self.rules.iter().any(|rule| rule.is_matching(line))
    }
}

/// Side-constraint wrapper implementing the rule variants.
///
/// STANDARD (and RENJU for cross) shapes must be exact, so they are
/// wrapped as `[not X]...[not X]`. CARO shapes must not end up blocked on
/// both ends, expressed as a pair of rules each leaving one side free;
/// CARO5 additionally keeps the exactness constraint since overlines
/// never win there.
fn constrained(base: &[&str], rules: GameRules, sign: Sign) -> ShapeClassifier {
    let own = if sign == Sign::Cross { 'X' } else { 'O' };
    let opp = if sign == Sign::Cross { 'O' } else { 'X' };
    match rules {
        GameRules::Standard => {
            ShapeClassifier::wrap(base, &format!("[not {own}]"), &format!("[not {own}]"))
        }
        GameRules::Renju if sign == Sign::Cross => {
            ShapeClassifier::wrap(base, &format!("[not {own}]"), &format!("[not {own}]"))
        }
        GameRules::Caro5 => {
            let mut result = ShapeClassifier::wrap(base, "[_|]", &format!("[not {own}]"));
            let other = ShapeClassifier::wrap(base, &format!("[not {own}]"), "[_|]");
            result.rules.extend(other.rules);
            result
        }
        GameRules::Caro6 => {
            let mut result = ShapeClassifier::wrap(base, &format!("[not {opp}]"), "[any]");
            let other = ShapeClassifier::wrap(base, "[any]", &format!("[not {opp}]"));
            result.rules.extend(other.rules);
            result
        }
        _ => {
            let mut result = ShapeClassifier::new();
            result.add_all(base);
            result
        }
    }
}

/// Full shape classifier for one `(rules, sign)` pair, applying the
/// strongest-first hierarchy.
pub struct LineClassifier {
    is_overline: ShapeClassifier,
    is_five: ShapeClassifier,
    is_open_four: ShapeClassifier,
    is_double_four: ShapeClassifier,
    is_half_open_four: ShapeClassifier,
    is_open_three: ShapeClassifier,
    is_half_open_three: ShapeClassifier,
}

impl LineClassifier {
    pub fn new(rules: GameRules, sign: Sign) -> LineClassifier {
        let (five, overline, open4, double4, half4, open3, half3): (
            &[&str],
            &[&str],
            &[&str],
            &[&str],
            &[&str],
            &[&str],
            &[&str],
        ) = if sign == Sign::Cross {
            (
                &["XXXXX"],
                &["XXXXXX"],
                &["_XXXX_"],
                &["X_XXX_X", "XX_XX_XX", "XXX_X_XXX"],
                &["_XXXX", "X_XXX", "XX_XX", "XXX_X", "XXXX_"],
                &["_XXX__", "_XX_X_", "_X_XX_", "__XXX_"],
                &[
                    "XXX__", "XX_X_", "XX__X", "X_XX_", "X_X_X", "X__XX", "_XX_X", "_X_XX",
                    "__XXX",
                ],
            )
        } else {
            (
                &["OOOOO"],
                &["OOOOOO"],
                &["_OOOO_"],
                &["O_OOO_O", "OO_OO_OO", "OOO_O_OOO"],
                &["_OOOO", "O_OOO", "OO_OO", "OOO_O", "OOOO_"],
                &["_OOO__", "_OO_O_", "_O_OO_", "__OOO_"],
                &[
                    "OOO__", "OO_O_", "OO__O", "O_OO_", "O_O_O", "O__OO", "_OO_O", "_O_OO",
                    "__OOO",
                ],
            )
        };

        let mut is_overline = ShapeClassifier::new();
        is_overline.add_all(overline);

        LineClassifier {
            is_overline,
            is_five: constrained(five, rules, sign),
            is_open_four: constrained(open4, rules, sign),
            is_double_four: constrained(double4, rules, sign),
            is_half_open_four: constrained(half4, rules, sign),
            is_open_three: constrained(open3, rules, sign),
            is_half_open_three: constrained(half3, rules, sign),
        }
    }

    /// Classify a line whose center is occupied by this side's stone.
    pub fn classify(&self, line: RawPattern) -> PatternType {
        if self.is_five.matches(line) {
            PatternType::Five
        } else if self.is_overline.matches(line) {
            PatternType::Overline
        } else if self.is_open_four.matches(line) {
            PatternType::Open4
        } else if self.is_double_four.matches(line) {
            PatternType::Double4
        } else if self.is_half_open_four.matches(line) {
            PatternType::HalfOpen4
        } else if self.is_open_three.matches(line) {
            PatternType::Open3
        } else if self.is_half_open_three.matches(line) {
            PatternType::HalfOpen3
        } else {
            PatternType::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::pattern::PAD;
    use sente_core::GameRules;

    fn classify(rules: GameRules, sign: Sign, text: &str) -> PatternType {
        let line = RawPattern::from_text(text).with(PAD, sign);
        LineClassifier::new(rules, sign).classify(line)
    }

    #[test]
    fn freestyle_basic_shapes() {
        assert_eq!(
            classify(GameRules::Freestyle, Sign::Cross, "_XXXX______"),
            PatternType::Five
        );
        assert_eq!(
            classify(GameRules::Freestyle, Sign::Cross, "__XXX______"),
            PatternType::Open4
        );
        assert_eq!(
            classify(GameRules::Freestyle, Sign::Cross, "OXXX_______"),
            PatternType::HalfOpen4
        );
        assert_eq!(
            classify(GameRules::Freestyle, Sign::Cross, "___XX______"),
            PatternType::Open3
        );
        assert_eq!(
            classify(GameRules::Freestyle, Sign::Cross, "___OX_X____"),
            PatternType::HalfOpen3
        );
        assert_eq!(
            classify(GameRules::Freestyle, Sign::Circle, "_OOOO______"),
            PatternType::Five
        );
    }

    #[test]
    fn standard_overline_is_not_five() {
        // center plus five in a row makes six
        assert_eq!(
            classify(GameRules::Standard, Sign::Cross, "XXXXX______"),
            PatternType::Overline
        );
        assert_eq!(
            classify(GameRules::Freestyle, Sign::Cross, "XXXXX______"),
            PatternType::Five
        );
    }

    #[test]
    fn double_four_in_one_line() {
        assert_eq!(
            classify(GameRules::Freestyle, Sign::Cross, "_XXX___XXX_"),
            PatternType::Double4
        );
    }

    #[test]
    fn caro_blocked_five_does_not_count() {
        // blocked on one end only still makes a five
        assert_eq!(
            classify(GameRules::Caro5, Sign::Cross, "OXXXX______"),
            PatternType::Five
        );
        // blocked on both ends makes nothing
        assert_eq!(
            classify(GameRules::Caro5, Sign::Cross, "OXXXX_O____"),
            PatternType::None
        );
    }

    #[test]
    fn renju_exactness_applies_to_cross_only() {
        assert_eq!(
            classify(GameRules::Renju, Sign::Cross, "XXXXX______"),
            PatternType::Overline
        );
        assert_eq!(
            classify(GameRules::Renju, Sign::Circle, "OOOOO______"),
            PatternType::Five
        );
    }

    #[test]
    fn bracket_sets_parse() {
        let rule = MatchingRule::new("[not X]XX[XO][any]");
        assert!(rule.is_matching(RawPattern::from_text("_XXO_______")));
        assert!(!rule.is_matching(RawPattern::from_text("XXXO_______")));
    }
}
