//! Gomocup command parsing.

use crate::error::ProtocolError;

/// One field of a `BOARD` block: who owns the stone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardField {
    /// Stone of the side to move (field `1`).
    Own,
    /// Opponent stone (field `2`).
    Opponent,
    /// Stone of the continuous-game extension (field `3`), not
    /// supported: uploads discard these.
    Continuous,
}

/// A stone listed in a `BOARD` block: `(x, y, field)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardStone {
    pub x: u32,
    pub y: u32,
    pub field: BoardField,
}

/// A parsed Gomocup command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `START <size>` — begin a game on a square board.
    Start {
        /// Board side length.
        size: u32,
    },
    /// `RECTSTART <width>,<height>` — begin on a rectangular board.
    RectStart {
        /// Board width (columns).
        width: u32,
        /// Board height (rows).
        height: u32,
    },
    /// `BEGIN` — the engine moves first.
    Begin,
    /// `TURN <x>,<y>` — opponent played; the engine answers.
    Turn {
        /// Column of the opponent move.
        x: u32,
        /// Row of the opponent move.
        y: u32,
    },
    /// `BOARD` ... `DONE` — full position upload; the engine answers
    /// with a move.
    Board {
        /// The listed stones in upload order.
        stones: Vec<BoardStone>,
    },
    /// `yxboard` ... `DONE` — position upload without a move answer
    /// (renju extension, used before forbidden-move queries).
    YxBoard {
        /// The listed stones in upload order.
        stones: Vec<BoardStone>,
    },
    /// `INFO <key> <value>` — engine parameters.
    Info {
        /// Parameter name.
        key: String,
        /// Raw parameter value.
        value: String,
    },
    /// `ABOUT` — identify the engine.
    About,
    /// `END` — terminate.
    End,
    /// `yxshowforbid` — list forbidden squares (renju extension).
    ShowForbid,
}

/// Parse one protocol line; `BOARD` blocks must already be gathered so
/// the stone lines arrive in `extra_lines`.
pub fn parse_command(line: &str, extra_lines: &[String]) -> Result<Command, ProtocolError> {
    let trimmed = line.trim();
    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (trimmed, ""),
    };

    match name.to_ascii_uppercase().as_str() {
        "START" => {
            let size = parse_number(rest)?;
            if !(5..=32).contains(&size) {
                return Err(ProtocolError::UnsupportedSize { size });
            }
            Ok(Command::Start { size })
        }
        "RECTSTART" => {
            let (width, height) = parse_pair(rest)?;
            if !(5..=32).contains(&width) || !(5..=32).contains(&height) {
                return Err(ProtocolError::UnsupportedSize { size: width.max(height) });
            }
            Ok(Command::RectStart { width, height })
        }
        "BEGIN" => Ok(Command::Begin),
        "TURN" => {
            let (x, y) = parse_pair(rest)?;
            Ok(Command::Turn { x, y })
        }
        "BOARD" => Ok(Command::Board { stones: parse_stone_block(extra_lines)? }),
        "YXBOARD" => Ok(Command::YxBoard { stones: parse_stone_block(extra_lines)? }),
        "INFO" => {
            let (key, value) = match rest.split_once(char::is_whitespace) {
                Some((key, value)) => (key.to_string(), value.trim().to_string()),
                None => (rest.to_string(), String::new()),
            };
            Ok(Command::Info { key, value })
        }
        "ABOUT" => Ok(Command::About),
        "END" => Ok(Command::End),
        "YXSHOWFORBID" => Ok(Command::ShowForbid),
        other => Err(ProtocolError::UnknownCommand { name: other.to_string() }),
    }
}

fn parse_number(text: &str) -> Result<u32, ProtocolError> {
    text.trim().parse().map_err(|_| ProtocolError::InvalidNumber { text: text.to_string() })
}

fn parse_stone_block(extra_lines: &[String]) -> Result<Vec<BoardStone>, ProtocolError> {
    let mut stones = Vec::new();
    for stone_line in extra_lines {
        let trimmed = stone_line.trim();
        if trimmed.eq_ignore_ascii_case("DONE") {
            break;
        }
        stones.push(parse_stone(trimmed)?);
    }
    Ok(stones)
}

fn parse_pair(text: &str) -> Result<(u32, u32), ProtocolError> {
    let (first, second) = text
        .split_once(',')
        .ok_or_else(|| ProtocolError::MalformedCoordinates { text: text.to_string() })?;
    let x = first
        .trim()
        .parse()
        .map_err(|_| ProtocolError::MalformedCoordinates { text: text.to_string() })?;
    let y = second
        .trim()
        .parse()
        .map_err(|_| ProtocolError::MalformedCoordinates { text: text.to_string() })?;
    Ok((x, y))
}

fn parse_stone(text: &str) -> Result<BoardStone, ProtocolError> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(ProtocolError::MalformedCoordinates { text: text.to_string() });
    }
    let x = parts[0]
        .parse()
        .map_err(|_| ProtocolError::MalformedCoordinates { text: text.to_string() })?;
    let y = parts[1]
        .parse()
        .map_err(|_| ProtocolError::MalformedCoordinates { text: text.to_string() })?;
    let field_value: u32 =
        parts[2].parse().map_err(|_| ProtocolError::InvalidNumber { text: text.to_string() })?;
    let field = match field_value {
        1 => BoardField::Own,
        2 => BoardField::Opponent,
        3 => BoardField::Continuous,
        other => return Err(ProtocolError::InvalidField { field: other }),
    };
    Ok(BoardStone { x, y, field })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_parses_size() {
        assert_eq!(parse_command("START 15", &[]).unwrap(), Command::Start { size: 15 });
        assert!(matches!(
            parse_command("START 99", &[]),
            Err(ProtocolError::UnsupportedSize { size: 99 })
        ));
        assert!(matches!(
            parse_command("START abc", &[]),
            Err(ProtocolError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn turn_parses_coordinates() {
        assert_eq!(parse_command("TURN 7,8", &[]).unwrap(), Command::Turn { x: 7, y: 8 });
        assert_eq!(parse_command("turn 0, 14", &[]).unwrap(), Command::Turn { x: 0, y: 14 });
        assert!(matches!(
            parse_command("TURN 7;8", &[]),
            Err(ProtocolError::MalformedCoordinates { .. })
        ));
    }

    #[test]
    fn board_block_collects_stones() {
        let lines = vec!["7,7,2".to_string(), "8,8,1".to_string(), "DONE".to_string()];
        let command = parse_command("BOARD", &lines).unwrap();
        assert_eq!(
            command,
            Command::Board {
                stones: vec![
                    BoardStone { x: 7, y: 7, field: BoardField::Opponent },
                    BoardStone { x: 8, y: 8, field: BoardField::Own },
                ]
            }
        );
    }

    #[test]
    fn yxboard_parses_like_board() {
        let lines = vec!["7,7,1".to_string(), "3,3,3".to_string(), "DONE".to_string()];
        let command = parse_command("yxboard", &lines).unwrap();
        assert_eq!(
            command,
            Command::YxBoard {
                stones: vec![
                    BoardStone { x: 7, y: 7, field: BoardField::Own },
                    BoardStone { x: 3, y: 3, field: BoardField::Continuous },
                ]
            }
        );
    }

    #[test]
    fn field_values_map_to_owners() {
        let stone = parse_stone("1,2,3").unwrap();
        assert_eq!(stone.field, BoardField::Continuous);
        assert!(matches!(
            parse_stone("1,2,4"),
            Err(ProtocolError::InvalidField { field: 4 })
        ));
    }

    #[test]
    fn info_splits_key_and_value() {
        assert_eq!(
            parse_command("INFO timeout_turn 5000", &[]).unwrap(),
            Command::Info { key: "timeout_turn".into(), value: "5000".into() }
        );
    }

    #[test]
    fn unknown_commands_are_errors() {
        assert!(matches!(
            parse_command("FROBNICATE", &[]),
            Err(ProtocolError::UnknownCommand { .. })
        ));
    }
}
