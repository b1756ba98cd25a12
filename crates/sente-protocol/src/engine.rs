//! Command handling: wires the Gomocup protocol to the search engine.

use std::time::Duration;

use sente_core::{Board, GameConfig, GameRules, Move, Sign};
use sente_mcts::SearchEngine;
use tracing::{info, warn};

use crate::command::{BoardField, BoardStone, Command, parse_command};
use crate::error::ProtocolError;

/// Engine identification for `ABOUT`.
const ABOUT: &str =
    r#"name="sente", version="0.1", author="sente developers", country="unknown""#;

/// Stateful protocol handler.
///
/// The engine always plays the side whose turn it is when a `TURN`,
/// `BEGIN`, or `BOARD` command asks for a move; the Gomocup protocol
/// has no persistent color assignment.
pub struct ProtocolEngine {
    rules: GameRules,
    engine: Option<SearchEngine>,
    turn_time: Duration,
    match_time_left: Option<Duration>,
    max_simulations: Option<u32>,
    finished: bool,
}

impl ProtocolEngine {
    pub fn new() -> ProtocolEngine {
        ProtocolEngine {
            rules: GameRules::Standard,
            engine: None,
            turn_time: Duration::from_secs(5),
            match_time_left: None,
            max_simulations: None,
            finished: false,
        }
    }

    /// Whether `END` was received.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Handle one protocol line (plus the gathered lines of a `BOARD`
    /// block) and return the response lines to print.
    ///
    /// Malformed input never mutates the game state; it is reported as
    /// an `ERROR` line.
    pub fn handle_line(&mut self, line: &str, extra_lines: &[String]) -> Vec<String> {
        if line.trim().is_empty() {
            return Vec::new();
        }
        match parse_command(line, extra_lines) {
            Ok(command) => self.handle(command),
            Err(ProtocolError::UnknownCommand { name }) => vec![format!("UNKNOWN {name}")],
            Err(error) => vec![format!("ERROR {error}")],
        }
    }

    fn handle(&mut self, command: Command) -> Vec<String> {
        match command {
            Command::Start { size } => self.start(size as usize, size as usize),
            Command::RectStart { width, height } => self.start(width as usize, height as usize),
            Command::Begin => self.answer_with_move(),
            Command::Turn { x, y } => match self.apply_opponent_move(x, y) {
                Ok(()) => self.answer_with_move(),
                Err(error) => vec![format!("ERROR {error}")],
            },
            Command::Board { stones } => match self.upload_board(&stones) {
                Ok(()) => self.answer_with_move(),
                Err(error) => vec![format!("ERROR {error}")],
            },
            Command::YxBoard { stones } => match self.upload_board(&stones) {
                // position installed only; the manager asks for moves
                // or forbidden squares separately
                Ok(()) => Vec::new(),
                Err(error) => vec![format!("ERROR {error}")],
            },
            Command::Info { key, value } => {
                self.apply_info(&key, &value);
                Vec::new()
            }
            Command::About => vec![ABOUT.to_string()],
            Command::End => {
                self.finished = true;
                Vec::new()
            }
            Command::ShowForbid => self.show_forbidden(),
        }
    }

    fn start(&mut self, cols: usize, rows: usize) -> Vec<String> {
        let config = GameConfig::with_size(self.rules, rows, cols);
        self.engine = Some(SearchEngine::new(config));
        info!(rows, cols, rules = %self.rules, "game started");
        vec!["OK".to_string()]
    }

    fn apply_opponent_move(&mut self, x: u32, y: u32) -> Result<(), ProtocolError> {
        let engine = self.engine.as_mut().ok_or(ProtocolError::NoGame)?;
        let config = engine.game_config();
        if x as usize >= config.cols || y as usize >= config.rows {
            return Err(ProtocolError::OutOfRange { x, y });
        }
        let sign = engine.sign_to_move();
        engine
            .play_move(Move::new(y as u8, x as u8, sign))
            .map_err(|_| ProtocolError::OutOfRange { x, y })?;
        Ok(())
    }

    fn upload_board(&mut self, stones: &[BoardStone]) -> Result<(), ProtocolError> {
        let engine = self.engine.as_mut().ok_or(ProtocolError::NoGame)?;
        let config = engine.game_config();

        // continuous-game stones (field 3) are not supported and are
        // discarded outright; they count for nothing below
        let stones: Vec<&BoardStone> =
            stones.iter().filter(|s| s.field != BoardField::Continuous).collect();

        // fields are relative to the side to move; equal counts mean the
        // mover opened the game as cross, one extra opponent stone means
        // the opponent did
        let own_count = stones.iter().filter(|s| s.field == BoardField::Own).count();
        let opp_count = stones.len() - own_count;
        let own_sign = if own_count == opp_count {
            Sign::Cross
        } else if own_count + 1 == opp_count {
            Sign::Circle
        } else {
            return Err(ProtocolError::ImbalancedUpload { own: own_count, opp: opp_count });
        };

        let mut board = Board::empty(config.rows, config.cols);
        for stone in stones {
            if stone.x as usize >= config.cols || stone.y as usize >= config.rows {
                return Err(ProtocolError::OutOfRange { x: stone.x, y: stone.y });
            }
            let sign = match stone.field {
                BoardField::Own => own_sign,
                _ => own_sign.invert(),
            };
            board
                .put_move(Move::new(stone.y as u8, stone.x as u8, sign))
                .map_err(|_| ProtocolError::OutOfRange { x: stone.x, y: stone.y })?;
        }
        engine
            .set_position(&board, own_sign)
            .map_err(|_| ProtocolError::NoGame)?;
        Ok(())
    }

    fn answer_with_move(&mut self) -> Vec<String> {
        let Some(engine) = self.engine.as_mut() else {
            return vec![format!("ERROR {}", ProtocolError::NoGame)];
        };
        let budget = self.match_time_left.map_or(self.turn_time, |left| left.min(self.turn_time));
        let report = engine.search(Some(budget), self.max_simulations);

        match report.best_move {
            Some(best) => {
                if engine.play_move(best).is_err() {
                    warn!(best = %best, "search returned an unplayable move");
                    return vec![format!("ERROR {}", ProtocolError::NoGame)];
                }
                vec![format!("{},{}", best.col, best.row)]
            }
            None => vec![format!("ERROR {}", ProtocolError::NoGame)],
        }
    }

    fn apply_info(&mut self, key: &str, value: &str) {
        match key.to_ascii_lowercase().as_str() {
            "timeout_turn" => {
                if let Ok(millis) = value.parse::<u64>()
                    && millis > 0
                {
                    self.turn_time = Duration::from_millis(millis);
                }
            }
            "timeout_match" | "time_left" => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.match_time_left = Some(Duration::from_millis(millis));
                }
            }
            "max_simulations" => {
                self.max_simulations = value.parse().ok();
            }
            "rule" => {
                if let Ok(rules) = value.parse::<GameRules>() {
                    self.rules = rules;
                }
            }
            "max_memory" | "folder" | "game_type" => {
                // accepted but not acted on
            }
            other => {
                warn!(key = other, "ignoring unknown INFO key");
            }
        }
    }

    fn show_forbidden(&mut self) -> Vec<String> {
        let Some(engine) = self.engine.as_ref() else {
            return vec![format!("ERROR {}", ProtocolError::NoGame)];
        };
        let mut line = String::from("FORBID ");
        for mv in engine.forbidden_moves() {
            // four-digit pairs per the renju extension
            line.push_str(&format!("{:02}{:02}", mv.col, mv.row));
        }
        line.push('.');
        vec![line]
    }
}

impl Default for ProtocolEngine {
    fn default() -> ProtocolEngine {
        ProtocolEngine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_game() -> ProtocolEngine {
        let mut engine = ProtocolEngine::new();
        engine.handle_line("INFO max_simulations 16", &[]);
        engine.handle_line("INFO timeout_turn 2000", &[]);
        let response = engine.handle_line("START 15", &[]);
        assert_eq!(response, vec!["OK".to_string()]);
        engine
    }

    #[test]
    fn start_then_begin_produces_a_move() {
        let mut engine = engine_with_game();
        let response = engine.handle_line("BEGIN", &[]);
        assert_eq!(response.len(), 1);
        let (x, y) = response[0].split_once(',').expect("coordinate answer");
        let x: usize = x.parse().unwrap();
        let y: usize = y.parse().unwrap();
        assert!(x < 15 && y < 15);
    }

    #[test]
    fn turn_answers_with_a_legal_reply() {
        let mut engine = engine_with_game();
        let response = engine.handle_line("TURN 7,7", &[]);
        assert_eq!(response.len(), 1);
        assert_ne!(response[0], "7,7", "the reply must not repeat the opponent move");
        assert!(response[0].contains(','));
    }

    #[test]
    fn unknown_command_is_reported_by_name() {
        let mut engine = engine_with_game();
        let response = engine.handle_line("SWAP2BOARD", &[]);
        assert_eq!(response, vec!["UNKNOWN SWAP2BOARD".to_string()]);
    }

    #[test]
    fn turn_before_start_is_an_error() {
        let mut engine = ProtocolEngine::new();
        let response = engine.handle_line("TURN 7,7", &[]);
        assert!(response[0].starts_with("ERROR"));
    }

    #[test]
    fn out_of_range_turn_is_rejected_without_state_change() {
        let mut engine = engine_with_game();
        let response = engine.handle_line("TURN 20,20", &[]);
        assert!(response[0].starts_with("ERROR"));
        // the game goes on: a legal turn still works
        let response = engine.handle_line("TURN 7,7", &[]);
        assert!(response[0].contains(','));
    }

    #[test]
    fn board_upload_continues_the_game() {
        let mut engine = engine_with_game();
        let lines = vec![
            "7,7,2".to_string(),
            "8,8,1".to_string(),
            "6,7,2".to_string(),
            "DONE".to_string(),
        ];
        let response = engine.handle_line("BOARD", &lines);
        assert_eq!(response.len(), 1);
        assert!(response[0].contains(','));
    }

    #[test]
    fn continuous_game_stones_are_discarded() {
        let mut engine = engine_with_game();
        // two real stones plus a field-3 stone that must vanish: the
        // kept counts are 1 own / 1 opponent, so the mover is cross and
        // the discarded square stays empty
        let lines = vec![
            "7,7,2".to_string(),
            "8,8,1".to_string(),
            "3,3,3".to_string(),
            "DONE".to_string(),
        ];
        let response = engine.handle_line("yxboard", &lines);
        assert!(response.is_empty());

        let inner = engine.engine.as_ref().unwrap();
        assert_eq!(inner.board().at(3, 3), sente_core::Sign::None);
        assert_eq!(inner.board().at(7, 7), sente_core::Sign::Circle);
        assert_eq!(inner.board().at(8, 8), sente_core::Sign::Cross);
        assert_eq!(inner.sign_to_move(), sente_core::Sign::Cross);
    }

    #[test]
    fn imbalanced_upload_is_rejected() {
        let mut engine = engine_with_game();
        let lines = vec![
            "7,7,1".to_string(),
            "8,8,1".to_string(),
            "9,9,2".to_string(),
            "DONE".to_string(),
        ];
        let response = engine.handle_line("BOARD", &lines);
        assert!(response[0].starts_with("ERROR"));
    }

    #[test]
    fn yxboard_installs_the_position_silently() {
        let mut engine = engine_with_game();
        let lines = vec!["7,7,2".to_string(), "DONE".to_string()];
        let response = engine.handle_line("yxboard", &lines);
        assert!(response.is_empty(), "yxboard must not answer with a move");

        let board = engine.engine.as_ref().unwrap().board();
        assert_ne!(board.at(7, 7), sente_core::Sign::None);
        // the uploaded position is live for follow-up queries
        let forbid = engine.handle_line("yxshowforbid", &[]);
        assert!(forbid[0].starts_with("FORBID"));
    }

    #[test]
    fn about_and_end() {
        let mut engine = engine_with_game();
        let about = engine.handle_line("ABOUT", &[]);
        assert!(about[0].contains("sente"));
        assert!(!engine.is_finished());
        engine.handle_line("END", &[]);
        assert!(engine.is_finished());
    }
}
