//! Gomocup protocol handling for sente.

pub mod command;
pub mod engine;
pub mod error;

pub use command::{BoardField, BoardStone, Command, parse_command};
pub use engine::ProtocolEngine;
pub use error::ProtocolError;
