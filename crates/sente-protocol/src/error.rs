//! Protocol error types.

/// Errors raised while parsing Gomocup commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A coordinate pair was not of the form `x,y`.
    #[error("malformed coordinates: \"{text}\"")]
    MalformedCoordinates {
        /// The offending text.
        text: String,
    },
    /// A coordinate lies outside the current board.
    #[error("coordinates out of range: {x},{y}")]
    OutOfRange {
        /// Column index.
        x: u32,
        /// Row index.
        y: u32,
    },
    /// A numeric argument did not parse.
    #[error("invalid number: \"{text}\"")]
    InvalidNumber {
        /// The offending text.
        text: String,
    },
    /// `START` was given an unsupported board size.
    #[error("unsupported board size: {size}")]
    UnsupportedSize {
        /// The requested size.
        size: u32,
    },
    /// A `BOARD` block field was not 1, 2, or 3.
    #[error("invalid board field: {field}")]
    InvalidField {
        /// The offending field value.
        field: u32,
    },
    /// A position upload with impossible stone counts.
    #[error("invalid position: {own} own vs {opp} opponent stones")]
    ImbalancedUpload {
        /// Stones of the side to move.
        own: usize,
        /// Opponent stones.
        opp: usize,
    },
    /// The command itself is not recognized.
    #[error("unknown command: \"{name}\"")]
    UnknownCommand {
        /// The command name.
        name: String,
    },
    /// A command arrived before `START`.
    #[error("no game in progress")]
    NoGame,
}

#[cfg(test)]
mod tests {
    use super::ProtocolError;

    #[test]
    fn display_messages() {
        let err = ProtocolError::MalformedCoordinates { text: "a,b".into() };
        assert_eq!(format!("{err}"), "malformed coordinates: \"a,b\"");
        let err = ProtocolError::UnknownCommand { name: "FOO".into() };
        assert_eq!(format!("{err}"), "unknown command: \"FOO\"");
    }
}
