use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

/// Why a response check could not be parsed. Offsets are byte positions in the check source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("check has {found} at offset {pos} where {expected} was expected")]
    UnexpectedToken {
        pos: usize,
        expected: String,
        found: String,
    },

    #[error("check ends early at offset {pos}")]
    UnexpectedEof { pos: usize },

    #[error("invalid number `{text}` at offset {pos}")]
    InvalidNumber { pos: usize, text: String },

    #[error("unrecognized character at offset {pos}")]
    UnknownCharacter { pos: usize },

    #[error("check nests deeper than {limit} levels at offset {pos}")]
    TooDeep { pos: usize, limit: usize },
}

impl ParseError {
    pub fn unexpected_token(pos: usize, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedToken {
            pos,
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unexpected_eof(pos: usize) -> Self {
        Self::UnexpectedEof { pos }
    }

    pub fn invalid_number(pos: usize, text: impl Into<String>) -> Self {
        Self::InvalidNumber { pos, text: text.into() }
    }

    pub fn unknown_character(pos: usize) -> Self {
        Self::UnknownCharacter { pos }
    }

    pub fn too_deep(pos: usize, limit: usize) -> Self {
        Self::TooDeep { pos, limit }
    }

    /// Byte offset the error points at
    pub fn pos(&self) -> usize {
        match self {
            Self::UnexpectedToken { pos, .. }
            | Self::UnexpectedEof { pos }
            | Self::InvalidNumber { pos, .. }
            | Self::UnknownCharacter { pos }
            | Self::TooDeep { pos, .. } => *pos,
        }
    }
}
