use thiserror::Error;

pub mod lexer;

#[derive(Debug, Clone, PartialEq)]
pub enum LexerTokenKind {
    // `push`, `print_int` or a label name
    Identifier(String),

    // `42`, `-7` or `0x2A`, wide enough for both the signed and unsigned operand views
    Integer(i128),

    // `:` ends a label definition
    Colon,

    // End of file: no more tokens left
    EOF,

    // `#` or `;` up to the end of the line
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: LexerTokenKind,
    pub line: usize,
    pub col: usize,
}

#[derive(Error, Debug, PartialEq)]
pub enum LexerError {
    #[error("Unexpected character `{character}` at {line}:{col}")]
    UnexpectedCharacter {
        character: char,
        line: usize,
        col: usize,
    },

    #[error("Invalid integer `{text}` at {line}:{col}")]
    InvalidInteger { text: String, line: usize, col: usize },
}
