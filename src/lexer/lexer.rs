use super::{LexerError, LexerTokenKind, Token};

#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    /** Human Readable positions in file */
    pub cur_line: usize,
    pub cur_col: usize,

    /** 'raw' format / offset within the file (in terms of 'codepoints') */
    pub codepoint_offset: usize,

    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(chars: &'a str) -> Lexer<'a> {
        Lexer {
            cur_col: 1,
            cur_line: 1,

            codepoint_offset: 0,

            chars: chars.chars().peekable(),
        }
    }

    fn consume_char(&mut self) -> Option<char> {
        match self.chars.next() {
            Some(c) => {
                self.cur_col += 1;
                if c == '\n' {
                    self.cur_line += 1;
                    self.cur_col = 1;
                }
                self.codepoint_offset += 1;
                Some(c)
            }
            None => None,
        }
    }

    /// Consume characters for as long as `predicate` holds
    fn consume_while<F: Fn(char) -> bool>(&mut self, text: &mut String, predicate: F) {
        while let Some(&c) = self.chars.peek() {
            if !predicate(c) {
                break;
            }
            text.push(c);
            self.consume_char();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.chars.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.consume_char();
        }
    }

    fn lex_integer(&mut self, first: char, line: usize, col: usize) -> Result<LexerTokenKind, LexerError> {
        let mut text = String::from(first);
        // swallow anything word-like so `12ab` is reported as one bad integer
        self.consume_while(&mut text, |c| c.is_ascii_alphanumeric() || c == '_');

        let digits: String = text.chars().filter(|c| *c != '_').collect();
        let (negative, magnitude) = match digits.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, digits.as_str()),
        };
        let parsed = match magnitude
            .strip_prefix("0x")
            .or_else(|| magnitude.strip_prefix("0X"))
        {
            Some(hex) => i128::from_str_radix(hex, 16),
            None => magnitude.parse::<i128>(),
        };

        match parsed {
            // from_str_radix accepts a sign of its own, we already took ours
            Ok(value) if !magnitude.starts_with(['+', '-']) => {
                Ok(LexerTokenKind::Integer(if negative { -value } else { value }))
            }
            _ => Err(LexerError::InvalidInteger { text, line, col }),
        }
    }

    fn transform_to_type(&mut self, c: char, line: usize, col: usize) -> Result<LexerTokenKind, LexerError> {
        match c {
            ':' => Ok(LexerTokenKind::Colon),
            '#' | ';' => {
                let mut comment = String::new();
                self.consume_while(&mut comment, |c| c != '\n');
                Ok(LexerTokenKind::Comment(comment.trim().to_string()))
            }
            '-' | '0'..='9' => self.lex_integer(c, line, col),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                self.consume_while(&mut ident, |c| c.is_ascii_alphanumeric() || c == '_');
                Ok(LexerTokenKind::Identifier(ident))
            }
            character => Err(LexerError::UnexpectedCharacter {
                character,
                line,
                col,
            }),
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace();

        let (line, col) = (self.cur_line, self.cur_col);
        let kind = match self.consume_char() {
            Some(c) => self.transform_to_type(c, line, col)?,
            None => LexerTokenKind::EOF,
        };

        Ok(Token { kind, line, col })
    }

    /// Lex the whole input, stopping at the first error
    pub fn collect_results(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut v = vec![];
        loop {
            match self.next_token() {
                Ok(Token {
                    kind: LexerTokenKind::EOF,
                    ..
                }) => return Ok(v),
                Err(e) => return Err(e),
                Ok(tok) => v.push(tok),
            }
        }
    }
}
