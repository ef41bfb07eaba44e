use std::collections::HashMap;
use std::iter::Peekable;

use crate::bytecode::{Instruction, Opcode, Program, Word};
use crate::lexer::{LexerTokenKind, Token};

use super::ParseError;

/// An operand as written, labels can only be resolved once every label is known
enum PendingOperand {
    Integer(i128),
    Label(String),
}

struct Statement {
    opcode: Opcode,
    operand: Option<(PendingOperand, usize, usize)>,
}

pub struct Parser<'a> {
    tokens: Peekable<std::slice::Iter<'a, Token>>,
    capacity: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], capacity: usize) -> Parser<'a> {
        Parser {
            tokens: tokens.iter().peekable(),
            capacity,
        }
    }

    fn skip_comments(&mut self) {
        // we aren't keeping comments in the program
        while let Some(Token {
            kind: LexerTokenKind::Comment(_),
            ..
        }) = self.tokens.peek()
        {
            self.tokens.next();
        }
    }

    fn next_token(&mut self) -> Option<&'a Token> {
        self.skip_comments();
        self.tokens.next()
    }

    fn peek_token(&mut self) -> Option<&'a Token> {
        self.skip_comments();
        self.tokens.peek().copied()
    }

    fn parse_operand(&mut self, opcode: Opcode, line: usize, col: usize) -> Result<Option<(PendingOperand, usize, usize)>, ParseError> {
        let next = self.peek_token();
        if !opcode.takes_operand() {
            return match next {
                Some(Token {
                    kind: LexerTokenKind::Integer(_),
                    line,
                    col,
                }) => Err(ParseError::UnexpectedOperand {
                    opcode,
                    line: *line,
                    col: *col,
                }),
                _ => Ok(None),
            };
        }

        let operand = match next.map(|token| (&token.kind, token.line, token.col)) {
            Some((LexerTokenKind::Integer(value), line, col)) => {
                (PendingOperand::Integer(*value), line, col)
            }
            Some((LexerTokenKind::Identifier(name), line, col))
                if Opcode::from_mnemonic(name).is_none() =>
            {
                (PendingOperand::Label(name.clone()), line, col)
            }
            _ => return Err(ParseError::MissingOperand { opcode, line, col }),
        };
        self.tokens.next();
        Ok(Some(operand))
    }

    /// First pass, returns the statements along with the index of every label
    fn parse_statements(&mut self) -> Result<(Vec<Statement>, HashMap<String, usize>), ParseError> {
        let mut statements = vec![];
        let mut labels = HashMap::new();

        while let Some(token) = self.next_token() {
            let (line, col) = (token.line, token.col);
            let name = match &token.kind {
                LexerTokenKind::Identifier(name) => name,
                LexerTokenKind::EOF => break,
                _ => return Err(ParseError::UnexpectedToken { line, col }),
            };

            if let Some(Token {
                kind: LexerTokenKind::Colon,
                ..
            }) = self.peek_token()
            {
                self.tokens.next();
                if Opcode::from_mnemonic(name).is_some() {
                    return Err(ParseError::ReservedLabel {
                        name: name.clone(),
                        line,
                        col,
                    });
                }
                if labels.insert(name.clone(), statements.len()).is_some() {
                    return Err(ParseError::DuplicateLabel {
                        name: name.clone(),
                        line,
                        col,
                    });
                }
                continue;
            }

            let opcode = Opcode::from_mnemonic(name).ok_or_else(|| ParseError::UnknownMnemonic {
                name: name.clone(),
                line,
                col,
            })?;
            let operand = self.parse_operand(opcode, line, col)?;
            statements.push(Statement { opcode, operand });
        }

        Ok((statements, labels))
    }

    fn resolve(
        statement: Statement,
        labels: &HashMap<String, usize>,
    ) -> Result<Instruction, ParseError> {
        let opcode = statement.opcode;
        let (operand, line, col) = match statement.operand {
            None => return Ok(Instruction::from_parts(opcode, Word::ZERO)),
            Some(operand) => operand,
        };

        let value = match operand {
            PendingOperand::Integer(value) => value,
            PendingOperand::Label(name) => match labels.get(&name) {
                Some(index) => *index as i128,
                None => return Err(ParseError::UndefinedLabel { name, line, col }),
            },
        };

        // push takes either view of a word, addresses are only ever unsigned
        let word = match opcode {
            Opcode::Push if value < 0 => i64::try_from(value).ok().map(Word::from_i64),
            _ => u64::try_from(value).ok().map(Word::from_u64),
        };
        match word {
            Some(word) => Ok(Instruction::from_parts(opcode, word)),
            None => Err(ParseError::OperandOutOfRange {
                opcode,
                value,
                line,
                col,
            }),
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let (statements, labels) = self.parse_statements()?;

        let mut program = Program::with_capacity(self.capacity);
        for statement in statements {
            program.add_inst(Self::resolve(statement, &labels)?)?;
        }
        Ok(program)
    }
}
