use std::iter::Peekable;
use std::num::ParseIntError;
use std::str::Chars;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::trace;
use crate::vm::cell::Cell;
use crate::vm::opcode::{self, Opcode};

use self::ParseErrorType::{*};


/// Parses one top-level S-expression into a flat cell image plus the root
/// cell. Children of a list are emitted contiguously, followed by their
/// parent's references, so every list cell points backward into already
/// written cells; the root cell itself is not part of the image.
pub fn parse(text: &str) -> Result<ParseResult, Vec<ParseError>> {
    let mut parser: Parser = Parser {
        chars: text.chars().peekable(),
        cells: Vec::new(),
        errors: Vec::new(),
        keywords: opcode::keywords(),

        lineno: 0,
    };
    let root: Cell = parser.parse_root();
    if parser.errors.is_empty() {
        Ok(ParseResult { cells: parser.cells, root })
    } else {
        Err(parser.errors)
    }
}


#[derive(Debug)]
pub struct ParseResult {
    pub cells: Vec<Cell>,
    pub root: Cell,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ParseError {
    pub error: ParseErrorType,
    pub lineno: usize,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ParseErrorType {
    UnterminatedList,
    UnexpectedCloseParen,
    InvalidNumericValue(ParseIntError),
}


struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
    cells: Vec<Cell>,
    errors: Vec<ParseError>,
    keywords: IndexMap<&'static str, Opcode, FxBuildHasher>,

    lineno: usize,
}

impl<'a> Parser<'a> {

    fn parse_root(&mut self) -> Cell {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.skip(),
                Some('(') => {
                    self.skip();
                    return self.parse_list();
                },
                Some(')') => {
                    self.skip();
                    self.push_err(UnexpectedCloseParen);
                    return Cell::NULL;
                },
                Some(_) => return self.parse_atom(),
                None => return Cell::NULL,
            }
        }
    }

    /// Invoked after the opening parenthesis has been consumed. Elements are
    /// buffered locally while nested lists flush their own elements first,
    /// then this list's elements are appended in one contiguous run.
    fn parse_list(&mut self) -> Cell {
        let mut elements: Vec<Cell> = Vec::new();
        loop {
            match self.peek() {
                Some(')') => {
                    self.skip();
                    break
                },
                Some('(') => {
                    self.skip();
                    let nested: Cell = self.parse_list();
                    elements.push(nested);
                },
                Some(c) if c.is_whitespace() => self.skip(),
                Some(_) => {
                    let atom: Cell = self.parse_atom();
                    elements.push(atom);
                },
                None => {
                    self.push_err(UnterminatedList);
                    break
                },
            }
        }
        let list: Cell = Cell::List { ptr: self.cells.len() as u32, len: elements.len() as u32 };
        trace::trace_parser!("flush {} cells at {}", elements.len(), self.cells.len());
        self.cells.extend(elements);
        list
    }

    /// An atom runs until whitespace or a parenthesis. Atoms that look
    /// numeric are screened as integers, everything else goes through the
    /// keyword table.
    fn parse_atom(&mut self) -> Cell {
        let mut buffer: Vec<char> = Vec::new();
        loop {
            match self.peek() {
                Some(c) if !c.is_whitespace() && c != '(' && c != ')' => self.push_advance(&mut buffer),
                _ => break,
            }
        }
        let atom: String = buffer.iter().collect();
        let mut digits = atom.chars();
        let first: Option<char> = digits.next();
        let numeric: bool = match first {
            Some('0'..='9') => true,
            Some('+' | '-') => matches!(digits.next(), Some('0'..='9')),
            _ => false,
        };
        if numeric {
            self.screen_int(&atom)
        } else {
            self.screen_keyword(&atom)
        }
    }

    /// Base-auto integer parsing: `0x` prefix is hexadecimal, a leading zero
    /// is octal, anything else is decimal. An optional sign precedes the
    /// prefix.
    fn screen_int(&mut self, atom: &str) -> Cell {
        let (digits, sign): (&str, i64) = match atom.strip_prefix('-') {
            Some(rest) => (rest, -1),
            None => (atom.strip_prefix('+').unwrap_or(atom), 1),
        };
        let parsed: Result<i64, ParseIntError> = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16)
        } else if digits.len() > 1 && digits.starts_with('0') {
            i64::from_str_radix(&digits[1..], 8)
        } else {
            digits.parse::<i64>()
        };
        match parsed {
            Ok(value) => Cell::Num(sign * value),
            Err(e) => {
                self.push_err(InvalidNumericValue(e));
                Cell::Num(0)
            },
        }
    }

    fn screen_keyword(&mut self, atom: &str) -> Cell {
        match self.keywords.get(atom) {
            Some(op) => Cell::Num(op.as_num()),
            None => {
                trace::trace_parser!("unknown keyword '{}'", atom);
                Cell::Num(opcode::UNKNOWN_KEYWORD)
            },
        }
    }


    fn push_err(&mut self, error: ParseErrorType) {
        self.errors.push(ParseError {
            error,
            lineno: self.lineno,
        });
    }

    /// Consumes the next character (unconditionally) and adds it to the buffer.
    /// Must only be invoked after `Some()` has been matched to a `peek()` variant.
    fn push_advance(&mut self, buffer: &mut Vec<char>) {
        buffer.push(self.advance().unwrap());
    }

    /// Consumes the next character without returning it.
    fn skip(&mut self) {
        self.advance();
    }

    fn advance(&mut self) -> Option<char> {
        let c: Option<char> = self.chars.next();
        if let Some('\n') = c {
            self.lineno += 1;
        }
        c
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }
}
