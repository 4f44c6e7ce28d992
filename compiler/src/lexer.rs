//! # Lexer
//!
//! Tokenizes TBON source text. Whitespace and comments (`/* ... */`) are
//! consumed silently, but whether any was consumed immediately before a
//! token is recorded as [`LocatedToken::glued`] — the grammar's `bar` rule
//! requires mandatory whitespace between sibling `meta`/`beat` items, which
//! makes whitespace the actual delimiter between beats; sub-beats within one
//! beat are written with no separating whitespace at all. The parser uses
//! `glued` to tell the two apart.

use crate::ast::BeatSpec;
use crate::error::{Result, TbonError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Pipe,           // |
    Colon,          // :
    PartSwitch(u32), // P=<n>
    BeatSpecTok(BeatSpec), // B=...
    KeyTok(String), // K=...
    TempoTok(f64),  // T=...
    RelativeTempoTok(f64), // t=...
    VelocityTok(f64), // V=...
    DeEmphasisTok(f64), // D=...
    ChannelTok(u32), // C=...
    ChordStart,     // (
    RollStart,      // (:
    OrnamentStart,  // (~
    RParen,         // )
    OctaveUp,       // ^
    OctaveDown,     // /
    DoubleSharp,    // ## or U+1D12A
    Sharp,          // # or U+266F
    DoubleFlat,     // @@ or U+1D12B
    Flat,           // @ or U+266D
    Natural,        // % or U+266E
    Rest,           // _ or z
    Hold,           // -
    PitchName(char), // a-g or 1-7
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatedToken {
    pub token: Token,
    pub line: usize,
    pub column: usize,
    /// `false` if whitespace or a comment was skipped immediately before
    /// this token (or it's the first token); `true` if it directly follows
    /// the previous token with no separation.
    pub glued: bool,
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    input: &'a str,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            chars: input.char_indices().peekable(),
            input,
            line: 1,
            column: 1,
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    /// Looks one character past the current one, without consuming either.
    fn peek2(&mut self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().map(|(_, c)| c)
    }

    fn rest_from(&self, idx: usize) -> &'a str {
        &self.input[idx..]
    }

    fn advance(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_ws_and_comments(&mut self) -> Result<bool> {
        let mut skipped = false;
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                    skipped = true;
                }
                Some('/') => {
                    let (idx, _) = *self.chars.peek().unwrap();
                    if self.rest_from(idx).starts_with("/*") {
                        let (line, column) = (self.line, self.column);
                        self.advance();
                        self.advance();
                        skipped = true;
                        let mut closed = false;
                        while let Some(c) = self.peek_char() {
                            let (idx, _) = *self.chars.peek().unwrap();
                            if c == '*' && self.rest_from(idx).starts_with("*/") {
                                self.advance();
                                self.advance();
                                closed = true;
                                break;
                            }
                            self.advance();
                        }
                        if !closed {
                            return Err(TbonError::Syntax {
                                line,
                                column,
                                message: "unterminated comment".to_string(),
                            });
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        Ok(skipped)
    }

    fn read_digits(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        s
    }

    fn read_floatnum(&mut self, line: usize, column: usize) -> Result<f64> {
        let mut s = self.read_digits();
        if self.peek_char() == Some('.') {
            s.push('.');
            self.advance();
            s.push_str(&self.read_digits());
        }
        if s.is_empty() || s == "." {
            return Err(TbonError::Syntax {
                line,
                column,
                message: "expected a number".to_string(),
            });
        }
        s.parse::<f64>().map_err(|_| TbonError::Syntax {
            line,
            column,
            message: format!("invalid number '{s}'"),
        })
    }

    fn read_positive_integer(&mut self, line: usize, column: usize) -> Result<u32> {
        let s = self.read_digits();
        if s.is_empty() {
            return Err(TbonError::Syntax {
                line,
                column,
                message: "expected an integer".to_string(),
            });
        }
        s.parse::<u32>().map_err(|_| TbonError::Syntax {
            line,
            column,
            message: format!("invalid integer '{s}'"),
        })
    }

    fn read_beatspec(&mut self, line: usize, column: usize) -> Result<BeatSpec> {
        for (text, spec) in [
            ("2.", BeatSpec::TwoDotted),
            ("2", BeatSpec::Two),
            ("4.", BeatSpec::FourDotted),
            ("4", BeatSpec::Four),
            ("8.", BeatSpec::EightDotted),
            ("8", BeatSpec::Eight),
        ] {
            if let Some(&(idx, _)) = self.chars.peek() {
                if self.rest_from(idx).starts_with(text) {
                    for _ in 0..text.chars().count() {
                        self.advance();
                    }
                    return Ok(spec);
                }
            }
        }
        Err(TbonError::Syntax {
            line,
            column,
            message: "expected a beat spec (2, 2., 4, 4., 8 or 8.)".to_string(),
        })
    }

    fn read_key(&mut self, line: usize, column: usize) -> Result<String> {
        let letter = self
            .peek_char()
            .filter(|c| "ABCDEFGabcdefg".contains(*c))
            .ok_or_else(|| TbonError::Syntax {
                line,
                column,
                message: "expected a key letter (A-G or a-g) after K=".to_string(),
            })?;
        self.advance();
        let mut key = String::new();
        key.push(letter);
        if matches!(self.peek_char(), Some('@') | Some('#')) {
            key.push(self.advance().unwrap());
        }
        Ok(key)
    }

    /// Returns the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<LocatedToken>> {
        let skipped = self.skip_ws_and_comments()?;
        let (line, column) = (self.line, self.column);
        let c = match self.peek_char() {
            None => return Ok(None),
            Some(c) => c,
        };

        let token = match c {
            '|' => {
                self.advance();
                Token::Pipe
            }
            ':' => {
                self.advance();
                Token::Colon
            }
            '^' => {
                self.advance();
                Token::OctaveUp
            }
            '/' => {
                self.advance();
                Token::OctaveDown
            }
            ')' => {
                self.advance();
                Token::RParen
            }
            '(' => {
                self.advance();
                match self.peek_char() {
                    Some(':') => {
                        self.advance();
                        Token::RollStart
                    }
                    Some('~') => {
                        self.advance();
                        Token::OrnamentStart
                    }
                    _ => Token::ChordStart,
                }
            }
            '#' => {
                self.advance();
                if self.peek_char() == Some('#') {
                    self.advance();
                    Token::DoubleSharp
                } else {
                    Token::Sharp
                }
            }
            '\u{1D12A}' => {
                self.advance();
                Token::DoubleSharp
            }
            '\u{266F}' => {
                self.advance();
                Token::Sharp
            }
            '@' => {
                self.advance();
                if self.peek_char() == Some('@') {
                    self.advance();
                    Token::DoubleFlat
                } else {
                    Token::Flat
                }
            }
            '\u{1D12B}' => {
                self.advance();
                Token::DoubleFlat
            }
            '\u{266D}' => {
                self.advance();
                Token::Flat
            }
            '%' | '\u{266E}' => {
                self.advance();
                Token::Natural
            }
            '_' | 'z' => {
                self.advance();
                Token::Rest
            }
            '-' => {
                self.advance();
                Token::Hold
            }
            'P' if self.peek2() == Some('=') => {
                self.advance();
                self.advance();
                Token::PartSwitch(self.read_positive_integer(line, column)?)
            }
            'B' if self.peek2() == Some('=') => {
                self.advance();
                self.advance();
                Token::BeatSpecTok(self.read_beatspec(line, column)?)
            }
            'K' if self.peek2() == Some('=') => {
                self.advance();
                self.advance();
                Token::KeyTok(self.read_key(line, column)?)
            }
            'T' if self.peek2() == Some('=') => {
                self.advance();
                self.advance();
                Token::TempoTok(self.read_floatnum(line, column)?)
            }
            't' if self.peek2() == Some('=') => {
                self.advance();
                self.advance();
                Token::RelativeTempoTok(self.read_floatnum(line, column)?)
            }
            'V' if self.peek2() == Some('=') => {
                self.advance();
                self.advance();
                Token::VelocityTok(self.read_floatnum(line, column)?)
            }
            'D' if self.peek2() == Some('=') => {
                self.advance();
                self.advance();
                Token::DeEmphasisTok(self.read_floatnum(line, column)?)
            }
            'C' if self.peek2() == Some('=') => {
                self.advance();
                self.advance();
                Token::ChannelTok(self.read_positive_integer(line, column)?)
            }
            'a'..='g' | '1'..='7' => {
                self.advance();
                Token::PitchName(c)
            }
            other => {
                return Err(TbonError::Syntax {
                    line,
                    column,
                    message: format!("unexpected character '{other}'"),
                })
            }
        };

        Ok(Some(LocatedToken {
            token,
            line,
            column,
            glued: !skipped,
        }))
    }
}

/// Tokenizes an entire source string. The very first token is never
/// considered `glued`, since there is no prior token for it to be glued to.
pub fn tokenize(input: &str) -> Result<Vec<LocatedToken>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    let mut first = true;
    while let Some(mut located) = lexer.next_token()? {
        if first {
            located.glued = false;
            first = false;
        }
        tokens.push(located);
    }
    Ok(tokens)
}
