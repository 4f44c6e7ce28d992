//! # Parser
//!
//! Recursive-descent parser over the token stream produced by
//! [`crate::lexer`]. The grammar is small enough that ordered-choice
//! lookahead is just "look at the next token (and whether it's glued to the
//! previous one)"; no backtracking is needed anywhere in it.

use crate::ast::*;
use crate::error::{Result, TbonError};
use crate::lexer::{tokenize, LocatedToken, Token};

pub fn parse(source: &str) -> Result<Score> {
    let tokens = tokenize(source)?;
    let mut p = Parser { tokens, pos: 0 };
    p.parse_score()
}

struct Parser {
    tokens: Vec<LocatedToken>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&LocatedToken> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> LocatedToken {
        let t = self.tokens[self.pos].clone();
        self.pos += 1;
        t
    }

    fn err_here(&self, message: impl Into<String>) -> TbonError {
        let (line, column) = self
            .peek()
            .map(|t| (t.line, t.column))
            .unwrap_or((0, 0));
        TbonError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    fn parse_score(&mut self) -> Result<Score> {
        let mut items = Vec::new();
        while let Some(located) = self.peek() {
            match &located.token {
                Token::PartSwitch(n) => {
                    let n = *n;
                    self.bump();
                    items.push(ScoreItem::PartSwitch(n));
                }
                _ => items.push(ScoreItem::Bar(self.parse_bar()?)),
            }
        }
        Ok(Score { items })
    }

    fn parse_bar(&mut self) -> Result<Bar> {
        let span = self
            .peek()
            .map(|t| Span { line: t.line, column: t.column })
            .unwrap_or_default();
        let mut items = Vec::new();
        loop {
            let located = self
                .peek()
                .ok_or_else(|| self.err_here("unexpected end of input inside a bar"))?;
            match &located.token {
                Token::Pipe | Token::Colon => {
                    self.bump();
                    break;
                }
                _ if is_meta_start(&located.token) => {
                    items.push(BarItem::Meta(self.parse_meta()?));
                }
                Token::PartSwitch(_) | Token::RParen => {
                    return Err(self.err_here("unexpected token inside a bar"));
                }
                _ => items.push(BarItem::Beat(self.parse_beat()?)),
            }
        }
        Ok(Bar { items, span })
    }

    fn parse_meta(&mut self) -> Result<Meta> {
        let located = self.bump();
        Ok(match located.token {
            Token::BeatSpecTok(b) => Meta::BeatSpec(b),
            Token::KeyTok(k) => Meta::Key(k),
            Token::TempoTok(v) => Meta::Tempo(v),
            Token::RelativeTempoTok(v) => Meta::RelativeTempo(v),
            Token::VelocityTok(v) => Meta::Velocity(v),
            Token::DeEmphasisTok(v) => Meta::DeEmphasis(v),
            Token::ChannelTok(c) => Meta::Channel(c),
            _ => unreachable!("parse_meta called on a non-meta token"),
        })
    }

    fn parse_beat(&mut self) -> Result<Beat> {
        let span = self
            .peek()
            .map(|t| Span { line: t.line, column: t.column })
            .unwrap_or_default();
        let mut subbeats = vec![self.parse_subbeat()?];
        while let Some(located) = self.peek() {
            if located.glued && is_subbeat_start(&located.token) {
                subbeats.push(self.parse_subbeat()?);
            } else {
                break;
            }
        }
        Ok(Beat { subbeats, span })
    }

    fn parse_subbeat(&mut self) -> Result<SubBeat> {
        if matches!(self.peek().map(|t| &t.token), Some(Token::Hold)) {
            self.bump();
            return Ok(SubBeat::Hold);
        }
        Ok(SubBeat::Extendable(self.parse_extendable()?))
    }

    fn parse_extendable(&mut self) -> Result<Extendable> {
        match self.peek().map(|t| &t.token) {
            Some(Token::Rest) => {
                self.bump();
                Ok(Extendable::Rest)
            }
            Some(Token::ChordStart) => {
                self.bump();
                let mut tones = vec![self.parse_chorditem()?];
                while !matches!(self.peek().map(|t| &t.token), Some(Token::RParen)) {
                    if self.peek().is_none() {
                        return Err(self.err_here("unterminated chord"));
                    }
                    tones.push(self.parse_chorditem()?);
                }
                self.bump();
                if tones.len() < 2 {
                    return Err(self.err_here("a chord needs at least two tones"));
                }
                Ok(Extendable::Chord(tones))
            }
            Some(Token::RollStart) => {
                self.bump();
                let mut tones = vec![self.parse_pitch()?];
                while !matches!(self.peek().map(|t| &t.token), Some(Token::RParen)) {
                    if self.peek().is_none() {
                        return Err(self.err_here("unterminated roll"));
                    }
                    tones.push(self.parse_pitch()?);
                }
                self.bump();
                if tones.len() < 2 {
                    return Err(self.err_here("a roll needs at least two tones"));
                }
                Ok(Extendable::Roll(tones))
            }
            Some(Token::OrnamentStart) => {
                self.bump();
                let mut tones = vec![self.parse_pitch()?];
                while !matches!(self.peek().map(|t| &t.token), Some(Token::RParen)) {
                    if self.peek().is_none() {
                        return Err(self.err_here("unterminated ornament"));
                    }
                    tones.push(self.parse_pitch()?);
                }
                self.bump();
                if tones.len() < 2 {
                    return Err(self.err_here("an ornament needs at least two tones"));
                }
                Ok(Extendable::Ornament(tones))
            }
            _ => Ok(Extendable::Pitch(self.parse_pitch()?)),
        }
    }

    fn parse_chorditem(&mut self) -> Result<ChordItem> {
        match self.peek().map(|t| &t.token) {
            Some(Token::Hold) => {
                self.bump();
                Ok(ChordItem::Hold)
            }
            Some(Token::Rest) => {
                self.bump();
                Ok(ChordItem::Rest)
            }
            _ => Ok(ChordItem::Pitch(self.parse_pitch()?)),
        }
    }

    fn parse_pitch(&mut self) -> Result<PitchNode> {
        let span = self
            .peek()
            .map(|t| Span { line: t.line, column: t.column })
            .ok_or_else(|| self.err_here("expected a pitch"))?;
        let mut octave_shift = 0;
        loop {
            match self.peek().map(|t| &t.token) {
                Some(Token::OctaveUp) => {
                    self.bump();
                    octave_shift += 1;
                }
                Some(Token::OctaveDown) => {
                    self.bump();
                    octave_shift -= 1;
                }
                _ => break,
            }
        }
        let alteration = match self.peek().map(|t| &t.token) {
            Some(Token::DoubleSharp) => {
                self.bump();
                Some(Alteration::Delta(2))
            }
            Some(Token::Sharp) => {
                self.bump();
                Some(Alteration::Delta(1))
            }
            Some(Token::DoubleFlat) => {
                self.bump();
                Some(Alteration::Delta(-2))
            }
            Some(Token::Flat) => {
                self.bump();
                Some(Alteration::Delta(-1))
            }
            Some(Token::Natural) => {
                self.bump();
                Some(Alteration::Cancel)
            }
            _ => None,
        };
        let name = match self.peek().map(|t| &t.token) {
            Some(Token::PitchName(c)) => *c,
            _ => return Err(self.err_here("expected a pitch name (a-g or 1-7)")),
        };
        self.bump();
        Ok(PitchNode {
            octave_shift,
            alteration,
            name,
            span,
        })
    }
}

fn is_meta_start(t: &Token) -> bool {
    matches!(
        t,
        Token::BeatSpecTok(_)
            | Token::KeyTok(_)
            | Token::TempoTok(_)
            | Token::RelativeTempoTok(_)
            | Token::VelocityTok(_)
            | Token::DeEmphasisTok(_)
            | Token::ChannelTok(_)
    )
}

fn is_subbeat_start(t: &Token) -> bool {
    matches!(
        t,
        Token::Hold
            | Token::ChordStart
            | Token::RollStart
            | Token::OrnamentStart
            | Token::Rest
            | Token::OctaveUp
            | Token::OctaveDown
            | Token::DoubleSharp
            | Token::Sharp
            | Token::DoubleFlat
            | Token::Flat
            | Token::Natural
            | Token::PitchName(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_bar() {
        let score = parse("#d - - - |").unwrap();
        assert_eq!(score.items.len(), 1);
        match &score.items[0] {
            ScoreItem::Bar(bar) => assert_eq!(bar.items.len(), 4),
            _ => panic!("expected a bar"),
        }
    }

    #[test]
    fn glued_subbeats_form_one_beat() {
        let score = parse("-e - |").unwrap();
        let ScoreItem::Bar(bar) = &score.items[0] else { panic!() };
        assert_eq!(bar.items.len(), 2);
        let BarItem::Beat(first) = &bar.items[0] else { panic!() };
        assert_eq!(first.subbeats.len(), 2);
    }

    #[test]
    fn partswitch_is_recognized_between_bars() {
        let score = parse("P=1 c | P=2 //ce |").unwrap();
        assert_eq!(score.items.len(), 4);
        assert!(matches!(score.items[0], ScoreItem::PartSwitch(1)));
        assert!(matches!(score.items[2], ScoreItem::PartSwitch(2)));
    }

    #[test]
    fn chord_of_one_tone_is_a_parse_error() {
        assert!(parse("(a) |").is_err());
    }

    #[test]
    fn unterminated_comment_is_a_syntax_error() {
        assert!(parse("/* oops").is_err());
    }
}
