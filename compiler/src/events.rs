//! # Events
//!
//! Output types shared by [`crate::preeval`] and [`crate::eval`]: the note
//! tuple, the meta-event stream, and the beat map, plus [`CompileOutput`]
//! which bundles everything a caller of [`crate::api::compile`] receives.

use std::collections::HashMap;

use crate::keysigs::Mode;

/// Tolerance used when comparing `start`/`end` times in tests, since beat
/// arithmetic runs over `f64` rather than exact rationals.
pub const EPSILON: f64 = 1e-9;

/// `(pitch, start, end, velocity, channel)`. `pitch` is absent for a rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub pitch: Option<u8>,
    pub start: f64,
    pub end: f64,
    pub velocity: f32,
    pub channel: u8,
}

impl NoteEvent {
    pub fn approx_eq(&self, other: &NoteEvent) -> bool {
        self.pitch == other.pitch
            && (self.start - other.start).abs() < EPSILON
            && (self.end - other.end).abs() < EPSILON
            && (self.velocity - other.velocity).abs() < 1e-6
            && self.channel == other.channel
    }
}

/// A non-note directive tagged with the beat index it takes effect at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetaEvent {
    Tempo { beat_index: f64, bpm: u16 },
    Key { beat_index: f64, sf: i8, mode: Mode },
    Meter { beat_index: f64, numerator: u32, denominator: u32 },
}

/// Part number (1-based) → beat counts per bar, in bar order.
pub type BeatMap = HashMap<u32, Vec<u32>>;

/// Everything the Evaluator produces, bundled for a caller.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// One entry per part, in ascending part-number order.
    pub parts: Vec<Vec<NoteEvent>>,
    /// Part number for each entry of `parts`, same order.
    pub part_numbers: Vec<u32>,
    pub metronome: Vec<NoteEvent>,
    pub meta: Vec<MetaEvent>,
    pub beat_map: BeatMap,
}

impl CompileOutput {
    pub fn part(&self, part_number: u32) -> Option<&[NoteEvent]> {
        self.part_numbers
            .iter()
            .position(|&n| n == part_number)
            .map(|ix| self.parts[ix].as_slice())
    }
}
