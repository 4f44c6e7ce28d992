//! # Evaluator
//!
//! Second tree walk over the [`crate::ast::Score`], consuming
//! [`crate::preeval::PreEvalOutput`]'s per-beat timing tables and producing
//! the final per-part note streams, the metronome track and the meta-event
//! stream. This is the largest component: chord/roll/ornament state
//! machines, the octave nearest-neighbor rule, per-bar accidentals and
//! per-key alteration all live here.
//!
//! `pending_alteration`, listed as separate processing state in the
//! reference design, isn't needed as its own field: the parser attaches an
//! accidental directly to the [`crate::ast::PitchNode`] it modifies, so
//! there's no intervening walk step across which a "pending" value would
//! need to survive.

use std::collections::HashMap;

use crate::ast::{
    Alteration, Bar, BarItem, Beat, ChordItem, Extendable, Meta, PitchNode, Score, ScoreItem,
    SubBeat,
};
use crate::error::{Result, TbonError};
use crate::events::{CompileOutput, NoteEvent};
use crate::keysigs;
use crate::preeval::{self, PreEvalOutput};

const PITCH_ORDER: &str = "cdefgab";
const SEMITONES: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

fn pitch_index_and_semitone(name: char) -> Option<(i32, i32)> {
    if name.is_ascii_digit() && ('1'..='7').contains(&name) {
        let idx = name as i32 - '1' as i32;
        Some((idx, SEMITONES[idx as usize]))
    } else {
        PITCH_ORDER
            .find(name)
            .map(|pos| (pos as i32, SEMITONES[pos]))
    }
}

fn pitch_index(name: char) -> Option<i32> {
    pitch_index_and_semitone(name).map(|(i, _)| i)
}

/// Implicit octave shift to keep the pitch at `i1` as close as possible to
/// the one at `i0` (spec.md §4.4's nearest-neighbor rule).
fn octave_change_by_index(i0: i32, i1: i32) -> i32 {
    let d_index = i1 - i0;
    let interval = 1 + d_index.rem_euclid(7);
    if interval == 1 {
        return 0;
    }
    let higher = interval < 5;
    match (higher, d_index.signum()) {
        (true, 1) => 0,
        (true, -1) => 1,
        (false, 1) => -1,
        _ => 0,
    }
}

#[cfg(test)]
fn octave_change(prev: char, next: char) -> i32 {
    let i0 = pitch_index(prev).unwrap();
    let i1 = pitch_index(next).unwrap();
    octave_change_by_index(i0, i1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EvalMode {
    Note,
    Chord,
    Roll,
    Ornament,
}

/// A note is a downbeat iff it falls on the first beat of its bar, and
/// additionally (depending on mode) the first tone/sub-beat of that beat.
fn is_downbeat(mode: EvalMode, chord_tone_count: u32, bar_beat_index: u32, bar_subbeat_index: u32) -> bool {
    if bar_beat_index != 0 {
        return false;
    }
    match mode {
        EvalMode::Chord => true,
        EvalMode::Roll | EvalMode::Ornament => chord_tone_count == 0,
        EvalMode::Note => bar_subbeat_index == 0,
    }
}

struct PartState {
    octave: i32,
    last_pitchname: Option<char>,
    bar_accidentals: HashMap<(char, i32), i32>,
    keyname: String,
    velocity: f32,
    de_emphasis: f32,
    channel: u8,
    mode_state: EvalMode,
    chord_tone_count: u32,
    prior_chord_tone_count: u32,
    open_notes: Vec<NoteEvent>,
    output: Vec<NoteEvent>,
    bar_beat_index: u32,
    bar_subbeat_index: u32,
    beat_ordinal: usize,
}

impl Default for PartState {
    fn default() -> Self {
        PartState {
            octave: 5,
            last_pitchname: None,
            bar_accidentals: HashMap::new(),
            keyname: "C".to_string(),
            velocity: 0.8,
            de_emphasis: 1.0,
            channel: 1,
            mode_state: EvalMode::Note,
            chord_tone_count: 0,
            prior_chord_tone_count: 0,
            open_notes: Vec::new(),
            output: Vec::new(),
            bar_beat_index: 0,
            bar_subbeat_index: 0,
            beat_ordinal: 0,
        }
    }
}

struct Evaluator<'a> {
    pre: &'a PreEvalOutput,
    parts: HashMap<u32, PartState>,
    current_part: u32,
    metronome: Vec<NoteEvent>,
}

impl<'a> Evaluator<'a> {
    fn new(pre: &'a PreEvalOutput) -> Self {
        Evaluator {
            pre,
            parts: HashMap::new(),
            current_part: 1,
            metronome: Vec::new(),
        }
    }

    fn part_mut(&mut self, n: u32) -> &mut PartState {
        self.parts.entry(n).or_default()
    }

    fn run(&mut self, score: &Score) -> Result<()> {
        for item in &score.items {
            match item {
                ScoreItem::PartSwitch(n) => self.current_part = *n,
                ScoreItem::Bar(bar) => self.bar(bar)?,
            }
        }
        Ok(())
    }

    fn bar(&mut self, bar: &Bar) -> Result<()> {
        let part_no = self.current_part;
        {
            let part = self.part_mut(part_no);
            part.bar_accidentals.clear();
            part.bar_beat_index = 0;
        }
        for item in &bar.items {
            match item {
                BarItem::Meta(meta) => self.meta(meta)?,
                BarItem::Beat(beat) => self.beat(beat)?,
            }
        }
        Ok(())
    }

    fn meta(&mut self, meta: &Meta) -> Result<()> {
        let part_no = self.current_part;
        match meta {
            Meta::BeatSpec(_) | Meta::Tempo(_) | Meta::RelativeTempo(_) => {
                // Timing was already resolved by the PreEvaluator; nothing
                // for the note/metronome walk to do here.
            }
            Meta::Key(keyname) => {
                keysigs::midisigs(keyname)?;
                self.part_mut(part_no).keyname = keyname.clone();
            }
            Meta::Velocity(v) => {
                if !(0.0..=1.0).contains(v) {
                    return Err(TbonError::Range { what: "velocity", value: v.to_string() });
                }
                self.part_mut(part_no).velocity = *v as f32;
            }
            Meta::DeEmphasis(x) => {
                if !(0.0..=1.0).contains(x) {
                    return Err(TbonError::Range { what: "de_emphasis", value: x.to_string() });
                }
                self.part_mut(part_no).de_emphasis = (1.0 - x) as f32;
            }
            Meta::Channel(c) => {
                if !(1..=16).contains(c) {
                    return Err(TbonError::Range { what: "channel", value: c.to_string() });
                }
                self.part_mut(part_no).channel = *c as u8;
            }
        }
        Ok(())
    }

    fn beat(&mut self, beat: &Beat) -> Result<()> {
        let part_no = self.current_part;

        if part_no == 1 {
            self.emit_metronome()?;
        }

        let bo = self.part_mut(part_no).beat_ordinal;
        for (i, sb) in beat.subbeats.iter().enumerate() {
            self.part_mut(part_no).bar_subbeat_index = i as u32;
            self.subbeat(part_no, bo, i, sb)?;
        }

        let part = self.part_mut(part_no);
        part.bar_beat_index += 1;
        part.beat_ordinal += 1;
        Ok(())
    }

    fn emit_metronome(&mut self) -> Result<()> {
        let pre = self.pre;
        let bo = self.part_mut(1).beat_ordinal;
        let timing = pre
            .parts
            .get(&1)
            .ok_or_else(|| TbonError::Structural("part 1 has no timing data".to_string()))?;
        let start = timing.subbeat_starts[bo][0];
        let end = start + timing.beat_lengths[bo];

        let part = self.part_mut(1);
        let downbeat = part.bar_beat_index == 0;
        let velocity = if downbeat { part.velocity } else { part.velocity * part.de_emphasis };
        let pitch = if downbeat { 76 } else { 77 };
        self.metronome.push(NoteEvent {
            pitch: Some(pitch),
            start,
            end,
            velocity,
            channel: 10,
        });
        Ok(())
    }

    fn subbeat(&mut self, part_no: u32, bo: usize, idx: usize, sb: &SubBeat) -> Result<()> {
        let pre = self.pre;
        let timing = pre.parts.get(&part_no).ok_or_else(|| {
            TbonError::Structural(format!("part {part_no} has no timing data"))
        })?;
        let sub_start = timing.subbeat_starts[bo][idx];
        let sub_len = timing.subbeat_lengths[bo];
        match sb {
            SubBeat::Hold => {
                self.hold(part_no, sub_start, sub_len);
                Ok(())
            }
            SubBeat::Extendable(ext) => self.extendable(part_no, ext, sub_start, sub_len),
        }
    }

    fn hold(&mut self, part_no: u32, sub_start: f64, sub_len: f64) {
        let part = self.part_mut(part_no);
        let new_end = sub_start + sub_len;
        for n in part.open_notes.iter_mut() {
            n.end = new_end;
        }
    }

    fn extendable(&mut self, part_no: u32, ext: &Extendable, sub_start: f64, sub_len: f64) -> Result<()> {
        match ext {
            Extendable::Pitch(p) => self.plain_pitch(part_no, p, sub_start, sub_len),
            Extendable::Rest => {
                self.plain_rest(part_no, sub_start, sub_len);
                Ok(())
            }
            Extendable::Chord(items) => self.chord(part_no, items, sub_start, sub_len),
            Extendable::Roll(pitches) => self.roll(part_no, pitches, sub_start, sub_len),
            Extendable::Ornament(pitches) => self.ornament(part_no, pitches, sub_start, sub_len),
        }
    }

    /// Resolves octave, accidental and key alteration for `p`, returning the
    /// MIDI pitch, velocity and channel of the note it produces. Mutates
    /// `octave`/`last_pitchname`/`bar_accidentals` as a side effect, exactly
    /// like the reference's `pitchname` handler.
    fn resolve_pitch(&mut self, part_no: u32, p: &PitchNode) -> Result<(u8, f32, u8)> {
        let part = self.part_mut(part_no);

        let (new_index, base_semitone) = pitch_index_and_semitone(p.name)
            .ok_or_else(|| TbonError::Structural(format!("'{}' is not a valid pitchname", p.name)))?;
        // The reference evaluator seeds its "prior pitchname" with the
        // alphabet's own first degree (`c`, or `1` in numeric mode) rather
        // than leaving it unset, so even the very first pitch of a score
        // gets an implicit octave placement relative to that degree.
        let prev_index = part
            .last_pitchname
            .and_then(pitch_index)
            .unwrap_or(0);

        let mut octave = part.octave + p.octave_shift;
        octave += octave_change_by_index(prev_index, new_index);
        if !(0..=10).contains(&octave) {
            return Err(TbonError::Range { what: "octave", value: octave.to_string() });
        }

        let bar_alt = match p.alteration {
            Some(Alteration::Cancel) => {
                part.bar_accidentals.insert((p.name, octave), 0);
                Some(0)
            }
            Some(Alteration::Delta(d)) => {
                part.bar_accidentals.insert((p.name, octave), d as i32);
                Some(d as i32)
            }
            None => part.bar_accidentals.get(&(p.name, octave)).copied(),
        };
        let keyname = part.keyname.clone();
        let alteration = keysigs::get_alteration(p.name, &keyname, bar_alt)?;
        let midi = base_semitone + alteration + 12 * octave;
        let pitch = u8::try_from(midi).map_err(|_| TbonError::Range {
            what: "pitch",
            value: midi.to_string(),
        })?;

        let downbeat = is_downbeat(part.mode_state, part.chord_tone_count, part.bar_beat_index, part.bar_subbeat_index);
        let velocity = if downbeat { part.velocity } else { part.velocity * part.de_emphasis };
        let channel = part.channel;

        part.octave = octave;
        part.last_pitchname = Some(p.name);

        Ok((pitch, velocity, channel))
    }

    fn close_open_notes(part: &mut PartState, sub_start: f64) {
        for n in part.open_notes.iter_mut() {
            n.end = sub_start;
        }
        part.output.extend(part.open_notes.drain(..));
    }

    fn plain_pitch(&mut self, part_no: u32, p: &PitchNode, sub_start: f64, sub_len: f64) -> Result<()> {
        let (pitch, velocity, channel) = self.resolve_pitch(part_no, p)?;
        let part = self.part_mut(part_no);
        Self::close_open_notes(part, sub_start);
        part.open_notes.push(NoteEvent {
            pitch: Some(pitch),
            start: sub_start,
            end: sub_start + sub_len,
            velocity,
            channel,
        });
        Ok(())
    }

    fn plain_rest(&mut self, part_no: u32, sub_start: f64, sub_len: f64) {
        let part = self.part_mut(part_no);
        let downbeat = is_downbeat(part.mode_state, part.chord_tone_count, part.bar_beat_index, part.bar_subbeat_index);
        let velocity = if downbeat { part.velocity } else { part.velocity * part.de_emphasis };
        let channel = part.channel;
        Self::close_open_notes(part, sub_start);
        part.open_notes.push(NoteEvent {
            pitch: None,
            start: sub_start,
            end: sub_start + sub_len,
            velocity,
            channel,
        });
    }

    fn chord(&mut self, part_no: u32, items: &[ChordItem], sub_start: f64, sub_len: f64) -> Result<()> {
        {
            let part = self.part_mut(part_no);
            if part.prior_chord_tone_count == 0 {
                Self::close_open_notes(part, sub_start);
            }
            part.mode_state = EvalMode::Chord;
            part.chord_tone_count = 0;
        }

        for item in items {
            let idx = self.part_mut(part_no).chord_tone_count as usize;
            match item {
                ChordItem::Pitch(p) => {
                    let (pitch, velocity, channel) = self.resolve_pitch(part_no, p)?;
                    let part = self.part_mut(part_no);
                    let new_note = NoteEvent {
                        pitch: Some(pitch),
                        start: sub_start,
                        end: sub_start + sub_len,
                        velocity,
                        channel,
                    };
                    if idx < part.open_notes.len() {
                        part.open_notes[idx].end = sub_start;
                        let closed = part.open_notes[idx];
                        part.output.push(closed);
                        part.open_notes[idx] = new_note;
                    } else {
                        part.open_notes.push(new_note);
                    }
                }
                ChordItem::Hold => {
                    let part = self.part_mut(part_no);
                    if idx >= part.open_notes.len() {
                        return Err(TbonError::Structural(
                            "chordhold has no prior chord voice to extend".to_string(),
                        ));
                    }
                    part.open_notes[idx].end = sub_start + sub_len;
                }
                ChordItem::Rest => {
                    let part = self.part_mut(part_no);
                    if idx >= part.open_notes.len() {
                        return Err(TbonError::Structural(
                            "chordrest has no prior chord voice to displace".to_string(),
                        ));
                    }
                    let downbeat = is_downbeat(part.mode_state, part.chord_tone_count, part.bar_beat_index, part.bar_subbeat_index);
                    let velocity = if downbeat { part.velocity } else { part.velocity * part.de_emphasis };
                    let channel = part.channel;
                    part.open_notes[idx].end = sub_start;
                    let closed = part.open_notes[idx];
                    part.output.push(closed);
                    part.open_notes[idx] = NoteEvent {
                        pitch: None,
                        start: sub_start,
                        end: sub_start + sub_len,
                        velocity,
                        channel,
                    };
                }
            }
            self.part_mut(part_no).chord_tone_count += 1;
        }

        let part = self.part_mut(part_no);
        let final_count = part.chord_tone_count as usize;
        if part.open_notes.len() > final_count {
            let leftovers = part.open_notes.split_off(final_count);
            for mut n in leftovers {
                n.end = sub_start;
                part.output.push(n);
            }
        }
        part.mode_state = EvalMode::Note;
        part.prior_chord_tone_count = part.chord_tone_count;
        part.chord_tone_count = 0;
        Ok(())
    }

    fn roll(&mut self, part_no: u32, pitches: &[PitchNode], sub_start: f64, sub_len: f64) -> Result<()> {
        {
            let part = self.part_mut(part_no);
            Self::close_open_notes(part, sub_start);
            part.mode_state = EvalMode::Roll;
            part.chord_tone_count = 0;
        }
        for p in pitches {
            let (pitch, velocity, channel) = self.resolve_pitch(part_no, p)?;
            let part = self.part_mut(part_no);
            part.open_notes.push(NoteEvent {
                pitch: Some(pitch),
                start: sub_start,
                end: sub_start + sub_len,
                velocity,
                channel,
            });
            part.chord_tone_count += 1;
        }
        let part = self.part_mut(part_no);
        let n = part.open_notes.len().max(1);
        let step = sub_len / n as f64;
        for (i, note) in part.open_notes.iter_mut().enumerate() {
            note.start = sub_start + i as f64 * step;
            note.end = sub_start + sub_len;
        }
        part.mode_state = EvalMode::Note;
        part.prior_chord_tone_count = part.chord_tone_count;
        part.chord_tone_count = 0;
        Ok(())
    }

    fn ornament(&mut self, part_no: u32, pitches: &[PitchNode], sub_start: f64, sub_len: f64) -> Result<()> {
        {
            let part = self.part_mut(part_no);
            Self::close_open_notes(part, sub_start);
            part.mode_state = EvalMode::Ornament;
            part.chord_tone_count = 0;
        }
        for p in pitches {
            let (pitch, velocity, channel) = self.resolve_pitch(part_no, p)?;
            let part = self.part_mut(part_no);
            part.open_notes.push(NoteEvent {
                pitch: Some(pitch),
                start: sub_start,
                end: sub_start + sub_len,
                velocity,
                channel,
            });
            part.chord_tone_count += 1;
        }
        let part = self.part_mut(part_no);
        let n = part.open_notes.len().max(1);
        let step = sub_len / n as f64;
        for (i, note) in part.open_notes.iter_mut().enumerate() {
            note.start = sub_start + i as f64 * step;
            note.end = note.start + step;
        }
        if n > 1 {
            let last = part.open_notes.split_off(n - 1);
            part.output.extend(part.open_notes.drain(..));
            part.open_notes = last;
        }
        part.mode_state = EvalMode::Note;
        part.prior_chord_tone_count = part.chord_tone_count;
        part.chord_tone_count = 0;
        Ok(())
    }

    fn finish(mut self) -> CompileOutput {
        let mut part_numbers: Vec<u32> = self.parts.keys().copied().collect();
        part_numbers.sort_unstable();
        let mut parts = Vec::with_capacity(part_numbers.len());
        for &n in &part_numbers {
            let mut state = self.parts.remove(&n).unwrap();
            state.output.extend(state.open_notes.drain(..));
            state
                .output
                .sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap());
            parts.push(state.output);
        }
        self.metronome
            .sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap());
        CompileOutput {
            parts,
            part_numbers,
            metronome: self.metronome,
            meta: self.pre.meta.clone(),
            beat_map: self.pre.beat_map.clone(),
        }
    }
}

/// Runs both passes: the PreEvaluator followed by the Evaluator.
pub fn evaluate(score: &Score) -> Result<CompileOutput> {
    let pre = preeval::preevaluate(score)?;
    evaluate_with_preeval(score, &pre)
}

/// Runs just the Evaluator over an already-computed [`PreEvalOutput`].
pub fn evaluate_with_preeval(score: &Score, pre: &PreEvalOutput) -> Result<CompileOutput> {
    let mut ev = Evaluator::new(pre);
    ev.run(score)?;
    Ok(ev.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn notes(source: &str) -> Vec<NoteEvent> {
        let score = parse(source).unwrap();
        evaluate(&score).unwrap().parts.remove(0)
    }

    fn approx(notes: &[NoteEvent], expected: &[(Option<u8>, f64, f64)]) {
        assert_eq!(notes.len(), expected.len(), "{notes:?}");
        for (n, e) in notes.iter().zip(expected) {
            assert_eq!(n.pitch, e.0);
            assert!((n.start - e.1).abs() < 1e-9, "{notes:?} vs {expected:?}");
            assert!((n.end - e.2).abs() < 1e-9, "{notes:?} vs {expected:?}");
        }
    }

    #[test]
    fn scenario_1_held_sharp() {
        approx(&notes("#d - - - |"), &[(Some(63), 0.0, 4.0)]);
    }

    #[test]
    fn scenario_2_flat_then_rest() {
        approx(&notes("@e - | z - |"), &[(Some(63), 0.0, 2.0), (None, 2.0, 4.0)]);
    }

    #[test]
    fn scenario_3_tempo_change_does_not_split_note() {
        approx(&notes("T=120 #d - | T=60 - - |"), &[(Some(63), 0.0, 4.0)]);
    }

    #[test]
    fn scenario_4_chord_then_hold_then_pitch() {
        approx(
            &notes("(ab)- c |"),
            &[(Some(57), 0.0, 1.0), (Some(59), 0.0, 1.0), (Some(60), 1.0, 2.0)],
        );
    }

    #[test]
    fn scenario_5_roll() {
        approx(
            &notes("(:abcde) - |"),
            &[
                (Some(57), 0.0, 2.0),
                (Some(59), 0.2, 2.0),
                (Some(60), 0.4, 2.0),
                (Some(62), 0.6, 2.0),
                (Some(64), 0.8, 2.0),
            ],
        );
    }

    #[test]
    fn scenario_6_key_signature_alphabetic_and_numeric() {
        approx(&notes("K=D c f |"), &[(Some(61), 0.0, 1.0), (Some(66), 1.0, 2.0)]);
        // scale degrees 1 and 4 in D major: D (62) and G (67).
        approx(&notes("K=D 1 4 |"), &[(Some(62), 0.0, 1.0), (Some(67), 1.0, 2.0)]);
    }

    #[test]
    fn scenario_8_parts_are_independent() {
        let score = parse("P=1 c | P=2 //ce |").unwrap();
        let out = evaluate(&score).unwrap();
        assert_eq!(out.part_numbers, vec![1, 2]);
        approx(&out.parts[0], &[(Some(60), 0.0, 1.0)]);
        approx(&out.parts[1], &[(Some(36), 0.0, 0.5), (Some(40), 0.5, 1.0)]);
    }

    #[test]
    fn ornament_flushes_all_but_last() {
        approx(
            &notes("(~ab) - |"),
            &[(Some(57), 0.0, 0.5), (Some(59), 0.5, 2.0)],
        );
    }

    #[test]
    fn chord_of_one_tone_never_reaches_eval() {
        assert!(parse("(a) |").is_err());
    }

    #[test]
    fn chordrest_without_prior_voice_is_structural_error() {
        let score = parse("(_a) |").unwrap();
        assert!(matches!(evaluate(&score), Err(TbonError::Structural(_))));
    }

    #[test]
    fn bar_accidentals_clear_at_barline() {
        // `@d` sets a bar-local flat that also governs the plain `d` right
        // after it; the barline wipes that out, so the `d` in the next bar
        // reads back its natural, unflatted pitch.
        approx(
            &notes("c @d d | d - - |"),
            &[
                (Some(60), 0.0, 1.0),
                (Some(61), 1.0, 2.0),
                (Some(61), 2.0, 3.0),
                (Some(62), 3.0, 6.0),
            ],
        );
    }

    #[test]
    fn octave_change_matches_reference() {
        assert_eq!(octave_change('c', 'c'), 0);
        assert_eq!(octave_change('c', 'b'), -1);
        assert_eq!(octave_change('g', 'c'), 1);
        assert_eq!(octave_change('g', 'b'), 0);
        assert_eq!(octave_change('g', 'd'), 0);
    }

    #[test]
    fn velocity_directive_applies_to_subsequent_notes_only() {
        let score = parse("c V=0.9 d |").unwrap();
        let out = evaluate(&score).unwrap();
        let part = &out.parts[0];
        assert!((part[0].velocity - 0.8).abs() < 1e-6);
        assert!((part[1].velocity - 0.9).abs() < 1e-6);
    }
}
