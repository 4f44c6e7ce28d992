//! # Transposer
//!
//! Post-processes a [`crate::events::CompileOutput`] already produced by
//! [`crate::eval::evaluate`], shifting every sounding pitch by a fixed number
//! of semitones. Rests, timing, velocity and channel are untouched; the
//! metronome and meta-event streams aren't pitched at all, so they pass
//! through unchanged too.
//!
//! Grounded on `original_source/parser.py`'s `MidiEvaluator.transpose_output`:
//! a pure pass over the already-evaluated note list, not a re-walk of the AST.

use crate::error::{Result, TbonError};
use crate::events::{CompileOutput, NoteEvent};

/// Shifts every note in `output` by `semitones` (positive = up, negative =
/// down). Returns a `TbonError::Range` if any resulting pitch would fall
/// outside the 0-127 MIDI range, rather than silently clamping or wrapping.
pub fn transpose(output: &CompileOutput, semitones: i32) -> Result<CompileOutput> {
    let mut result = output.clone();
    for part in result.parts.iter_mut() {
        for note in part.iter_mut() {
            transpose_note(note, semitones)?;
        }
    }
    Ok(result)
}

fn transpose_note(note: &mut NoteEvent, semitones: i32) -> Result<()> {
    let Some(pitch) = note.pitch else {
        return Ok(());
    };
    let shifted = pitch as i32 + semitones;
    note.pitch = Some(u8::try_from(shifted).map_err(|_| TbonError::Range {
        what: "pitch",
        value: shifted.to_string(),
    })?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::evaluate;
    use crate::parser::parse;

    fn compile(source: &str) -> CompileOutput {
        evaluate(&parse(source).unwrap()).unwrap()
    }

    #[test]
    fn shifts_every_pitch_by_the_given_interval() {
        let out = compile("c d |");
        let transposed = transpose(&out, 2).unwrap();
        assert_eq!(transposed.parts[0][0].pitch, Some(62));
        assert_eq!(transposed.parts[0][1].pitch, Some(64));
    }

    #[test]
    fn rests_are_left_alone() {
        let out = compile("c z |");
        let transposed = transpose(&out, -12).unwrap();
        assert_eq!(transposed.parts[0][1].pitch, None);
    }

    #[test]
    fn timing_velocity_and_channel_are_unaffected() {
        let out = compile("c d |");
        let transposed = transpose(&out, 7).unwrap();
        for (before, after) in out.parts[0].iter().zip(&transposed.parts[0]) {
            assert_eq!(before.start, after.start);
            assert_eq!(before.end, after.end);
            assert_eq!(before.velocity, after.velocity);
            assert_eq!(before.channel, after.channel);
        }
    }

    #[test]
    fn out_of_range_result_is_a_range_error() {
        let out = compile("c |");
        assert!(matches!(transpose(&out, -70), Err(TbonError::Range { .. })));
    }

    #[test]
    fn metronome_and_meta_are_untouched() {
        let out = compile("c d |");
        let transposed = transpose(&out, 5).unwrap();
        assert_eq!(transposed.metronome, out.metronome);
        assert_eq!(transposed.meta, out.meta);
    }
}
