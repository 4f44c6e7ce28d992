//! Property-based tests over randomly generated TBON programs, bounded to
//! the grammar's legal alphabet, checking invariants `spec.md` §8 states in
//! prose rather than as literal numeric examples.

use proptest::prelude::*;
use tbon::{compile, transpose};

const PITCHES: &[char] = &['c', 'd', 'e', 'f', 'g', 'a', 'b'];

/// One beat: either a rest or a plain pitch, never glued to another
/// sub-beat. Kept to this subset so the generated source is always
/// well-formed without needing a full grammar-aware generator.
fn beat_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("z".to_string()),
        (0..PITCHES.len()).prop_map(|i| PITCHES[i].to_string()),
    ]
}

fn bar_strategy(min_beats: usize, max_beats: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(beat_strategy(), min_beats..=max_beats)
        .prop_map(|beats| format!("{} |", beats.join(" ")))
}

proptest! {
    /// Every bar of quarter-note beats under the default `B=4` spec sums its
    /// note durations to exactly one beat-length (1.0) per beat, regardless
    /// of how many rests vs. pitches it contains.
    #[test]
    fn sub_beat_durations_sum_to_the_bar_length(bar in bar_strategy(1, 8)) {
        // A long enough run of pitches can legitimately drift the implicit
        // octave out of the documented 0-10 range; that's a fatal
        // `RangeError` per spec, not a counterexample to this invariant.
        let n_beats = bar.split_whitespace().count() - 1; // minus the trailing "|"
        let Ok(out) = compile(&bar) else { return Ok(()) };
        let total: f64 = out.parts[0].iter().map(|n| n.end - n.start).sum();
        prop_assert!((total - n_beats as f64).abs() < 1e-9);
    }

    /// Evaluated notes within a part never regress in time.
    #[test]
    fn notes_within_a_part_are_time_ordered(bar in bar_strategy(1, 8)) {
        let Ok(out) = compile(&bar) else { return Ok(()) };
        for w in out.parts[0].windows(2) {
            prop_assert!(w[0].start <= w[1].start);
        }
    }

    /// Transposing up then back down by the same interval is the identity
    /// on pitch, as long as both legs stay within the MIDI byte range.
    #[test]
    fn transpose_round_trips(bar in bar_strategy(1, 4), shift in -6i32..=6) {
        let Ok(out) = compile(&bar) else { return Ok(()) };
        let Ok(up) = transpose(&out, shift) else { return Ok(()) };
        let Ok(back) = transpose(&up, -shift) else { return Ok(()) };
        for (before, after) in out.parts[0].iter().zip(&back.parts[0]) {
            prop_assert_eq!(before.pitch, after.pitch);
        }
    }
}
