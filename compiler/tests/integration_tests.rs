//! Integration tests for the TBON compiler.
//!
//! Exercises the full `parse -> evaluate` pipeline against the literal
//! end-to-end scenarios and boundary cases.

use tbon::{compile, evaluate, parse, transpose, TbonError};

fn first_part_pitches(source: &str) -> Vec<Option<u8>> {
    let out = compile(source).unwrap();
    out.parts[0].iter().map(|n| n.pitch).collect()
}

#[test]
fn held_sharp_produces_one_four_beat_note() {
    assert_eq!(first_part_pitches("#d - - - |"), vec![Some(63)]);
}

#[test]
fn tempo_change_mid_note_does_not_split_it() {
    let out = compile("T=120 #d - | T=60 - - |").unwrap();
    assert_eq!(out.parts[0].len(), 1);
    assert!((out.parts[0][0].end - 4.0).abs() < 1e-9);
}

#[test]
fn chord_then_hold_then_separate_pitch() {
    let pitches = first_part_pitches("(ab)- c |");
    assert_eq!(pitches, vec![Some(57), Some(59), Some(60)]);
}

#[test]
fn roll_of_five_tones_staggers_starts_and_shares_end() {
    let out = compile("(:abcde) - |").unwrap();
    let part = &out.parts[0];
    assert_eq!(part.len(), 5);
    for n in part {
        assert!((n.end - 2.0).abs() < 1e-9);
    }
    for w in part.windows(2) {
        assert!(w[0].start < w[1].start);
    }
}

#[test]
fn parts_accumulate_independently() {
    let out = compile("P=1 c | P=2 //ce |").unwrap();
    assert_eq!(out.part_numbers, vec![1, 2]);
    assert_eq!(out.part(1).unwrap()[0].pitch, Some(60));
    assert_eq!(out.part(2).unwrap()[0].pitch, Some(36));
}

#[test]
fn a_metronome_downbeat_and_offbeat_are_distinguished() {
    let out = compile("c c c c |").unwrap();
    let pitches: Vec<_> = out.metronome.iter().map(|n| n.pitch).collect();
    assert_eq!(pitches[0], Some(76));
    assert!(pitches[1..].iter().all(|p| *p == Some(77)));
}

#[test]
fn unknown_key_signature_is_an_error() {
    assert!(matches!(compile("K=G# c |"), Err(TbonError::UnknownKey(_))));
}

#[test]
fn chordrest_with_no_open_voice_is_structural() {
    assert!(matches!(compile("(_a) |"), Err(TbonError::Structural(_))));
}

#[test]
fn malformed_source_is_a_syntax_error() {
    assert!(matches!(compile("(a) |"), Err(TbonError::Syntax { .. })));
}

#[test]
fn transposing_the_compiled_output_shifts_every_pitch() {
    let score = parse("c d |").unwrap();
    let out = evaluate(&score).unwrap();
    let shifted = transpose(&out, 12).unwrap();
    assert_eq!(shifted.parts[0][0].pitch, Some(72));
    assert_eq!(shifted.parts[0][1].pitch, Some(74));
}

#[test]
fn every_bar_sub_beat_durations_sum_to_the_bar_length() {
    let out = compile("c c c c | c c |").unwrap();
    let part = &out.parts[0];
    let total: f64 = part.iter().map(|n| n.end - n.start).sum();
    assert!((total - 6.0).abs() < 1e-9);
}
