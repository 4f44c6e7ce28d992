//! Command-line driver: reads one or more `.tba`/`.tbn` files, compiles each
//! with the `tbon` library, and writes a Standard MIDI File next to it.
//!
//! File extension selects the pitch alphabet the source is written in
//! (`.tba` -> alphabetic `cdefgab`, `.tbn` -> numeric `1234567`); the
//! alphabet itself is fixed by the lexer/parser, so the extension here is
//! only used to validate the file was meant for this compiler.

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use tbon::events::{CompileOutput, MetaEvent, NoteEvent};
use tbon::keysigs::Mode;
use tbon::{compile, compile_transposed, TbonError};

mod report;

/// Ticks per quarter note. Arbitrary but generous; matches common SMF
/// defaults (e.g. the `LjungrennAudio` MIDI generator this crate's `midly`
/// usage is grounded on).
const PPQN: u16 = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetronomeMode {
    Music,
    MetronomeOnly,
    Both,
}

struct Options {
    transpose: i32,
    first_bar: u32,
    quiet: bool,
    verbose: bool,
    metronome: MetronomeMode,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            transpose: 0,
            first_bar: 0,
            quiet: false,
            verbose: false,
            metronome: MetronomeMode::Music,
        }
    }
}

fn usage() -> ! {
    eprintln!(
        "Usage: tbon [--transpose <semitones>] [--first-bar <n>] [--quiet] [--verbose] \
         [--metronome <music|metronome|both>] <input.tba|input.tbn>..."
    );
    process::exit(1);
}

fn main() {
    env_logger::init();

    let mut options = Options::default();
    let mut files = Vec::new();
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--transpose" => {
                let value = args.next().unwrap_or_else(|| usage());
                options.transpose = value.parse().unwrap_or_else(|_| {
                    eprintln!("invalid --transpose value '{value}'");
                    process::exit(1);
                });
            }
            "--first-bar" => {
                let value = args.next().unwrap_or_else(|| usage());
                options.first_bar = value.parse().unwrap_or_else(|_| {
                    eprintln!("invalid --first-bar value '{value}'");
                    process::exit(1);
                });
            }
            "--quiet" => options.quiet = true,
            "--verbose" => options.verbose = true,
            "--metronome" => {
                let value = args.next().unwrap_or_else(|| usage());
                options.metronome = match value.as_str() {
                    "music" => MetronomeMode::Music,
                    "metronome" => MetronomeMode::MetronomeOnly,
                    "both" => MetronomeMode::Both,
                    _ => {
                        eprintln!("invalid --metronome value '{value}'");
                        process::exit(1);
                    }
                };
            }
            other => files.push(other.to_string()),
        }
    }

    if files.is_empty() {
        usage();
    }

    for path in &files {
        if let Err(e) = process_file(path, &options) {
            eprintln!("Error processing '{path}': {e}");
            process::exit(1);
        }
    }
}

fn process_file(path: &str, options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if ext != "tba" && ext != "tbn" {
        return Err("file extension must be .tba or .tbn".into());
    }

    println!("Processing {path}");
    let source = fs::read_to_string(path)?;
    if !options.quiet {
        println!("{source}");
    }

    let output = if options.transpose != 0 {
        compile_transposed(&source, options.transpose)
    } else {
        compile(&source)
    }
    .map_err(|e: TbonError| format!("compilation error: {e}"))?;

    if options.verbose {
        println!("{output:#?}");
    }

    let out_path = Path::new(path).with_extension("mid");
    write_midi(&output, &out_path, options.metronome)?;
    println!("Created {}", out_path.display());

    if !options.quiet {
        for part_number in &output.part_numbers {
            if let Some(beats) = output.beat_map.get(part_number) {
                report::print_beat_map(*part_number, beats, options.first_bar);
            }
        }
    }
    Ok(())
}

fn write_midi(
    output: &CompileOutput,
    path: &Path,
    mode: MetronomeMode,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut tracks = vec![meta_track(&output.meta)];

    if matches!(mode, MetronomeMode::Music | MetronomeMode::Both) {
        for notes in &output.parts {
            tracks.push(note_track(notes));
        }
    }
    if matches!(mode, MetronomeMode::MetronomeOnly | MetronomeMode::Both) {
        tracks.push(note_track(&output.metronome));
    }

    let header = Header::new(Format::MultiTrack, Timing::Metrical(PPQN.into()));
    let smf = Smf { header, tracks };
    smf.save(path)?;
    Ok(())
}

fn to_ticks(beat_index: f64) -> u32 {
    (beat_index * PPQN as f64).round().max(0.0) as u32
}

/// MIDI's meter denominator is a power-of-two exponent, not the raw value.
fn denominator_power(denominator: u32) -> u8 {
    match denominator {
        1 => 0,
        2 => 1,
        4 => 2,
        8 => 3,
        16 => 4,
        other => {
            log::warn!("unusual meter denominator {other}; defaulting to quarter-note base");
            2
        }
    }
}

/// So the MIDI metronome click matches the beat unit, including compound
/// meters. Ported from `original_source/tbon.py`'s `make_midi`.
fn clocks_per_click(numerator: u32, denominator: u32) -> u8 {
    if denominator == 8 && numerator % 3 == 0 {
        36
    } else if denominator == 2 {
        48
    } else {
        24
    }
}

fn meta_track(meta: &[MetaEvent]) -> Vec<TrackEvent<'static>> {
    let mut events: Vec<(u32, TrackEventKind<'static>)> = meta
        .iter()
        .map(|m| match *m {
            MetaEvent::Tempo { beat_index, bpm } => {
                let micros_per_quarter = 60_000_000u32 / (bpm as u32).max(1);
                (
                    to_ticks(beat_index),
                    TrackEventKind::Meta(MetaMessage::Tempo(micros_per_quarter.into())),
                )
            }
            MetaEvent::Key { beat_index, sf, mode } => (
                to_ticks(beat_index),
                TrackEventKind::Meta(MetaMessage::KeySignature(sf, mode == Mode::Minor)),
            ),
            MetaEvent::Meter { beat_index, numerator, denominator } => (
                to_ticks(beat_index),
                TrackEventKind::Meta(MetaMessage::TimeSignature(
                    numerator as u8,
                    denominator_power(denominator),
                    clocks_per_click(numerator, denominator),
                    8,
                )),
            ),
        })
        .collect();
    events.sort_by_key(|(tick, _)| *tick);
    into_delta_track(events)
}

fn note_track(notes: &[NoteEvent]) -> Vec<TrackEvent<'static>> {
    let mut events: Vec<(u32, TrackEventKind<'static>)> = Vec::with_capacity(notes.len() * 2);
    for note in notes {
        let Some(pitch) = note.pitch else { continue };
        let start = to_ticks(note.start);
        let end = to_ticks(note.end).max(start + 1);
        let velocity = (note.velocity.clamp(0.0, 1.0) * 127.0).round() as u8;
        let channel = note.channel.saturating_sub(1).min(15);
        events.push((
            start,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOn { key: pitch.into(), vel: velocity.into() },
            },
        ));
        events.push((
            end,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOff { key: pitch.into(), vel: 0.into() },
            },
        ));
    }
    events.sort_by_key(|(tick, _)| *tick);
    into_delta_track(events)
}

fn into_delta_track(events: Vec<(u32, TrackEventKind<'static>)>) -> Vec<TrackEvent<'static>> {
    let mut track = Vec::with_capacity(events.len() + 1);
    let mut last_tick = 0u32;
    for (tick, kind) in events {
        let delta = tick.saturating_sub(last_tick);
        last_tick = tick;
        track.push(TrackEvent { delta: delta.into(), kind });
    }
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}
