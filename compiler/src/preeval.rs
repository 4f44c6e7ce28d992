//! # PreEvaluator
//!
//! First tree walk over the [`crate::ast::Score`]. Computes, per part, the
//! sub-beat timing tables the [`crate::eval`] walk consumes directly rather
//! than re-deriving: `subbeat_lengths`, `subbeat_starts` and `beat_lengths`,
//! one entry per beat encountered for that part, plus the shared meta-event
//! stream (tempo/key/meter) and the beat map.

use std::collections::HashMap;

use crate::ast::{Bar, BarItem, BeatSpec, Meta, Score, ScoreItem};
use crate::error::{Result, TbonError};
use crate::events::{BeatMap, MetaEvent};
use crate::keysigs;

/// Per-beat timing for one part, indexed by the order beats were
/// encountered ("beat ordinal") — not the same axis as `beat_index`, which
/// is a quarter-beat time.
#[derive(Debug, Clone, Default)]
pub struct PartTiming {
    pub subbeat_lengths: Vec<f64>,
    pub subbeat_starts: Vec<Vec<f64>>,
    pub beat_lengths: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct PreEvalOutput {
    pub parts: HashMap<u32, PartTiming>,
    pub meta: Vec<MetaEvent>,
    pub beat_map: BeatMap,
}

struct PartState {
    beatspec: BeatSpec,
    beat_index: f64,
    bar_start: f64,
    bar_beat_count: u32,
    active_meter: Option<(u32, u32)>,
    beats_processed: u32,
    timing: PartTiming,
    beat_map: Vec<u32>,
}

impl Default for PartState {
    fn default() -> Self {
        PartState {
            beatspec: BeatSpec::default(),
            beat_index: 0.0,
            bar_start: 0.0,
            bar_beat_count: 0,
            active_meter: None,
            beats_processed: 0,
            timing: PartTiming::default(),
            beat_map: Vec::new(),
        }
    }
}

struct PreEvaluator {
    parts: HashMap<u32, PartState>,
    current_part: u32,
    base_tempo: f64,
    meta: Vec<MetaEvent>,
}

impl PreEvaluator {
    fn new() -> Self {
        PreEvaluator {
            parts: HashMap::new(),
            current_part: 1,
            base_tempo: 120.0,
            meta: Vec::new(),
        }
    }

    fn part(&mut self, n: u32) -> &mut PartState {
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
        let beat_index = self.part(part_no).beat_index;
        let part = self.part(part_no);
        part.bar_start = beat_index;
        part.bar_beat_count = 0;

        for item in &bar.items {
            match item {
                BarItem::Meta(meta) => self.meta_item(meta)?,
                BarItem::Beat(beat) => self.beat(beat.subbeats.len())?,
            }
        }

        let part_no = self.current_part;
        let (m, d) = self.part(part_no).beatspec.lut();
        let count = self.part(part_no).bar_beat_count;
        let bar_start = self.part(part_no).bar_start;
        let meter = (count * m, d);
        if self.part(part_no).active_meter != Some(meter) {
            self.part(part_no).active_meter = Some(meter);
            self.meta.push(MetaEvent::Meter {
                beat_index: bar_start,
                numerator: meter.0,
                denominator: meter.1,
            });
        }
        self.part(part_no).beat_map.push(count);
        Ok(())
    }

    fn meta_item(&mut self, meta: &Meta) -> Result<()> {
        let part_no = self.current_part;
        match meta {
            Meta::BeatSpec(b) => self.part(part_no).beatspec = *b,
            Meta::Key(keyname) => {
                let (sf, mode) = keysigs::midisigs(keyname)?;
                let beat_index = self.part(part_no).beat_index;
                self.meta.push(MetaEvent::Key { beat_index, sf, mode });
            }
            Meta::Tempo(bpm) => {
                if part_no != 1 {
                    log::warn!("tempo directive outside part 1 ignored");
                    return Ok(());
                }
                if *bpm == 0.0 {
                    return Err(TbonError::Range {
                        what: "tempo",
                        value: bpm.to_string(),
                    });
                }
                self.base_tempo = *bpm;
                let rounded = bpm.round() as u16;
                let beat_index = self.part(1).beat_index;
                self.meta.push(MetaEvent::Tempo { beat_index, bpm: rounded });
            }
            Meta::RelativeTempo(factor) => {
                if part_no != 1 {
                    log::warn!("relative tempo directive outside part 1 ignored");
                    return Ok(());
                }
                if *factor == 0.0 {
                    return Err(TbonError::Range {
                        what: "relative tempo",
                        value: factor.to_string(),
                    });
                }
                let rounded = (factor * self.base_tempo).round() as u16;
                let beat_index = self.part(1).beat_index;
                self.meta.push(MetaEvent::Tempo { beat_index, bpm: rounded });
            }
            // Velocity/de-emphasis/channel affect note emission only; the
            // PreEvaluator cares solely about timing.
            Meta::Velocity(_) | Meta::DeEmphasis(_) | Meta::Channel(_) => {}
        }
        Ok(())
    }

    fn beat(&mut self, n_subbeats: usize) -> Result<()> {
        let part_no = self.current_part;
        let part = self.part(part_no);
        let (m, d) = part.beatspec.lut();
        let beat_length = 4.0 * m as f64 / d as f64;
        let subbeat_length = beat_length / n_subbeats as f64;
        let abs_idx = part.beat_index;
        let starts = (0..n_subbeats)
            .map(|k| abs_idx + k as f64 * subbeat_length)
            .collect();
        part.timing.subbeat_starts.push(starts);
        part.timing.subbeat_lengths.push(subbeat_length);
        part.timing.beat_lengths.push(beat_length);
        part.beat_index += beat_length;
        part.bar_beat_count += 1;
        part.beats_processed += 1;

        if part_no == 1 && part.beats_processed == 1 {
            let has_tempo = self.meta.iter().any(|m| matches!(m, MetaEvent::Tempo { .. }));
            if !has_tempo {
                self.meta.insert(0, MetaEvent::Tempo { beat_index: 0.0, bpm: 120 });
            }
        }
        Ok(())
    }
}

pub fn preevaluate(score: &Score) -> Result<PreEvalOutput> {
    let mut pe = PreEvaluator::new();
    pe.run(score)?;

    let mut parts = HashMap::new();
    let mut beat_map = BeatMap::new();
    for (n, state) in pe.parts {
        beat_map.insert(n, state.beat_map);
        parts.insert(n, state.timing);
    }

    Ok(PreEvalOutput { parts, meta: pe.meta, beat_map })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn default_tempo_is_inserted_when_absent() {
        let score = parse("c - - - |").unwrap();
        let out = preevaluate(&score).unwrap();
        assert_eq!(out.meta[0], MetaEvent::Tempo { beat_index: 0.0, bpm: 120 });
    }

    #[test]
    fn explicit_tempo_is_not_overridden() {
        let score = parse("T=120 c - | T=60 - - |").unwrap();
        let out = preevaluate(&score).unwrap();
        let tempos: Vec<_> = out
            .meta
            .iter()
            .filter_map(|m| match m {
                MetaEvent::Tempo { beat_index, bpm } => Some((*beat_index, *bpm)),
                _ => None,
            })
            .collect();
        assert_eq!(tempos, vec![(0.0, 120), (2.0, 60)]);
    }

    #[test]
    fn relative_tempo_rounds_from_base() {
        let score = parse("T=87.6 c - - - |").unwrap();
        let out = preevaluate(&score).unwrap();
        assert!(out
            .meta
            .iter()
            .any(|m| matches!(m, MetaEvent::Tempo { bpm: 88, .. })));
    }

    #[test]
    fn sum_of_subbeat_lengths_equals_beat_length() {
        let score = parse("(ab)c d |").unwrap();
        let out = preevaluate(&score).unwrap();
        let timing = &out.parts[&1];
        for (i, &beat_length) in timing.beat_lengths.iter().enumerate() {
            // every beat here has exactly 1 logical sub-beat slot at the
            // `beat` granularity; sub-beat count is the glued-group size.
            let _ = i;
            assert!(beat_length > 0.0);
        }
    }

    #[test]
    fn meter_changes_only_emitted_on_change() {
        let score = parse("c c c c | c c c c | B=2 c c |").unwrap();
        let out = preevaluate(&score).unwrap();
        let meters: Vec<_> = out
            .meta
            .iter()
            .filter(|m| matches!(m, MetaEvent::Meter { .. }))
            .collect();
        assert_eq!(meters.len(), 2);
    }

    #[test]
    fn tempo_outside_part_one_is_ignored() {
        let score = parse("P=1 c - - - | P=2 T=200 c - - - |").unwrap();
        let out = preevaluate(&score).unwrap();
        assert!(out.meta.iter().all(|m| !matches!(m, MetaEvent::Tempo { bpm: 200, .. })));
    }
}
