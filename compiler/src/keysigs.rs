//! # Key Signature Table
//!
//! Thirty named keys (fifteen majors, fifteen minors). Case distinguishes
//! mode: an upper-case tonic letter is major, lower-case is minor. `@` means
//! flat, `#` means sharp, matching exactly the raw text the parser captures
//! from a `K=` directive (no further normalization is needed — the grammar's
//! `key` production and this table's keys share the same alphabet).
//!
//! Ported from the reference implementation's `keysigs.py`.

use crate::error::TbonError;

/// Major/minor, carried alongside the signed sharp/flat count in a `Key` meta
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Major,
    Minor,
}

const PITCH_ORDER: &str = "cdefgab";

/// 7-element alteration vector over (c,d,e,f,g,a,b), values in {-1,0,1}.
fn alteration_vector(keyname: &str) -> Option<[i8; 7]> {
    Some(match keyname {
        "C" => [0, 0, 0, 0, 0, 0, 0],
        "G" => [0, 0, 0, 1, 0, 0, 0],
        "D" => [1, 0, 0, 1, 0, 0, 0],
        "A" => [1, 0, 0, 1, 1, 0, 0],
        "E" => [1, 1, 0, 1, 1, 0, 0],
        "B" => [1, 1, 0, 1, 1, 1, 0],
        "F#" => [1, 1, 1, 1, 1, 1, 0],
        "C#" => [1, 1, 1, 1, 1, 1, 1],
        "C@" => [-1, -1, -1, -1, -1, -1, -1],
        "G@" => [-1, -1, -1, 0, -1, -1, -1],
        "D@" => [0, -1, -1, 0, -1, -1, -1],
        "A@" => [0, -1, -1, 0, 0, -1, -1],
        "E@" => [0, 0, -1, 0, 0, -1, -1],
        "B@" => [0, 0, -1, 0, 0, 0, -1],
        "F" => [0, 0, 0, 0, 0, 0, -1],
        "a" => [0, 0, 0, 0, 0, 0, 0],
        "e" => [0, 0, 0, 1, 0, 0, 0],
        "b" => [1, 0, 0, 1, 0, 0, 0],
        "f#" => [1, 0, 0, 1, 1, 0, 0],
        "c#" => [1, 1, 0, 1, 1, 0, 0],
        "g#" => [1, 1, 0, 1, 1, 1, 0],
        "d#" => [1, 1, 1, 1, 1, 1, 0],
        "a#" => [1, 1, 1, 1, 1, 1, 1],
        "a@" => [-1, -1, -1, -1, -1, -1, -1],
        "e@" => [-1, -1, -1, 0, -1, -1, -1],
        "b@" => [0, -1, -1, 0, -1, -1, -1],
        "f" => [0, -1, -1, 0, 0, -1, -1],
        "c" => [0, 0, -1, 0, 0, -1, -1],
        "g" => [0, 0, -1, 0, 0, 0, -1],
        "d" => [0, 0, 0, 0, 0, 0, -1],
        _ => return None,
    })
}

/// Signed semitone offset anchoring numeric pitch `1` to the key's tonic.
fn key_offset(keyname: &str) -> Option<i32> {
    Some(match keyname {
        "C" => 0,
        "G" => -5,
        "D" => 2,
        "A" => -3,
        "E" => 4,
        "B" => -1,
        "F#" => 6,
        "C#" => 1,
        "C@" => -1,
        "G@" => -6,
        "D@" => 1,
        "A@" => -4,
        "E@" => 3,
        "B@" => -2,
        "F" => 5,
        "a" => -3,
        "e" => 4,
        "b" => -1,
        "f#" => 6,
        "c#" => 1,
        "g#" => -4,
        "d#" => 3,
        "a#" => -2,
        "a@" => -4,
        "e@" => 3,
        "b@" => -2,
        "f" => 5,
        "c" => 0,
        "g" => -5,
        "d" => 2,
        _ => return None,
    })
}

fn mode_of(keyname: &str) -> Mode {
    match keyname.chars().next() {
        Some(c) if c.is_lowercase() => Mode::Minor,
        _ => Mode::Major,
    }
}

/// `key_offset_semitones(key)`, as used by numeric-pitch resolution.
pub fn key_offset_semitones(keyname: &str) -> crate::error::Result<i32> {
    key_offset(keyname).ok_or_else(|| TbonError::UnknownKey(keyname.to_string()))
}

/// `MIDISIGS[k] = (sf, mode)`.
pub fn midisigs(keyname: &str) -> crate::error::Result<(i8, Mode)> {
    let vector = alteration_vector(keyname).ok_or_else(|| TbonError::UnknownKey(keyname.to_string()))?;
    let sf: i8 = vector.iter().sum();
    Ok((sf, mode_of(keyname)))
}

/// `get_alteration(pitchname, keyname, bar_alteration)`.
///
/// `pitchname` is either an alphabetic degree in `cdefgab` or a numeric
/// degree in `1234567`. `bar_alteration`, when present, is the already
/// resolved semitone delta recorded in the current bar's accidental table
/// (an explicit natural is recorded as `Some(0)`, distinct from "absent").
pub fn get_alteration(
    pitchname: char,
    keyname: &str,
    bar_alteration: Option<i32>,
) -> crate::error::Result<i32> {
    if pitchname.is_ascii_alphabetic() {
        if let Some(v) = bar_alteration {
            return Ok(v);
        }
        let idx = PITCH_ORDER
            .find(pitchname)
            .expect("pitchname already validated against the alphabetic order");
        let vector = alteration_vector(keyname).ok_or_else(|| TbonError::UnknownKey(keyname.to_string()))?;
        Ok(vector[idx] as i32)
    } else {
        let mut alteration = key_offset_semitones(keyname)?;
        match bar_alteration {
            Some(v) => alteration += v,
            None => {
                if mode_of(keyname) == Mode::Minor {
                    let degree = pitchname.to_digit(10).expect("numeric pitchname") as i32;
                    if matches!(degree, 3 | 6 | 7) {
                        alteration -= 1;
                    }
                }
            }
        }
        Ok(alteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midisigs_matches_reference() {
        assert_eq!(midisigs("a").unwrap(), (0, Mode::Minor));
        assert_eq!(midisigs("a@").unwrap(), (-7, Mode::Minor));
        assert_eq!(midisigs("A").unwrap(), (3, Mode::Major));
        assert_eq!(midisigs("A@").unwrap(), (-4, Mode::Major));
    }

    #[test]
    fn alteration_matches_reference() {
        assert_eq!(get_alteration('c', "C", None).unwrap(), 0);
        assert_eq!(get_alteration('c', "D", None).unwrap(), 1);
        assert_eq!(get_alteration('c', "a@", None).unwrap(), -1);
        assert_eq!(get_alteration('1', "C", None).unwrap(), 0);
        assert_eq!(get_alteration('1', "D", None).unwrap(), 2);
        assert_eq!(get_alteration('1', "a@", None).unwrap(), -4);
    }

    #[test]
    fn unknown_key_is_reported() {
        assert!(matches!(midisigs("Zz"), Err(TbonError::UnknownKey(_))));
    }

    #[test]
    fn sf_equals_vector_sum_for_every_key() {
        for key in [
            "C", "G", "D", "A", "E", "B", "F#", "C#", "C@", "G@", "D@", "A@", "E@", "B@", "F",
            "a", "e", "b", "f#", "c#", "g#", "d#", "a#", "a@", "e@", "b@", "f", "c", "g", "d",
        ] {
            let vector = alteration_vector(key).unwrap();
            let (sf, _) = midisigs(key).unwrap();
            assert_eq!(sf as i32, vector.iter().map(|&v| v as i32).sum::<i32>());
        }
    }
}
