//! # Public API
//!
//! Convenience entry points over the four-stage pipeline (lex → parse →
//! pre-evaluate → evaluate), for callers who don't need to drive each stage
//! by hand.
//!
//! ## Typical usage
//!
//! ```rust
//! use tbon::compile;
//!
//! let output = compile("#d - - - |")?;
//! assert_eq!(output.parts[0][0].pitch, Some(63));
//! # Ok::<(), tbon::TbonError>(())
//! ```

use crate::error::Result;
use crate::events::CompileOutput;
use crate::eval::evaluate;
use crate::parser::parse;
use crate::transpose::transpose;

/// Parses and evaluates a full TBON source string in one step.
///
/// # Errors
/// Returns [`crate::TbonError`] at the first syntax, range or structural
/// error encountered; there is no partial output.
pub fn compile(source: &str) -> Result<CompileOutput> {
    let score = parse(source)?;
    evaluate(&score)
}

/// Like [`compile`], transposing the result by `semitones` afterward.
pub fn compile_transposed(source: &str, semitones: i32) -> Result<CompileOutput> {
    let output = compile(source)?;
    transpose(&output, semitones)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_runs_the_full_pipeline() {
        let out = compile("#d - - - |").unwrap();
        assert_eq!(out.parts[0][0].pitch, Some(63));
    }

    #[test]
    fn compile_transposed_shifts_the_result() {
        let out = compile_transposed("c |", 2).unwrap();
        assert_eq!(out.parts[0][0].pitch, Some(62));
    }

    #[test]
    fn syntax_errors_propagate() {
        assert!(compile("(a) |").is_err());
    }
}
