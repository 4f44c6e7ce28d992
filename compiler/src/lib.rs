//! # TBON Music Notation Compiler
//!
//! A text-based music notation language compiler that turns TBON source text
//! into timed note events, a metronome track and a meta-event stream.
//!
//! ## Compilation pipeline
//!
//! ```text
//! source text → Lexer → Parser → PreEvaluator → Evaluator → CompileOutput
//! ```
//!
//! 1. **Lexer** ([`lexer`]) - tokenizes source text, tracking line/column and
//!    whether each token is glued to its predecessor.
//! 2. **Parser** ([`parser`]) - recursive-descent parse into the [`ast`] tree.
//! 3. **PreEvaluator** ([`preeval`]) - first walk: per-part sub-beat timing
//!    tables and the shared tempo/key/meter meta stream.
//! 4. **Evaluator** ([`eval`]) - second walk: resolves pitches, accidentals
//!    and chord/roll/ornament state into the final note streams.
//! 5. **Transposer** ([`transpose`]) - optional post-pass shifting the
//!    evaluated output by a fixed number of semitones.
//!
//! ## Quick start
//!
//! ```rust
//! use tbon::compile;
//!
//! let output = compile("#d - - - |")?;
//! assert_eq!(output.parts[0][0].pitch, Some(63));
//! # Ok::<(), tbon::TbonError>(())
//! ```
//!
//! ## Module structure
//!
//! - [`ast`] - AST node types and the recursive-descent `Parser`
//! - [`error`] - `TbonError` variants
//! - [`lexer`] - tokenization
//! - [`parser`] - `parse()`, producing a [`ast::Score`]
//! - [`keysigs`] - the key signature table and `get_alteration`
//! - [`events`] - `NoteEvent`, `MetaEvent`, `BeatMap`, `CompileOutput`
//! - [`preeval`] - the PreEvaluator
//! - [`eval`] - the Evaluator
//! - [`transpose`] - the Transposer
//! - [`api`] - `compile()` convenience entry points

pub mod ast;
pub mod error;
pub mod events;
pub mod eval;
pub mod keysigs;
pub mod lexer;
pub mod parser;
pub mod preeval;
pub mod transpose;

pub mod api;

pub use error::{Result, TbonError};
pub use events::{BeatMap, CompileOutput, MetaEvent, NoteEvent};
pub use parser::parse;
pub use preeval::{preevaluate, PreEvalOutput};
pub use eval::{evaluate, evaluate_with_preeval};
pub use transpose::transpose;

pub use api::{compile, compile_transposed};
