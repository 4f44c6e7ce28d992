//! # Error Types
//!
//! This module defines all error types for the TBON compiler.
//!
//! All errors include location information (line/column) where available, so
//! that a caller can point a user back at the offending source text.
//!
//! ## Error Types
//! - `Syntax` - lexer/parser errors with line and column information
//! - `UnknownKey` - a `K=` directive named a key signature that isn't in the table
//! - `Range` - a value (tempo, velocity, channel, octave, ...) fell outside its valid range
//! - `Structural` - a well-formed-but-meaningless construct, e.g. `chordrest` with no open chord voice
//!
//! ## Usage
//! ```rust
//! use tbon::{compile, TbonError};
//!
//! match compile("#d - - - |") {
//!     Ok(_output) => println!("Success!"),
//!     Err(TbonError::Syntax { line, column, message }) => {
//!         eprintln!("Syntax error at {}:{}: {}", line, column, message);
//!     }
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TbonError {
    /// Malformed source text.
    ///
    /// Occurs during lexing or parsing when the TBON source doesn't match the
    /// grammar at the given position.
    ///
    /// # Example
    /// ```
    /// # use tbon::TbonError;
    /// let err = TbonError::Syntax {
    ///     line: 5,
    ///     column: 10,
    ///     message: "unexpected character 'x'".to_string(),
    /// };
    /// assert_eq!(err.to_string(), "syntax error at line 5, column 10: unexpected character 'x'");
    /// ```
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// A `K=` directive or API call named a key signature absent from
    /// [`crate::keysigs`].
    #[error("unknown key signature: {0}")]
    UnknownKey(String),

    /// A value fell outside its documented range (tempo, velocity,
    /// de-emphasis, channel, octave).
    #[error("{what} out of range: {value}")]
    Range { what: &'static str, value: String },

    /// A structurally meaningless construct, such as a `chordrest` with no
    /// prior chord voice to displace.
    #[error("{0}")]
    Structural(String),
}

pub type Result<T> = std::result::Result<T, TbonError>;
