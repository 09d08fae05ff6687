//! Loader for the text-based **Wavefront** geometry format.
//!
//! This crate is intentionally dependency-free so geometry can be validated by
//! offline tools without pulling in any engine or GPU code.
//!
//! # Structure
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`model`] | `Wavefront`, `Face`, `FaceVertex` |
//! | [`error`] | `ParseError`, `LoadError` |
//! | [`lexer`] | line/word splitting with source positions |
//! | [`parser`] | `parse_str` entry point |
//!
//! # Quick start
//!
//! ```rust
//! use helium_wavefront::parse_str;
//!
//! let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
//!
//! let obj = parse_str(src).unwrap();
//! assert_eq!(obj.index_list(), vec![0, 1, 2]);
//! ```

pub mod error;
pub mod lexer;
pub mod model;
pub mod parser;

use std::path::Path;

pub use error::{LoadError, ParseError};
pub use model::{Face, FaceVertex, Wavefront};
pub use parser::parse_str;

/// Reads and parses a geometry file.
pub fn load(path: impl AsRef<Path>) -> Result<Wavefront, LoadError> {
    let src = std::fs::read_to_string(path)?;
    Ok(parse_str(&src)?)
}
