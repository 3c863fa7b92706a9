//! Object files and raw memory images.
//!
//! Both formats are plain text: whitespace-separated hexadecimal words with no
//! prefix. Object files written by the assembler put every word on one line as
//! four uppercase digits, so any object file is also a valid memory image.

use crate::machine::errors::VMError;
use crate::machine::isa::Word;
use std::fs;
use std::path::{Path, PathBuf};

/// File extension of assembled object files.
pub const OBJECT_EXTENSION: &str = "lc";

/// Renders words as the single-line object text (`0241 E000 002A`).
pub fn to_object_text(words: &[Word]) -> String {
    words
        .iter()
        .map(|word| format!("{word:04X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a raw memory image.
///
/// Fails with [`VMError::InvalidToken`] on the first token that is not a
/// 16-bit hexadecimal number; `index` counts words from zero.
pub fn parse_image(text: &str) -> Result<Vec<Word>, VMError> {
    text.split_whitespace()
        .enumerate()
        .map(|(index, token)| {
            token
                .bytes()
                .all(|b| b.is_ascii_hexdigit())
                .then(|| Word::from_str_radix(token, 16).ok())
                .flatten()
                .ok_or_else(|| VMError::InvalidToken {
                    token: token.to_string(),
                    index,
                })
        })
        .collect()
}

/// Writes `words` as an object file.
pub fn write_object_file<P: AsRef<Path>>(path: P, words: &[Word]) -> Result<(), VMError> {
    let path = path.as_ref();
    let mut text = to_object_text(words);
    text.push('\n');
    fs::write(path, text).map_err(|e| io_error(path, e))
}

/// Reads a memory image or object file.
pub fn read_image_file<P: AsRef<Path>>(path: P) -> Result<Vec<Word>, VMError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    parse_image(&text)
}

/// Default object path for a source file: `prog.s` becomes `prog.lc`.
pub fn object_path_for(source: &Path) -> PathBuf {
    source.with_extension(OBJECT_EXTENSION)
}

fn io_error(path: &Path, err: std::io::Error) -> VMError {
    VMError::IoError {
        path: path.display().to_string(),
        source: err.to_string(),
    }
}
