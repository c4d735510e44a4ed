//! Error types for Stata `.dta` parsing.

use thiserror::Error;

/// Errors that can occur when reading a `.dta` file.
#[derive(Debug, Error)]
pub enum DtaError {
    /// The file does not open with the `<stata_dta>` tag.
    ///
    /// Releases before 117 use a binary header without tags and are not
    /// supported.
    #[error("Not a Stata dta file (release 117 or later): missing <stata_dta> header")]
    NotDta,

    /// The release number is not one this reader understands.
    #[error("Unsupported dta release {0}; supported releases are 117, 118 and 119")]
    UnsupportedRelease(String),

    /// The byte order marker is neither `MSF` nor `LSF`.
    #[error("Invalid byte order '{0}' (expected MSF or LSF)")]
    InvalidByteOrder(String),

    /// An expected XML-style section tag was not found.
    #[error("Expected tag {tag} at byte offset {offset}")]
    MissingTag { tag: String, offset: usize },

    /// A variable type code outside the documented set.
    #[error("Unknown type code {code} for variable {index}")]
    UnknownType { code: u16, index: usize },

    /// The file ends before a field that the header promises.
    #[error("Truncated dta file: needed {needed} bytes at offset {offset}, file has {len}")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    /// A strL cell refers to an entry that is not in the `<strls>` table.
    #[error("strL reference (v={v}, o={o}) in variable '{variable}' has no matching entry")]
    MissingStrl { variable: String, v: u32, o: u64 },

    /// I/O error while reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure assembling the DataFrame.
    #[error("Failed to build DataFrame: {0}")]
    Polars(#[from] polars::error::PolarsError),
}
