//! Stata `.dta` file reader.
//!
//! Reads releases 117 (Stata 13), 118 (Stata 14-18) and 119 (more than
//! 32,767 variables) into a Polars DataFrame.
//!
//! # Module Structure
//!
//! - `error` - Error types for parsing failures
//! - `reader` - Bounds-checked byte cursor with file byte order
//! - `header` - Header, map and variable descriptors
//! - `data` - Observations, strL table and DataFrame assembly
//!
//! Missing values of every numeric type become nulls. Value labels are not
//! applied; labelled variables keep their numeric codes.

pub mod data;
pub mod error;
pub mod header;
pub mod reader;

pub use error::DtaError;

use std::path::Path;

use encoding_rs::WINDOWS_1252;
use log::debug;
use polars::prelude::*;

use self::data::{build_dataframe, read_columns};
use self::header::{parse_header, MAP_DATA};
use self::reader::ByteReader;

/// Format release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    R117,
    R118,
    R119,
}

impl Release {
    /// Width of variable and value-label names
    pub fn name_width(self) -> usize {
        match self {
            Release::R117 => 33,
            _ => 129,
        }
    }

    pub fn format_width(self) -> usize {
        match self {
            Release::R117 => 49,
            _ => 57,
        }
    }

    pub fn label_width(self) -> usize {
        match self {
            Release::R117 => 81,
            _ => 321,
        }
    }

    /// Width of one sortlist entry
    pub fn sortlist_width(self) -> usize {
        match self {
            Release::R119 => 4,
            _ => 2,
        }
    }

    /// Bytes of the `v` part of an 8-byte strL reference
    pub fn strl_v_width(self) -> usize {
        match self {
            Release::R117 => 4,
            Release::R118 => 2,
            Release::R119 => 3,
        }
    }

    /// Release 117 text is Windows-1252; later releases are UTF-8.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Release::R117 => WINDOWS_1252.decode(bytes).0.into_owned(),
            _ => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Storage type of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    /// Fixed-width string of the given byte length
    Str(usize),
    StrL,
    Double,
    Float,
    Long,
    Int,
    Byte,
}

impl VarType {
    pub fn is_string(self) -> bool {
        matches!(self, VarType::Str(_) | VarType::StrL)
    }

    /// Bytes one cell occupies in `<data>`
    pub fn width(self) -> usize {
        match self {
            VarType::Str(width) => width,
            VarType::StrL | VarType::Double => 8,
            VarType::Float | VarType::Long => 4,
            VarType::Int => 2,
            VarType::Byte => 1,
        }
    }
}

/// Variable descriptor
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub var_type: VarType,
    pub format: String,
    pub label: String,
}

/// Parsed header and descriptors
#[derive(Debug, Clone)]
pub struct DtaHeader {
    pub release: Release,
    pub big_endian: bool,
    pub nobs: u64,
    pub label: String,
    pub timestamp: String,
    /// Section offsets from `<map>`
    pub map: [u64; 14],
    pub variables: Vec<Variable>,
}

/// Parse a complete `.dta` image held in memory.
pub fn read_dta(bytes: &[u8]) -> Result<DataFrame, DtaError> {
    let mut reader = ByteReader::new(bytes);
    let header = parse_header(&mut reader)?;
    debug!(
        "dta release {:?}: {} variables, {} observations",
        header.release,
        header.variables.len(),
        header.nobs
    );

    reader.seek(header.map[MAP_DATA] as usize)?;
    let values = read_columns(&mut reader, &header)?;
    build_dataframe(&header, values)
}

/// Load a `.dta` file into a DataFrame.
pub fn load_dta(path: &Path) -> Result<DataFrame, DtaError> {
    let bytes = std::fs::read(path)?;
    read_dta(&bytes)
}

/// Header and variable descriptors without reading observations.
pub fn read_dta_header(path: &Path) -> Result<DtaHeader, DtaError> {
    let bytes = std::fs::read(path)?;
    let mut reader = ByteReader::new(&bytes);
    parse_header(&mut reader)
}
