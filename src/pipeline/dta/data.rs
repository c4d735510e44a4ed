//! Observation data, strL table and conversion to polars columns.

use std::collections::HashMap;

use polars::prelude::*;

use super::reader::ByteReader;
use super::{DtaError, DtaHeader, Release, VarType};

/// Smallest `float` reserved for missing values (`.` is 2^127).
const FLOAT_MISSING: f32 = 1.701_411_8e38;
/// Smallest `double` reserved for missing values (`.` is 2^1023).
const DOUBLE_MISSING: f64 = 8.988_465_674_311_58e307;
const BYTE_MAX: i8 = 100;
const INT_MAX: i16 = 32_740;
const LONG_MAX: i32 = 2_147_483_620;

/// A cell value before strL resolution
enum Cell {
    Number(Option<f64>),
    Text(String),
    StrlRef(u32, u64),
}

/// Column accumulator
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

pub fn byte_value(v: i8) -> Option<f64> {
    (v <= BYTE_MAX).then_some(f64::from(v))
}

pub fn int_value(v: i16) -> Option<f64> {
    (v <= INT_MAX).then_some(f64::from(v))
}

pub fn long_value(v: i32) -> Option<f64> {
    (v <= LONG_MAX).then_some(f64::from(v))
}

pub fn float_value(v: f32) -> Option<f64> {
    (v.is_finite() && v < FLOAT_MISSING).then_some(f64::from(v))
}

pub fn double_value(v: f64) -> Option<f64> {
    (v.is_finite() && v < DOUBLE_MISSING).then_some(v)
}

fn read_cell(
    reader: &mut ByteReader<'_>,
    var_type: VarType,
    release: Release,
) -> Result<Cell, DtaError> {
    let cell = match var_type {
        VarType::Byte => Cell::Number(byte_value(reader.i8()?)),
        VarType::Int => Cell::Number(int_value(reader.i16()?)),
        VarType::Long => Cell::Number(long_value(reader.i32()?)),
        VarType::Float => Cell::Number(float_value(reader.f32()?)),
        VarType::Double => Cell::Number(double_value(reader.f64()?)),
        VarType::Str(width) => {
            let bytes = reader.bytes(width)?;
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(width);
            Cell::Text(release.decode(&bytes[..end]))
        }
        VarType::StrL => {
            let v_width = release.strl_v_width();
            let v = reader.uint_n(v_width)? as u32;
            let o = reader.uint_n(8 - v_width)?;
            Cell::StrlRef(v, o)
        }
    };
    Ok(cell)
}

/// Parse the `<strls>` section into a `(v, o) -> text` table.
pub fn read_strls(
    reader: &mut ByteReader<'_>,
    release: Release,
) -> Result<HashMap<(u32, u64), String>, DtaError> {
    reader.expect_tag("<strls>")?;
    let mut table = HashMap::new();

    while reader.peek_tag("GSO") {
        reader.expect_tag("GSO")?;
        let v = reader.u32()?;
        let o = match release {
            Release::R117 => u64::from(reader.u32()?),
            _ => reader.u64()?,
        };
        let kind = reader.u8()?;
        let len = reader.u32()? as usize;
        let data = reader.bytes(len)?;

        let text = match kind {
            // ASCII strLs carry a trailing NUL
            130 => {
                let trimmed = data.strip_suffix(&[0]).unwrap_or(data);
                release.decode(trimmed)
            }
            _ => String::from_utf8_lossy(data).to_string(),
        };
        table.insert((v, o), text);
    }

    reader.expect_tag("</strls>")?;
    Ok(table)
}

/// Read every observation and resolve strL references.
pub fn read_columns(
    reader: &mut ByteReader<'_>,
    header: &DtaHeader,
) -> Result<Vec<ColumnValues>, DtaError> {
    let release = header.release;

    reader.expect_tag("<data>")?;
    let row_width: usize = header.variables.iter().map(|v| v.var_type.width()).sum();
    let remaining = reader.remaining();
    // N comes from the file: it must fit in the bytes left before any allocation
    let needed = usize::try_from(header.nobs)
        .ok()
        .and_then(|n| n.checked_mul(row_width));
    let nobs = match needed {
        // no variables means no cells to read whatever N says
        _ if row_width == 0 => 0,
        Some(total) if total <= remaining => total / row_width,
        _ => {
            return Err(DtaError::Truncated {
                offset: reader.position(),
                needed: needed.unwrap_or(usize::MAX),
                len: reader.position() + remaining,
            })
        }
    };

    let capacity = nobs.min(remaining / row_width.max(1));
    let mut cells: Vec<Vec<Cell>> = header
        .variables
        .iter()
        .map(|_| Vec::with_capacity(capacity))
        .collect();
    for _ in 0..nobs {
        for (column, variable) in cells.iter_mut().zip(&header.variables) {
            column.push(read_cell(reader, variable.var_type, release)?);
        }
    }
    reader.expect_tag("</data>")?;

    let has_strl = header
        .variables
        .iter()
        .any(|v| v.var_type == VarType::StrL);
    let strls = if has_strl {
        reader.seek(header.map[super::header::MAP_STRLS] as usize)?;
        read_strls(reader, release)?
    } else {
        HashMap::new()
    };

    cells
        .into_iter()
        .zip(&header.variables)
        .map(|(column, variable)| {
            if variable.var_type.is_string() {
                column
                    .into_iter()
                    .map(|cell| match cell {
                        Cell::Text(s) => Ok(Some(s)),
                        Cell::StrlRef(0, 0) => Ok(Some(String::new())),
                        Cell::StrlRef(v, o) => strls
                            .get(&(v, o))
                            .cloned()
                            .map(Some)
                            .ok_or_else(|| DtaError::MissingStrl {
                                variable: variable.name.clone(),
                                v,
                                o,
                            }),
                        Cell::Number(_) => Ok(None),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(ColumnValues::Text)
            } else {
                Ok(ColumnValues::Numeric(
                    column
                        .into_iter()
                        .map(|cell| match cell {
                            Cell::Number(v) => v,
                            _ => None,
                        })
                        .collect(),
                ))
            }
        })
        .collect()
}

/// Assemble the DataFrame: numeric variables as `Float64`, strings as `String`.
pub fn build_dataframe(
    header: &DtaHeader,
    values: Vec<ColumnValues>,
) -> Result<DataFrame, DtaError> {
    let columns: Vec<Column> = header
        .variables
        .iter()
        .zip(values)
        .map(|(variable, values)| match values {
            ColumnValues::Numeric(v) => Column::new(variable.name.as_str().into(), v),
            ColumnValues::Text(v) => Column::new(variable.name.as_str().into(), v),
        })
        .collect();

    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_missing_thresholds() {
        assert_eq!(byte_value(100), Some(100.0));
        assert_eq!(byte_value(101), None);
        assert_eq!(byte_value(-127), Some(-127.0));
        assert_eq!(int_value(32_740), Some(32_740.0));
        assert_eq!(int_value(32_741), None);
        assert_eq!(long_value(2_147_483_620), Some(2_147_483_620.0));
        assert_eq!(long_value(2_147_483_621), None);
    }

    #[test]
    fn test_float_missing_thresholds() {
        assert_eq!(float_value(1.5), Some(1.5));
        assert_eq!(float_value(2f32.powi(127)), None);
        assert_eq!(float_value(f32::NAN), None);
        assert_eq!(double_value(-3.25), Some(-3.25));
        assert_eq!(double_value(2f64.powi(1023)), None);
        assert_eq!(double_value(2f64.powi(1023) * 1.5), None);
    }

    #[test]
    fn test_read_strls_117_and_118() {
        // Release 117: v u32, o u32
        let mut bytes = b"<strls>GSO".to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.push(130);
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(b"abc\0");
        bytes.extend_from_slice(b"</strls>");
        let mut reader = ByteReader::new(&bytes);
        let table = read_strls(&mut reader, Release::R117).unwrap();
        assert_eq!(table.get(&(1, 2)).map(String::as_str), Some("abc"));

        // Release 118: v u32, o u64, binary payload
        let mut bytes = b"<strls>GSO".to_vec();
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&9u64.to_le_bytes());
        bytes.push(129);
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(b"hi");
        bytes.extend_from_slice(b"</strls>");
        let mut reader = ByteReader::new(&bytes);
        let table = read_strls(&mut reader, Release::R118).unwrap();
        assert_eq!(table.get(&(3, 9)).map(String::as_str), Some("hi"));
    }
}
