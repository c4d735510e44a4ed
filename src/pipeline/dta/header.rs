//! Header, map and variable descriptors of a `.dta` file.
//!
//! Layout of releases 117-119:
//!
//! ```text
//! <stata_dta><header><release>118</release><byteorder>LSF</byteorder>
//! <K>..</K><N>..</N><label>..</label><timestamp>..</timestamp></header>
//! <map>14 x u64</map><variable_types>K x u16</variable_types>
//! <varnames>..</varnames><sortlist>..</sortlist><formats>..</formats>
//! <value_label_names>..</value_label_names><variable_labels>..</variable_labels>
//! <characteristics>..</characteristics><data>..</data><strls>..</strls>
//! <value_labels>..</value_labels></stata_dta>
//! ```

use super::reader::ByteReader;
use super::{DtaError, DtaHeader, Release, VarType, Variable};

/// Index of the `<data>` offset in the map.
pub const MAP_DATA: usize = 9;
/// Index of the `<strls>` offset in the map.
pub const MAP_STRLS: usize = 10;

const MAP_LEN: usize = 14;

/// Decode a NUL-terminated fixed-width field.
fn fixed_string(bytes: &[u8], release: Release) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    release.decode(&bytes[..end])
}

/// Map a type code to a variable type.
pub fn parse_var_type(code: u16, index: usize) -> Result<VarType, DtaError> {
    match code {
        1..=2045 => Ok(VarType::Str(code as usize)),
        32768 => Ok(VarType::StrL),
        65526 => Ok(VarType::Double),
        65527 => Ok(VarType::Float),
        65528 => Ok(VarType::Long),
        65529 => Ok(VarType::Int),
        65530 => Ok(VarType::Byte),
        _ => Err(DtaError::UnknownType { code, index }),
    }
}

/// Parse everything up to (not including) the `<characteristics>` section.
pub fn parse_header(reader: &mut ByteReader<'_>) -> Result<DtaHeader, DtaError> {
    if !reader.peek_tag("<stata_dta>") {
        return Err(DtaError::NotDta);
    }
    reader.expect_tag("<stata_dta>")?;
    reader.expect_tag("<header>")?;

    reader.expect_tag("<release>")?;
    let release_text = String::from_utf8_lossy(reader.bytes(3)?).to_string();
    let release = match release_text.as_str() {
        "117" => Release::R117,
        "118" => Release::R118,
        "119" => Release::R119,
        _ => return Err(DtaError::UnsupportedRelease(release_text)),
    };
    reader.expect_tag("</release>")?;

    reader.expect_tag("<byteorder>")?;
    let order = String::from_utf8_lossy(reader.bytes(3)?).to_string();
    match order.as_str() {
        "MSF" => reader.set_big_endian(true),
        "LSF" => reader.set_big_endian(false),
        _ => return Err(DtaError::InvalidByteOrder(order)),
    }
    reader.expect_tag("</byteorder>")?;

    reader.expect_tag("<K>")?;
    let nvar = match release {
        Release::R119 => reader.u32()? as usize,
        _ => reader.u16()? as usize,
    };
    reader.expect_tag("</K>")?;
    // every variable needs at least a type code, so K is bounded by the file
    let capacity = nvar.min(reader.remaining() / 2);

    reader.expect_tag("<N>")?;
    let nobs = match release {
        Release::R117 => reader.u32()? as u64,
        _ => reader.u64()?,
    };
    reader.expect_tag("</N>")?;

    reader.expect_tag("<label>")?;
    let label_len = match release {
        Release::R117 => reader.u8()? as usize,
        _ => reader.u16()? as usize,
    };
    let label = release.decode(reader.bytes(label_len)?);
    reader.expect_tag("</label>")?;

    reader.expect_tag("<timestamp>")?;
    let ts_len = reader.u8()? as usize;
    let timestamp = String::from_utf8_lossy(reader.bytes(ts_len)?).to_string();
    reader.expect_tag("</timestamp>")?;
    reader.expect_tag("</header>")?;

    reader.expect_tag("<map>")?;
    let mut map = [0u64; MAP_LEN];
    for slot in map.iter_mut() {
        *slot = reader.u64()?;
    }
    reader.expect_tag("</map>")?;

    reader.expect_tag("<variable_types>")?;
    let mut types = Vec::with_capacity(capacity);
    for index in 0..nvar {
        types.push(parse_var_type(reader.u16()?, index)?);
    }
    reader.expect_tag("</variable_types>")?;

    reader.expect_tag("<varnames>")?;
    let mut names = Vec::with_capacity(capacity);
    for _ in 0..nvar {
        names.push(fixed_string(reader.bytes(release.name_width())?, release));
    }
    reader.expect_tag("</varnames>")?;

    reader.expect_tag("<sortlist>")?;
    reader.skip((nvar + 1) * release.sortlist_width())?;
    reader.expect_tag("</sortlist>")?;

    reader.expect_tag("<formats>")?;
    let mut formats = Vec::with_capacity(capacity);
    for _ in 0..nvar {
        formats.push(fixed_string(reader.bytes(release.format_width())?, release));
    }
    reader.expect_tag("</formats>")?;

    // Value label names are read past; labelled values keep their codes
    reader.expect_tag("<value_label_names>")?;
    reader.skip(nvar * release.name_width())?;
    reader.expect_tag("</value_label_names>")?;

    reader.expect_tag("<variable_labels>")?;
    let mut labels = Vec::with_capacity(capacity);
    for _ in 0..nvar {
        labels.push(fixed_string(reader.bytes(release.label_width())?, release));
    }
    reader.expect_tag("</variable_labels>")?;

    let variables = names
        .into_iter()
        .zip(types)
        .zip(formats)
        .zip(labels)
        .map(|(((name, var_type), format), label)| Variable {
            name,
            var_type,
            format,
            label,
        })
        .collect();

    Ok(DtaHeader {
        release,
        big_endian: reader.is_big_endian(),
        nobs,
        label,
        timestamp,
        map,
        variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes() {
        assert_eq!(parse_var_type(5, 0).unwrap(), VarType::Str(5));
        assert_eq!(parse_var_type(2045, 0).unwrap(), VarType::Str(2045));
        assert_eq!(parse_var_type(32768, 0).unwrap(), VarType::StrL);
        assert_eq!(parse_var_type(65526, 0).unwrap(), VarType::Double);
        assert_eq!(parse_var_type(65530, 0).unwrap(), VarType::Byte);
        assert!(matches!(
            parse_var_type(0, 3),
            Err(DtaError::UnknownType { code: 0, index: 3 })
        ));
        assert!(parse_var_type(2046, 0).is_err());
    }

    #[test]
    fn test_fixed_string_stops_at_nul() {
        let bytes = b"age\0\0garbage";
        assert_eq!(fixed_string(bytes, Release::R118), "age");
    }

    #[test]
    fn test_not_dta() {
        let bytes = b"PAR1 not a stata file";
        let mut reader = ByteReader::new(bytes);
        assert!(matches!(parse_header(&mut reader), Err(DtaError::NotDta)));
    }

    #[test]
    fn test_old_release_rejected() {
        let bytes = b"<stata_dta><header><release>115</release>";
        let mut reader = ByteReader::new(bytes);
        assert!(matches!(
            parse_header(&mut reader),
            Err(DtaError::UnsupportedRelease(r)) if r == "115"
        ));
    }
}
