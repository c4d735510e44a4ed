//! Shared test utilities and fixture generators

#![allow(dead_code)]

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};
use std::path::PathBuf;
use tempfile::TempDir;

/// Two tasks of three alternatives each, one chosen per task.
pub fn create_choice_dataframe() -> DataFrame {
    df! {
        "resp" => [1i64, 1, 1, 1, 1, 1],
        "task" => [1i64, 1, 1, 2, 2, 2],
        "brand" => ["N", "P", "H", "H", "N", "P"],
        "price" => [8i64, 12, 16, 20, 24, 28],
        "choice" => [1i64, 0, 0, 0, 1, 0],
    }
    .unwrap()
}

/// Counts drawn from `exp(0.5 + 0.3 x + 0.4 group_b)`.
///
/// Columns: `y` (count), `x` (uniform on [0, 2]), `group` ("a" / "b").
pub fn create_poisson_dataframe(n: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut y = Vec::with_capacity(n);
    let mut x = Vec::with_capacity(n);
    let mut group = Vec::with_capacity(n);

    for _ in 0..n {
        let xi: f64 = rng.gen_range(0.0..2.0);
        let is_b = rng.gen_bool(0.5);
        let mu = (0.5 + 0.3 * xi + if is_b { 0.4 } else { 0.0 }).exp();
        let draw: f64 = Poisson::new(mu).unwrap().sample(&mut rng);
        y.push(draw as i64);
        x.push(xi);
        group.push(if is_b { "b" } else { "a" });
    }

    df! {
        "y" => y,
        "x" => x,
        "group" => group,
    }
    .unwrap()
}

/// A small randomised experiment with a clear effect on `outcome`.
pub fn create_experiment_dataframe() -> DataFrame {
    df! {
        "treatment" => [0i64, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1],
        "outcome" => [0i64, 0, 1, 0, 0, 1, 1, 1, 0, 1, 1, 1],
        "amount" => [Some(0.0f64), Some(0.0), Some(5.0), Some(0.0), None, Some(10.0),
                     Some(15.0), Some(20.0), Some(0.0), Some(10.0), Some(25.0), Some(5.0)],
        "age" => [30.0f64, 41.0, 35.0, 52.0, 28.0, 44.0, 33.0, 47.0, 38.0, 29.0, 50.0, 36.0],
        "region" => ["north", "south", "north", "south", "north", "south",
                     "north", "south", "north", "south", "north", "south"],
    }
    .unwrap()
}

/// Three well-separated blobs of 20 points in two dimensions.
pub fn create_blob_dataframe(seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let centres = [(0.0, 0.0), (10.0, 10.0), (-10.0, 10.0)];
    let mut a = Vec::new();
    let mut b = Vec::new();
    for (cx, cy) in centres {
        for _ in 0..20 {
            a.push(cx + rng.gen_range(-0.5..0.5));
            b.push(cy + rng.gen_range(-0.5..0.5));
        }
    }
    df! {
        "a" => a,
        "b" => b,
    }
    .unwrap()
}

/// Create a temporary directory with a test CSV file
pub fn create_temp_csv(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("test_data.csv");

    let mut file = std::fs::File::create(&csv_path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();

    (temp_dir, csv_path)
}

/// Create a temporary directory with a test Parquet file
pub fn create_temp_parquet(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let parquet_path = temp_dir.path().join("test_data.parquet");

    let file = std::fs::File::create(&parquet_path).unwrap();
    ParquetWriter::new(file).finish(df).unwrap();

    (temp_dir, parquet_path)
}

/// A cell of a hand-built `.dta` file
#[derive(Debug, Clone)]
pub enum DtaValue {
    Byte(i8),
    Int(i16),
    Long(i32),
    Float(f32),
    Double(f64),
    /// Fixed-width string, padded to the variable width
    Str(String),
    /// strL reference `(v, o)`
    StrL(u32, u64),
}

/// Variable type codes
pub const DTA_BYTE: u16 = 65530;
pub const DTA_INT: u16 = 65529;
pub const DTA_LONG: u16 = 65528;
pub const DTA_FLOAT: u16 = 65527;
pub const DTA_DOUBLE: u16 = 65526;
pub const DTA_STRL: u16 = 32768;

fn fixed(text: &str, width: usize) -> Vec<u8> {
    let mut field = vec![0u8; width];
    field[..text.len()].copy_from_slice(text.as_bytes());
    field
}

/// Build a release 118 little-endian `.dta` image.
///
/// `variables` are `(name, type code)`; `strls` are `(v, o, text)` entries
/// written as ASCII GSO records.
pub fn build_dta_118(
    variables: &[(&str, u16)],
    rows: &[Vec<DtaValue>],
    strls: &[(u32, u64, &str)],
) -> Vec<u8> {
    build_dta(118, variables, rows, strls)
}

/// Build a release 119 little-endian `.dta` image (u32 K, 3-byte strL `v`).
pub fn build_dta_119(
    variables: &[(&str, u16)],
    rows: &[Vec<DtaValue>],
    strls: &[(u32, u64, &str)],
) -> Vec<u8> {
    build_dta(119, variables, rows, strls)
}

fn build_dta(
    release: u16,
    variables: &[(&str, u16)],
    rows: &[Vec<DtaValue>],
    strls: &[(u32, u64, &str)],
) -> Vec<u8> {
    let k = variables.len();
    let (sort_width, v_width) = if release == 119 { (4, 3) } else { (2, 2) };
    let mut out = Vec::new();
    out.extend_from_slice(format!("<stata_dta><header><release>{}</release>", release).as_bytes());
    out.extend_from_slice(b"<byteorder>LSF</byteorder><K>");
    if release == 119 {
        out.extend_from_slice(&(k as u32).to_le_bytes());
    } else {
        out.extend_from_slice(&(k as u16).to_le_bytes());
    }
    out.extend_from_slice(b"</K><N>");
    out.extend_from_slice(&(rows.len() as u64).to_le_bytes());
    out.extend_from_slice(b"</N><label>");
    let label = b"test data";
    out.extend_from_slice(&(label.len() as u16).to_le_bytes());
    out.extend_from_slice(label);
    out.extend_from_slice(b"</label><timestamp>");
    let stamp = b"18 Oct 2026 09:00";
    out.push(stamp.len() as u8);
    out.extend_from_slice(stamp);
    out.extend_from_slice(b"</timestamp></header>");

    let map_pos = out.len() + "<map>".len();
    out.extend_from_slice(b"<map>");
    out.extend_from_slice(&[0u8; 14 * 8]);
    out.extend_from_slice(b"</map>");

    out.extend_from_slice(b"<variable_types>");
    for (_, code) in variables {
        out.extend_from_slice(&code.to_le_bytes());
    }
    out.extend_from_slice(b"</variable_types><varnames>");
    for (name, _) in variables {
        out.extend_from_slice(&fixed(name, 129));
    }
    out.extend_from_slice(b"</varnames><sortlist>");
    out.extend_from_slice(&vec![0u8; (k + 1) * sort_width]);
    out.extend_from_slice(b"</sortlist><formats>");
    for _ in variables {
        out.extend_from_slice(&fixed("%9.0g", 57));
    }
    out.extend_from_slice(b"</formats><value_label_names>");
    out.extend_from_slice(&vec![0u8; k * 129]);
    out.extend_from_slice(b"</value_label_names><variable_labels>");
    for (name, _) in variables {
        out.extend_from_slice(&fixed(&format!("{} label", name), 321));
    }
    out.extend_from_slice(b"</variable_labels><characteristics></characteristics>");

    let data_pos = out.len();
    out.extend_from_slice(b"<data>");
    for row in rows {
        for (value, (_, code)) in row.iter().zip(variables) {
            match value {
                DtaValue::Byte(v) => out.extend_from_slice(&v.to_le_bytes()),
                DtaValue::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
                DtaValue::Long(v) => out.extend_from_slice(&v.to_le_bytes()),
                DtaValue::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
                DtaValue::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
                DtaValue::Str(s) => out.extend_from_slice(&fixed(s, *code as usize)),
                DtaValue::StrL(v, o) => {
                    out.extend_from_slice(&v.to_le_bytes()[..v_width]);
                    out.extend_from_slice(&o.to_le_bytes()[..8 - v_width]);
                }
            }
        }
    }
    out.extend_from_slice(b"</data>");

    let strls_pos = out.len();
    out.extend_from_slice(b"<strls>");
    for (v, o, text) in strls {
        out.extend_from_slice(b"GSO");
        out.extend_from_slice(&v.to_le_bytes());
        out.extend_from_slice(&o.to_le_bytes());
        out.push(130);
        out.extend_from_slice(&((text.len() + 1) as u32).to_le_bytes());
        out.extend_from_slice(text.as_bytes());
        out.push(0);
    }
    out.extend_from_slice(b"</strls><value_labels></value_labels></stata_dta>");

    let data_slot = map_pos + 9 * 8;
    out[data_slot..data_slot + 8].copy_from_slice(&(data_pos as u64).to_le_bytes());
    let strls_slot = map_pos + 10 * 8;
    out[strls_slot..strls_slot + 8].copy_from_slice(&(strls_pos as u64).to_le_bytes());
    out
}

/// A release 118 file covering every numeric type, a str and a strL.
///
/// Row 2 holds the missing value of every numeric type.
pub fn create_sample_dta() -> Vec<u8> {
    build_dta_118(
        &[
            ("b", DTA_BYTE),
            ("i", DTA_INT),
            ("l", DTA_LONG),
            ("f", DTA_FLOAT),
            ("d", DTA_DOUBLE),
            ("s", 4),
            ("note", DTA_STRL),
        ],
        &[
            vec![
                DtaValue::Byte(-5),
                DtaValue::Int(1200),
                DtaValue::Long(70_000),
                DtaValue::Float(1.5),
                DtaValue::Double(-2.25),
                DtaValue::Str("abcd".to_string()),
                DtaValue::StrL(7, 1),
            ],
            vec![
                DtaValue::Byte(101),
                DtaValue::Int(32_741),
                DtaValue::Long(2_147_483_621),
                DtaValue::Float(2f32.powi(127)),
                DtaValue::Double(2f64.powi(1023)),
                DtaValue::Str("x".to_string()),
                DtaValue::StrL(0, 0),
            ],
        ],
        &[(7, 1, "a long note")],
    )
}

/// Write `bytes` to `name` inside a fresh temp dir.
pub fn create_temp_file(name: &str, bytes: &[u8]) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    (temp_dir, path)
}
