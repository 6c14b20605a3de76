use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use ndarray::Array2;
use polars::prelude::*;
use tempfile::NamedTempFile;

pub fn read_table(path: &Path) -> Result<DataFrame> {
    let ext = extension(path);
    if ext == "gz" || ext == "bz2" {
        let tmp = decompress_to_temp(path, &ext)?;
        return read_table_plain(tmp.path());
    }

    read_table_plain(path)
}

fn read_table_plain(path: &Path) -> Result<DataFrame> {
    let delimiter = detect_delimiter(path)?;
    if delimiter == b' ' {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        return read_table_whitespace(BufReader::new(file));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(delimiter)
                .with_null_values(Some(NullValues::AllColumns(vec![
                    "".into(),
                    "NA".into(),
                    "NaN".into(),
                    ".".into(),
                ])))
                .with_missing_is_null(true),
        )
        .with_ignore_errors(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("read {}", path.display()))?;
    trim_string_columns(df)
}

fn read_table_whitespace<R: Read>(reader: R) -> Result<DataFrame> {
    let mut reader = BufReader::new(reader);
    let mut header_line = String::new();
    reader.read_line(&mut header_line)?;
    if header_line.trim().is_empty() {
        return Err(anyhow::anyhow!("empty file"));
    }
    let headers: Vec<String> = header_line
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();
    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        for (i, col) in columns.iter_mut().enumerate() {
            col.push(parts.get(i).and_then(|v| normalize_missing_token(v)));
        }
    }

    let df: DataFrame = headers
        .iter()
        .zip(columns)
        .map(|(name, values)| Column::from(Series::new(name.as_str().into(), values)))
        .collect();
    infer_numeric_columns(df)
}

/// Whitespace tables arrive as strings; columns that parse cleanly as numbers
/// become Float64 so downstream code sees the same dtypes as the CSV path.
fn infer_numeric_columns(mut df: DataFrame) -> Result<DataFrame> {
    let names = column_names(&df);
    for name in names {
        let column = df.column(&name)?;
        let Ok(values) = column.str() else {
            continue;
        };
        let numeric = values
            .into_iter()
            .flatten()
            .all(|v| v.parse::<f64>().is_ok());
        if numeric {
            let mut casted = column
                .as_series()
                .context("series")?
                .cast(&DataType::Float64)?;
            casted.rename(name.as_str().into());
            df.with_column(Column::from(casted))?;
        }
    }
    Ok(df)
}

fn detect_delimiter(path: &Path) -> Result<u8> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut first = String::new();
    reader.read_line(&mut first)?;
    if first.contains('\t') {
        return Ok(b'\t');
    }
    if first.contains(',') {
        return Ok(b',');
    }
    Ok(b' ')
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn decompress_to_temp(path: &Path, ext: &str) -> Result<NamedTempFile> {
    let mut decoder = open_reader(path, ext)?;
    let mut tmp = NamedTempFile::new()?;
    std::io::copy(&mut decoder, &mut tmp)?;
    Ok(tmp)
}

fn open_reader(path: &Path, ext: &str) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    Ok(match ext {
        "gz" => Box::new(GzDecoder::new(file)),
        "bz2" => Box::new(BzDecoder::new(file)),
        _ => Box::new(file),
    })
}

pub fn open_maybe_compressed(path: &Path) -> Result<Box<dyn BufRead>> {
    let reader = open_reader(path, &extension(path))?;
    Ok(Box::new(BufReader::new(reader)))
}

fn trim_series(series: &Series) -> Result<Series> {
    let utf8 = series.str()?;
    let trimmed = utf8
        .apply(|v| v.map(|s| Cow::Owned(s.trim().to_string())))
        .into_series();
    Ok(trimmed)
}

fn trim_string_columns(mut df: DataFrame) -> Result<DataFrame> {
    for name in column_names(&df) {
        if let Ok(column) = df.column(&name)
            && column.dtype() == &DataType::String
        {
            let mut trimmed = trim_series(column.as_series().context("series")?)?;
            trimmed.rename(name.as_str().into());
            df.with_column(Column::from(trimmed))?;
        }
    }
    Ok(df)
}

fn normalize_missing_token(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let upper = trimmed.to_ascii_uppercase();
    if trimmed.is_empty() || upper == "NA" || upper == "NAN" || trimmed == "." {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn ensure_utf8(mut df: DataFrame, cols: &[&str]) -> Result<DataFrame> {
    for col in cols {
        if let Ok(column) = df.column(col)
            && column.dtype() != &DataType::String
        {
            let mut casted = column
                .as_series()
                .context("series")?
                .cast(&DataType::String)?;
            casted.rename((*col).into());
            df.with_column(Column::from(casted))?;
        }
    }
    Ok(df)
}

pub fn extract_f64_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df
        .column(name)
        .with_context(|| format!("column {name}"))?
        .as_series()
        .context("series")?
        .cast(&DataType::Float64)?;
    let col = series.f64()?;
    Ok(col.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

pub fn extract_string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df
        .column(name)
        .with_context(|| format!("column {name}"))?
        .as_series()
        .context("series")?
        .cast(&DataType::String)?;
    let col = series.str()?;
    Ok(col
        .into_iter()
        .map(|v| v.unwrap_or("").to_string())
        .collect())
}

/// Reads the named columns into an `n × k` matrix.
pub fn extract_matrix(df: &DataFrame, names: &[String]) -> Result<Array2<f64>> {
    let mut out = Array2::zeros((df.height(), names.len()));
    for (j, name) in names.iter().enumerate() {
        let col = extract_f64_column(df, name)?;
        for (i, v) in col.into_iter().enumerate() {
            out[[i, j]] = v;
        }
    }
    Ok(out)
}

pub fn drop_cols_if_present(df: &mut DataFrame, names: &[&str]) -> Result<()> {
    for name in names {
        if df.column(name).is_ok() {
            df.drop_in_place(name)?;
        }
    }
    Ok(())
}

/// One identifier per line, no header.
pub fn read_id_list(path: &Path) -> Result<Vec<String>> {
    let reader = open_maybe_compressed(path)?;
    let mut ids = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let Some(first) = fields.next() else {
            continue;
        };
        if fields.next().is_some() {
            return Err(anyhow::anyhow!(
                "{} must contain a single column of IDs",
                path.display()
            ));
        }
        ids.push(first.to_string());
    }
    Ok(ids)
}

/// Writes a tab-separated table and gzips it; the file is complete on return.
pub fn write_gz_table(df: &DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    let mut csv = CsvWriter::new(&mut encoder).with_separator(b'\t');
    let mut df = df.clone();
    csv.finish(&mut df)?;
    encoder.finish()?;
    Ok(())
}

/// Whitespace-separated matrix dump, one row per line.
pub fn write_matrix(matrix: &Array2<f64>, path: &Path) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    for row in matrix.rows() {
        let line = row
            .iter()
            .map(|v| format!("{v:.18e}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(file, "{line}")?;
    }
    Ok(())
}

/// Whole counts print without a fractional part.
fn format_count(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Single tab-separated line, as used by `.M` files.
pub fn write_tab_line(values: &[f64], path: &Path) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let line = values
        .iter()
        .map(|v| format_count(*v))
        .collect::<Vec<_>>()
        .join("\t");
    writeln!(file, "{line}")?;
    Ok(())
}

/// Reads every number in a whitespace/tab separated file, summing rows
/// column-wise.
pub fn read_numeric_row(path: &Path) -> Result<Vec<f64>> {
    let reader = open_maybe_compressed(path)?;
    let mut sums: Vec<f64> = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let vals = line
            .split_whitespace()
            .map(|v| {
                v.parse::<f64>()
                    .with_context(|| format!("parse {v:?} in {}", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        if sums.is_empty() {
            sums = vec![0.0; vals.len()];
        }
        if vals.len() != sums.len() {
            return Err(anyhow::anyhow!(
                "Inconsistent column count in {}",
                path.display()
            ));
        }
        for (acc, v) in sums.iter_mut().zip(vals) {
            *acc += v;
        }
    }
    Ok(sums)
}
