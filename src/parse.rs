//! Readers for the text formats exchanged between the two pipelines:
//! annotation files, continuous covariates, LD Scores, M files and summary
//! statistics.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use polars::prelude::*;

use crate::error::LdscError;
use crate::io::{
    column_names, drop_cols_if_present, ensure_utf8, extract_f64_column, extract_matrix,
    extract_string_column, open_maybe_compressed, read_numeric_row, read_table,
};
use crate::types::{AnnotationMatrix, SnpList};

/// Autosomes covered by the per-chromosome file variants.
pub const N_CHROMOSOMES: u8 = 22;

const ANNOT_META: [&str; 4] = ["CHR", "SNP", "BP", "CM"];
const LDSCORE_META: [&str; 4] = ["CHR", "BP", "CM", "MAF"];

/// Reads `CHR SNP BP CM <annotations...>`, returning the annotation columns and
/// the SNP column in file order.
pub fn read_annot_file(path: &Path) -> Result<(Vec<String>, AnnotationMatrix)> {
    let df = ensure_utf8(read_table(path)?, &["SNP"])?;
    let names = column_names(&df);
    let has_meta = names.len() > ANNOT_META.len()
        && names.iter().zip(ANNOT_META).all(|(name, meta)| name == meta);
    if !has_meta {
        return Err(LdscError::Parse(format!(
            "{} must start with columns CHR SNP BP CM followed by at least one annotation",
            path.display()
        ))
        .into());
    }
    let annot_names = names[ANNOT_META.len()..].to_vec();
    let values = extract_matrix(&df, &annot_names)?;
    let snps = extract_string_column(&df, "SNP")?;
    Ok((snps, AnnotationMatrix::new(values, annot_names)?))
}

/// Reads an annotation file that must list exactly the SNPs of `snps`, in the
/// same order.
pub fn read_annot(path: &Path, snps: &SnpList) -> Result<AnnotationMatrix> {
    let (ids, annot) = read_annot_file(path)?;
    let same_order = ids.len() == snps.len()
        && ids
            .iter()
            .zip(&snps.records)
            .all(|(id, record)| *id == record.id);
    if !same_order {
        return Err(LdscError::InvalidArgument(format!(
            "{} must contain the same SNPs in the same order as the .bim file",
            path.display()
        ))
        .into());
    }
    Ok(annot)
}

/// Reads a headerless `SNP value` covariate file and aligns it to `snp_ids`.
pub fn read_cts(path: &Path, snp_ids: &[String]) -> Result<Vec<f64>> {
    let reader = open_maybe_compressed(path)?;
    let mut values: HashMap<String, f64> = HashMap::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let (Some(snp), Some(raw)) = (fields.next(), fields.next()) else {
            continue;
        };
        let value = raw.parse::<f64>().map_err(|e| {
            LdscError::Parse(format!(
                "{} line {}: cannot parse {raw:?} as a number ({e})",
                path.display(),
                line_no + 1
            ))
        })?;
        values.insert(snp.to_string(), value);
    }

    let missing = snp_ids.iter().filter(|id| !values.contains_key(*id)).count();
    if missing > 0 {
        return Err(LdscError::InvalidArgument(format!(
            "{missing} SNPs from the .bim file are missing from {}",
            path.display()
        ))
        .into());
    }
    Ok(snp_ids
        .iter()
        .map(|id| values.get(id).copied().unwrap_or(f64::NAN))
        .collect())
}

fn concat_frames(frames: Vec<DataFrame>) -> Result<DataFrame> {
    let mut iter = frames.into_iter();
    let mut base = iter.next().ok_or_else(|| anyhow!("no frames to concatenate"))?;
    for frame in iter {
        base.vstack_mut(&frame)?;
    }
    Ok(base)
}

fn chromosome_paths(prefix: &str, chromosomes: Option<u8>, suffix: &str) -> Vec<PathBuf> {
    match chromosomes {
        Some(n) => (1..=n)
            .map(|chr| PathBuf::from(format!("{prefix}{chr}{suffix}")))
            .collect(),
        None => vec![PathBuf::from(format!("{prefix}{suffix}"))],
    }
}

fn read_ldscore_file(path: &Path) -> Result<DataFrame> {
    let mut df = read_table(path).with_context(|| format!("read {}", path.display()))?;
    drop_cols_if_present(&mut df, &LDSCORE_META)?;
    if df.column("SNP").is_err() {
        return Err(LdscError::MissingColumn(format!("SNP in {}", path.display())).into());
    }
    ensure_utf8(df, &["SNP"])
}

/// Reads `<prefix>.l2.ldscore.gz`, or `<prefix>{1..=n}.l2.ldscore.gz` stacked
/// when `chromosomes` is set. Only `SNP` and the score columns are kept.
pub fn read_ldscore(prefix: &str, chromosomes: Option<u8>) -> Result<DataFrame> {
    let frames = chromosome_paths(prefix, chromosomes, ".l2.ldscore.gz")
        .iter()
        .map(|p| read_ldscore_file(p))
        .collect::<Result<Vec<_>>>()?;
    concat_frames(frames).context("concat LD Score frames")
}

fn read_prefix_list(path: &Path) -> Result<Vec<String>> {
    let reader = open_maybe_compressed(path)?;
    let mut prefixes = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            prefixes.push(line.to_string());
        }
    }
    if prefixes.is_empty() {
        return Err(LdscError::Parse(format!("{} lists no LD Score prefixes", path.display())).into());
    }
    Ok(prefixes)
}

/// Reads every prefix listed in `path` and joins their score columns side by
/// side on `SNP`.
pub fn read_ldscore_fromfile(path: &Path, chromosomes: Option<u8>) -> Result<DataFrame> {
    let mut merged: Option<DataFrame> = None;
    for prefix in read_prefix_list(path)? {
        let df = read_ldscore(&prefix, chromosomes)?;
        merged = Some(match merged {
            None => df,
            Some(left) => left.join(&df, ["SNP"], ["SNP"], JoinType::Inner.into(), None)?,
        });
    }
    merged.ok_or_else(|| anyhow!("{} lists no LD Score prefixes", path.display()))
}

fn m_suffix(common: bool) -> &'static str {
    if common { ".l2.M_5_50" } else { ".l2.M" }
}

/// Per-annotation SNP counts, summed over chromosomes when `chromosomes` is set.
pub fn read_m(prefix: &str, chromosomes: Option<u8>, common: bool) -> Result<Vec<f64>> {
    let mut total: Vec<f64> = Vec::new();
    for path in chromosome_paths(prefix, chromosomes, m_suffix(common)) {
        let row = read_numeric_row(&path)?;
        if total.is_empty() {
            total = row;
        } else if row.len() != total.len() {
            return Err(LdscError::Parse(format!(
                "{} has {} entries, expected {}",
                path.display(),
                row.len(),
                total.len()
            ))
            .into());
        } else {
            for (acc, v) in total.iter_mut().zip(row) {
                *acc += v;
            }
        }
    }
    Ok(total)
}

/// Concatenates the M vectors of every prefix listed in `path`.
pub fn read_m_fromfile(path: &Path, chromosomes: Option<u8>, common: bool) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for prefix in read_prefix_list(path)? {
        out.extend(read_m(&prefix, chromosomes, common)?);
    }
    Ok(out)
}

/// Regression-weight LD Scores: exactly one score column, renamed `LD_weights`.
pub fn read_w_ld(prefix: &str, chromosomes: Option<u8>) -> Result<DataFrame> {
    let mut df = read_ldscore(prefix, chromosomes)?;
    let scores: Vec<String> = column_names(&df)
        .into_iter()
        .filter(|c| c != "SNP")
        .collect();
    if scores.len() != 1 {
        return Err(LdscError::InvalidArgument(format!(
            "regression weight LD Scores must have exactly one score column, found {}",
            scores.len()
        ))
        .into());
    }
    df.rename(&scores[0], "LD_weights".into())?;
    Ok(df)
}

fn require_columns(df: &DataFrame, cols: &[&str], path: &Path) -> Result<()> {
    for col in cols {
        if df.column(col).is_err() {
            return Err(LdscError::MissingColumn(format!("{col} in {}", path.display())).into());
        }
    }
    Ok(())
}

/// Reads `SNP CHISQ N [INFO] [MAF]`; rows missing a required value are dropped.
pub fn read_chisq(path: &Path) -> Result<DataFrame> {
    let df = ensure_utf8(read_table(path)?, &["SNP"])?;
    let required = ["SNP", "CHISQ", "N"];
    require_columns(&df, &required, path)?;
    let keep: Vec<&str> = ["SNP", "CHISQ", "N", "INFO", "MAF"]
        .into_iter()
        .filter(|c| df.column(c).is_ok())
        .collect();
    let df = df.select(keep)?;
    Ok(df.drop_nulls(Some(&required.map(String::from)))?)
}

fn read_inc_allele(path: &Path) -> Result<DataFrame> {
    let df = ensure_utf8(read_table(path)?, &["SNP", "INC_ALLELE"])?;
    require_columns(&df, &["SNP", "INC_ALLELE"], path)?;
    Ok(df.select(["SNP", "INC_ALLELE"])?)
}

fn with_suffix(mut df: DataFrame, suffix: &str) -> Result<DataFrame> {
    for name in column_names(&df) {
        if name != "SNP" {
            df.rename(&name, format!("{name}{suffix}").into())?;
        }
    }
    Ok(df)
}

/// Builds the paired table for genetic correlation from two `.chisq.gz` /
/// `.allele.gz` filesets: `SNP BETAHAT1 N1 [INFO1] [MAF1] BETAHAT2 N2 ...`.
/// `BETAHAT2` is negated where the two increasing alleles disagree.
pub fn read_betaprod(prefix1: &str, prefix2: &str) -> Result<DataFrame> {
    let chisq1 = with_suffix(read_chisq(Path::new(&format!("{prefix1}.chisq.gz")))?, "1")?;
    let chisq2 = with_suffix(read_chisq(Path::new(&format!("{prefix2}.chisq.gz")))?, "2")?;
    let allele1 = with_suffix(
        read_inc_allele(Path::new(&format!("{prefix1}.allele.gz")))?,
        "1",
    )?;
    let allele2 = with_suffix(
        read_inc_allele(Path::new(&format!("{prefix2}.allele.gz")))?,
        "2",
    )?;

    let join = |l: &DataFrame, r: &DataFrame| {
        l.join(r, ["SNP"], ["SNP"], JoinType::Inner.into(), None)
    };
    let mut df = join(&join(&join(&chisq1, &allele1)?, &chisq2)?, &allele2)?;

    let chi1 = extract_f64_column(&df, "CHISQ1")?;
    let n1 = extract_f64_column(&df, "N1")?;
    let chi2 = extract_f64_column(&df, "CHISQ2")?;
    let n2 = extract_f64_column(&df, "N2")?;
    let inc1 = extract_string_column(&df, "INC_ALLELE1")?;
    let inc2 = extract_string_column(&df, "INC_ALLELE2")?;

    let beta1: Vec<f64> = chi1.iter().zip(&n1).map(|(c, n)| (c / n).sqrt()).collect();
    let beta2: Vec<f64> = (0..chi2.len())
        .map(|i| {
            let sign = if inc1[i].eq_ignore_ascii_case(&inc2[i]) {
                1.0
            } else {
                -1.0
            };
            sign * (chi2[i] / n2[i]).sqrt()
        })
        .collect();

    df.with_column(Column::from(Series::new("BETAHAT1".into(), beta1)))?;
    df.with_column(Column::from(Series::new("BETAHAT2".into(), beta2)))?;
    drop_cols_if_present(
        &mut df,
        &["CHISQ1", "CHISQ2", "INC_ALLELE1", "INC_ALLELE2"],
    )?;
    Ok(df)
}
