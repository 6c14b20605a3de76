//! ID-list intersection and predicate row filters shared by the LD Score and
//! regression pipelines. Every filter returns a new value; inputs are never
//! modified in place.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use polars::prelude::*;

use crate::error::LdscError;
use crate::io::{extract_f64_column, read_id_list};
use crate::logging::RunLog;

/// Positions of `ids` that also appear in `keep`, in the order of `ids`.
pub fn merge_id_list(ids: &[String], keep: &[String]) -> Vec<usize> {
    let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
    ids.iter()
        .enumerate()
        .filter_map(|(i, id)| keep.contains(id.as_str()).then_some(i))
        .collect()
}

/// Reads a one-column ID file and intersects it with `ids`. An empty
/// intersection is an error naming what was being filtered.
pub fn read_filter_list(
    path: &Path,
    noun: &str,
    verb: &str,
    ids: &[String],
    log: &mut RunLog,
) -> Result<Vec<usize>> {
    let list = read_id_list(path)?;
    log.line(&format!(
        "Read list of {} {noun} to {verb} from {}",
        list.len(),
        path.display()
    ))?;
    let merged = merge_id_list(ids, &list);
    if merged.is_empty() {
        return Err(LdscError::empty_stage(
            format!("--{verb} {}", path.display()),
            format!("No {noun} retained for analysis"),
        )
        .into());
    }
    log.line(&format!("After merging, {} {noun} remain", merged.len()))?;
    Ok(merged)
}

/// Comparison applied by a row filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Below(f64),
    Above(f64),
}

impl Bound {
    pub fn keeps(&self, value: f64) -> bool {
        match *self {
            Bound::Below(limit) => value < limit,
            Bound::Above(limit) => value > limit,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Bound::Below(_) => "<",
            Bound::Above(_) => ">",
        }
    }

    pub fn limit(&self) -> f64 {
        match *self {
            Bound::Below(v) | Bound::Above(v) => v,
        }
    }
}

/// Keeps rows whose `column` satisfies `bound`; missing values are dropped.
pub fn filter_rows(df: &DataFrame, column: &str, bound: Bound) -> Result<DataFrame> {
    if df.column(column).is_err() {
        return Err(LdscError::MissingColumn(format!(
            "cannot filter on {column}: column not present"
        ))
        .into());
    }
    let values = extract_f64_column(df, column)?;
    let mask: BooleanChunked = values
        .iter()
        .map(|v| v.is_finite() && bound.keeps(*v))
        .collect();
    Ok(df.filter(&mask)?)
}

/// Applies `filter_rows` and fails immediately when nothing survives.
pub fn filter_rows_logged(
    df: &DataFrame,
    column: &str,
    bound: Bound,
    log: &mut RunLog,
) -> Result<DataFrame> {
    let out = filter_rows(df, column, bound)?;
    let stage = format!("{column} {} {}", bound.symbol(), bound.limit());
    if out.height() == 0 {
        return Err(LdscError::empty_stage(
            format!("filter on {stage}"),
            format!("No SNPs retained for analysis after filtering on {stage}."),
        )
        .into());
    }
    log.line(&format!(
        "After filtering on {stage}, {} SNPs remain.",
        out.height()
    ))?;
    Ok(out)
}

/// Keeps rows whose `column` value appears in `allowed`.
pub fn filter_by_ids(df: &DataFrame, column: &str, allowed: &[String]) -> Result<DataFrame> {
    let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
    let ids = df.column(column)?.str()?;
    let mask: BooleanChunked = ids
        .into_iter()
        .map(|v| v.is_some_and(|id| allowed.contains(id)))
        .collect();
    Ok(df.filter(&mask)?)
}

const ROW_ORDER: &str = "__left_row";

/// Inner join on `SNP` keeping the row order of `left`, failing with the stage
/// name when fewer than `min_rows` rows survive.
pub fn merge_on_snp(
    left: &DataFrame,
    right: &DataFrame,
    stage: &str,
    min_rows: usize,
    log: &mut RunLog,
) -> Result<DataFrame> {
    let indexed = left.with_row_index(ROW_ORDER.into(), None)?;
    let mut merged = indexed
        .join(right, ["SNP"], ["SNP"], JoinType::Inner.into(), None)?
        .sort([ROW_ORDER], SortMultipleOptions::default())?;
    merged.drop_in_place(ROW_ORDER)?;
    if merged.height() < min_rows {
        return Err(LdscError::empty_stage(
            format!("merge with {stage}"),
            format!(
                "{} SNPs remain after merging with {stage}; at least {min_rows} required",
                merged.height()
            ),
        )
        .into());
    }
    log.line(&format!(
        "After merging with {stage}, {} SNPs remain.",
        merged.height()
    ))?;
    Ok(merged)
}
