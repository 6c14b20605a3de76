//! Continuous-covariate binning.
//!
//! Each covariate is cut into half-open intervals `(lo, hi]`. The outermost
//! bounds are always labelled `min` and `max` instead of their numeric value so
//! the column names produced for one chromosome match those of every other
//! chromosome, whatever the observed range.

use std::cmp::Ordering;

use ndarray::Array2;

use crate::error::{LdscError, Result};
use crate::qc::check_equal_length;
use crate::types::AnnotationMatrix;

pub const REFERENCE_BIN: &str = "BOTTOM_BINS";

/// How several covariates are combined into one annotation matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinningMode {
    /// Union of every covariate's levels plus a shared reference column.
    Additive,
    /// One column per combination of levels.
    Multiplicative,
}

/// One continuous covariate aligned to the SNP list.
#[derive(Debug, Clone)]
pub struct Covariate {
    pub name: String,
    pub values: Vec<f64>,
    pub breaks: Vec<f64>,
}

/// Parses cut points: `x` separates covariates, `,` separates cut points, and
/// `N` stands in for a minus sign.
pub fn parse_breaks(text: &str) -> Result<Vec<Vec<f64>>> {
    let text = text.replace('N', "-");
    text.split('x')
        .map(|group| {
            group
                .split(',')
                .map(|token| {
                    let value = token.trim().parse::<f64>().map_err(|e| {
                        LdscError::Parse(format!(
                            "--cts-breaks must be a comma-separated list of numbers: \
                             {token:?} ({e})"
                        ))
                    })?;
                    if !value.is_finite() {
                        return Err(LdscError::Parse(format!(
                            "--cts-breaks must be finite numbers: {token:?}"
                        )));
                    }
                    Ok(value)
                })
                .collect()
        })
        .collect()
}

/// Column names for covariates: the supplied names, or `ANNOT0`, `ANNOT1`, ...
pub fn covariate_names(n_files: usize, names: Option<&[String]>) -> Result<Vec<String>> {
    match names {
        Some(names) => {
            check_equal_length(n_files, names.len(), "--cts-bin", "--cts-names")?;
            Ok(names.to_vec())
        }
        None => Ok((0..n_files).map(|i| format!("ANNOT{i}")).collect()),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum BoundName {
    Min,
    Max,
    Value(f64),
}

impl BoundName {
    fn render(&self) -> String {
        match self {
            BoundName::Min => "min".to_string(),
            BoundName::Max => "max".to_string(),
            BoundName::Value(v) => format!("{v}"),
        }
    }
}

/// Ordered cut points and interval labels for one covariate.
#[derive(Debug, Clone, PartialEq)]
pub struct BinSpec {
    cuts: Vec<f64>,
    labels: Vec<String>,
}

impl BinSpec {
    pub fn new(breaks: &[f64], values: &[f64]) -> Result<Self> {
        if breaks.is_empty() {
            return Err(LdscError::InvalidArgument(
                "at least one break is required per covariate".to_string(),
            ));
        }
        if values.is_empty() {
            return Err(LdscError::InvalidArgument(
                "cannot bin an empty covariate".to_string(),
            ));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(LdscError::InvalidArgument(format!(
                "continuous annotation contains a non-finite value ({bad})"
            )));
        }
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);

        if breaks.iter().all(|b| *b >= max) || breaks.iter().all(|b| *b <= min) {
            return Err(LdscError::InvalidArgument(
                "All breaks lie outside the range of the cts variable.".to_string(),
            ));
        }

        let mut cuts = breaks.to_vec();
        let mut names = breaks.to_vec();
        if breaks.iter().all(|b| *b <= max) {
            names.push(max);
            cuts.push(max + 1.0);
        }
        if breaks.iter().all(|b| *b >= min) {
            names.push(min);
            cuts.push(min - 1.0);
        }
        cuts.sort_by(|a, b| a.total_cmp(b));
        names.sort_by(|a, b| a.total_cmp(b));

        let last = names.len() - 1;
        let bounds: Vec<BoundName> = names
            .iter()
            .enumerate()
            .map(|(i, v)| match i {
                0 => BoundName::Min,
                i if i == last => BoundName::Max,
                _ => BoundName::Value(*v),
            })
            .collect();
        let labels = bounds
            .windows(2)
            .map(|pair| format!("{}_{}", pair[0].render(), pair[1].render()))
            .collect();

        Ok(Self { cuts, labels })
    }

    pub fn n_levels(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn cuts(&self) -> &[f64] {
        &self.cuts
    }

    /// Level index of `value` in `(cut[i], cut[i + 1]]`.
    pub fn assign(&self, value: f64) -> Option<usize> {
        self.cuts
            .windows(2)
            .position(|pair| value > pair[0] && value <= pair[1])
    }

    fn assign_all(&self, values: &[f64]) -> Result<Vec<usize>> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                self.assign(*v).ok_or_else(|| {
                    LdscError::Internal(format!(
                        "SNP {i} with value {v} falls outside every bin of {:?}",
                        self.cuts
                    ))
                })
            })
            .collect()
    }
}

/// Column label of a binned annotation: one covariate's interval, or a tuple
/// of intervals when covariates are crossed.
#[derive(Debug, Clone, PartialEq)]
pub enum BinLabel {
    Single(String),
    Composite(Vec<String>),
}

impl BinLabel {
    pub fn cmp_key(&self, other: &BinLabel) -> Ordering {
        match (self, other) {
            (BinLabel::Single(a), BinLabel::Single(b)) => {
                single_sort_key(a).total_cmp(&single_sort_key(b))
            }
            _ => {
                let a = self.sort_key();
                let b = other.sort_key();
                for (x, y) in a.iter().zip(&b) {
                    match x.total_cmp(y) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
        }
    }

    pub fn sort_key(&self) -> Vec<f64> {
        match self {
            BinLabel::Single(label) => vec![single_sort_key(label)],
            BinLabel::Composite(parts) => composite_sort_key(parts),
        }
    }
}

/// Leading numeric token of `lo_hi`; `min` sorts first and `max` last.
pub fn single_sort_key(label: &str) -> f64 {
    let token = label.split('_').next().unwrap_or(label);
    match token {
        "min" => f64::NEG_INFINITY,
        "max" => f64::INFINITY,
        other => other.parse::<f64>().unwrap_or(f64::NAN),
    }
}

pub fn composite_sort_key(parts: &[String]) -> Vec<f64> {
    parts.iter().map(|p| single_sort_key(p)).collect()
}

/// Bins every covariate and assembles the annotation matrix for `mode`.
pub fn bin_covariates(covariates: &[Covariate], mode: BinningMode) -> Result<AnnotationMatrix> {
    if covariates.is_empty() {
        return Err(LdscError::InvalidArgument(
            "no continuous annotations supplied".to_string(),
        ));
    }
    let n_snps = covariates[0].values.len();
    if let Some(c) = covariates.iter().find(|c| c.values.len() != n_snps) {
        return Err(LdscError::InvalidArgument(format!(
            "continuous annotation {} has {} values, expected {n_snps}",
            c.name,
            c.values.len()
        )));
    }

    let specs = covariates
        .iter()
        .map(|c| BinSpec::new(&c.breaks, &c.values))
        .collect::<Result<Vec<_>>>()?;
    let levels = covariates
        .iter()
        .zip(&specs)
        .map(|(c, s)| s.assign_all(&c.values))
        .collect::<Result<Vec<_>>>()?;

    let annot = match mode {
        BinningMode::Additive => additive(covariates, &specs, &levels, n_snps)?,
        BinningMode::Multiplicative => multiplicative(covariates, &specs, &levels, n_snps)?,
    };

    if let Some(row) = annot.first_zero_row() {
        return Err(LdscError::Internal(format!(
            "SNP {row} has no annotation after continuous binning"
        )));
    }
    Ok(annot)
}

/// Order in which `labels` should appear as columns.
fn sorted_order(labels: &[BinLabel]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by(|a, b| labels[*a].cmp_key(&labels[*b]));
    order
}

fn additive(
    covariates: &[Covariate],
    specs: &[BinSpec],
    levels: &[Vec<usize>],
    n_snps: usize,
) -> Result<AnnotationMatrix> {
    // (covariate, level) of every non-reference column
    let mut columns: Vec<(usize, usize)> = Vec::new();
    let mut names = vec![REFERENCE_BIN.to_string()];
    for (c, spec) in specs.iter().enumerate() {
        let labels: Vec<BinLabel> = spec
            .labels()
            .iter()
            .map(|l| BinLabel::Single(l.clone()))
            .collect();
        for level in sorted_order(&labels).into_iter().filter(|l| *l != 0) {
            columns.push((c, level));
            names.push(format!("{}_{}", covariates[c].name, spec.labels()[level]));
        }
    }

    let mut values = Array2::zeros((n_snps, names.len()));
    for snp in 0..n_snps {
        if levels.iter().all(|lv| lv[snp] == 0) {
            values[[snp, 0]] = 1.0;
        }
        for (j, (c, level)) in columns.iter().enumerate() {
            if levels[*c][snp] == *level {
                values[[snp, j + 1]] = 1.0;
            }
        }
    }
    AnnotationMatrix::new(values, names)
}

fn multiplicative(
    covariates: &[Covariate],
    specs: &[BinSpec],
    levels: &[Vec<usize>],
    n_snps: usize,
) -> Result<AnnotationMatrix> {
    // every combination of levels, including ones no SNP falls into
    let mut combos: Vec<Vec<usize>> = vec![Vec::new()];
    for spec in specs {
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                (0..spec.n_levels()).map(move |l| {
                    let mut next = prefix.clone();
                    next.push(l);
                    next
                })
            })
            .collect();
    }

    let labels: Vec<BinLabel> = combos
        .iter()
        .map(|combo| {
            let parts: Vec<String> = combo
                .iter()
                .zip(specs)
                .map(|(l, s)| s.labels()[*l].clone())
                .collect();
            if parts.len() == 1 {
                BinLabel::Single(parts[0].clone())
            } else {
                BinLabel::Composite(parts)
            }
        })
        .collect();
    let order = sorted_order(&labels);

    let radix: Vec<usize> = specs.iter().map(BinSpec::n_levels).collect();
    let combo_index = |combo: &[usize]| {
        combo
            .iter()
            .zip(&radix)
            .fold(0usize, |acc, (l, r)| acc * r + l)
    };
    // column position of each combination after sorting
    let mut column_of = vec![0usize; combos.len()];
    for (col, idx) in order.iter().enumerate() {
        column_of[combo_index(&combos[*idx])] = col;
    }

    let names: Vec<String> = order
        .iter()
        .map(|idx| {
            combos[*idx]
                .iter()
                .enumerate()
                .map(|(c, l)| format!("{}_{}", covariates[c].name, specs[c].labels()[*l]))
                .collect::<Vec<_>>()
                .join("_")
        })
        .collect();

    let mut values = Array2::zeros((n_snps, combos.len()));
    let mut combo = vec![0usize; specs.len()];
    for snp in 0..n_snps {
        for (c, lv) in levels.iter().enumerate() {
            combo[c] = lv[snp];
        }
        values[[snp, column_of[combo_index(&combo)]]] = 1.0;
    }
    AnnotationMatrix::new(values, names)
}

pub fn bin_additive(covariates: &[Covariate]) -> Result<AnnotationMatrix> {
    bin_covariates(covariates, BinningMode::Additive)
}

pub fn bin_multiplicative(covariates: &[Covariate]) -> Result<AnnotationMatrix> {
    bin_covariates(covariates, BinningMode::Multiplicative)
}
