//! Windowed LD Score kernel.

use anyhow::Result;
use ndarray::{Array2, Axis, s};

use crate::error::LdscError;

/// For each SNP, the index of the leftmost SNP within `max_dist` of it.
/// `coords` must be sorted ascending; the result is non-decreasing and
/// `block_left[i] <= i`.
pub fn block_lefts(coords: &[f64], max_dist: f64) -> Vec<usize> {
    let mut out = Vec::with_capacity(coords.len());
    let mut j = 0;
    for (i, c) in coords.iter().enumerate() {
        while j < i && (c - coords[j]).abs() > max_dist {
            j += 1;
        }
        out.push(j);
    }
    out
}

/// Exclusive right window bound of every SNP: `j` is in the window of `i`
/// (for `j > i`) exactly when `block_left[j] <= i`.
fn block_rights(block_left: &[usize]) -> Vec<usize> {
    let m = block_left.len();
    let mut out = Vec::with_capacity(m);
    let mut j = 0;
    for i in 0..m {
        while j < m && block_left[j] <= i {
            j += 1;
        }
        out.push(j);
    }
    out
}

/// Bias-corrected r²: `r² − (1 − r²)/(n − 2)`.
pub fn r2_unbiased(r: f64, n: usize) -> f64 {
    let r2 = r * r;
    r2 - (1.0 - r2) / (n as f64 - 2.0)
}

/// Annotation-weighted LD Scores.
///
/// `geno` is individuals × SNPs with standardized columns, `annot` is
/// SNPs × annotations (a single all-ones column when `None`). SNPs are
/// processed `chunk_size` at a time against the span of their windows.
pub fn ld_scores(
    geno: &Array2<f64>,
    block_left: &[usize],
    chunk_size: usize,
    annot: Option<&Array2<f64>>,
) -> Result<Array2<f64>> {
    let (n, m) = geno.dim();
    if block_left.len() != m {
        return Err(LdscError::InvalidArgument(format!(
            "{} window boundaries for {m} SNPs",
            block_left.len()
        ))
        .into());
    }
    if chunk_size == 0 {
        return Err(LdscError::InvalidArgument("chunk size must be positive".into()).into());
    }
    if n < 3 {
        return Err(LdscError::InvalidArgument(format!(
            "at least 3 individuals are needed to estimate LD, found {n}"
        ))
        .into());
    }
    let ones;
    let annot = match annot {
        Some(a) => a,
        None => {
            ones = Array2::ones((m, 1));
            &ones
        }
    };
    if annot.nrows() != m {
        return Err(LdscError::InvalidArgument(format!(
            "annotation matrix has {} rows for {m} SNPs",
            annot.nrows()
        ))
        .into());
    }

    let rights = block_rights(block_left);
    let mut scores = Array2::zeros((m, annot.ncols()));
    let mut start = 0;
    while start < m {
        let end = (start + chunk_size).min(m);
        let lo = block_left[start];
        let hi = rights[end - 1];
        let chunk = geno.slice(s![.., start..end]);
        let span = geno.slice(s![.., lo..hi]);
        let r = chunk.t().dot(&span) / n as f64;

        for (ci, i) in (start..end).enumerate() {
            let left = block_left[i];
            let right = rights[i];
            let mut row = scores.index_axis_mut(Axis(0), i);
            for j in left..right {
                let weight = r2_unbiased(r[[ci, j - lo]], n);
                row.scaled_add(weight, &annot.row(j));
            }
        }
        start = end;
    }
    Ok(scores)
}
