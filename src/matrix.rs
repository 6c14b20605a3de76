use anyhow::{Context, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_linalg::{SVD, Solve};

/// 2-norm condition number (ratio of extreme singular values). Rank-deficient
/// matrices report infinity.
pub fn condition_number(matrix: &Array2<f64>) -> Result<f64> {
    if matrix.is_empty() {
        return Err(anyhow::anyhow!("condition number of an empty matrix"));
    }
    let (_, singular, _) = matrix
        .svd(false, false)
        .context("singular value decomposition")?;
    let max = singular.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = singular.iter().cloned().fold(f64::INFINITY, f64::min);
    if min == 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok(max / min)
}

pub fn solve_linear(xtx: &Array2<f64>, xty: &Array1<f64>) -> Result<Array1<f64>> {
    xtx.solve(xty).context("solve linear system")
}

pub fn mean(values: ArrayView1<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sum() / values.len() as f64
}

/// Sample variance (n - 1 denominator).
pub fn variance(values: ArrayView1<f64>) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mu = mean(values);
    values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / (n as f64 - 1.0)
}

pub fn column_variances(matrix: &Array2<f64>) -> Vec<f64> {
    matrix.columns().into_iter().map(variance).collect()
}

/// Sample covariance of the rows of `rows` (observations × variables).
pub fn covariance(rows: &Array2<f64>) -> Array2<f64> {
    let n = rows.nrows();
    let p = rows.ncols();
    if n == 0 {
        return Array2::zeros((p, p));
    }
    let means = rows.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(p));
    let centered = rows - &means;
    let denom = (n as f64 - 1.0).max(1.0);
    centered.t().dot(&centered) / denom
}

pub fn correlation(rows: &Array2<f64>) -> Array2<f64> {
    let cov = covariance(rows);
    let sd: Vec<f64> = cov.diag().iter().map(|v| v.sqrt()).collect();
    let p = cov.nrows();
    let mut out = Array2::zeros((p, p));
    for i in 0..p {
        for j in 0..p {
            let denom = sd[i] * sd[j];
            out[[i, j]] = if denom > 0.0 {
                cov[[i, j]] / denom
            } else {
                f64::NAN
            };
        }
    }
    out
}

/// Linear-interpolated quantile of already sorted values.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn median(values: &[f64]) -> Option<f64> {
    let mut vals: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if vals.is_empty() {
        return None;
    }
    vals.sort_by(|a, b| a.total_cmp(b));
    Some(quantile_sorted(&vals, 0.5))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub max: f64,
}

pub fn describe(names: &[String], matrix: &Array2<f64>) -> Vec<ColumnSummary> {
    names
        .iter()
        .zip(matrix.columns())
        .map(|(name, col)| {
            let mut sorted: Vec<f64> = col.iter().copied().collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            ColumnSummary {
                name: name.clone(),
                mean: mean(col),
                std: variance(col).sqrt(),
                min: sorted.first().copied().unwrap_or(f64::NAN),
                q25: quantile_sorted(&sorted, 0.25),
                q50: quantile_sorted(&sorted, 0.5),
                q75: quantile_sorted(&sorted, 0.75),
                max: sorted.last().copied().unwrap_or(f64::NAN),
            }
        })
        .collect()
}

pub fn format_summary_table(summaries: &[ColumnSummary]) -> String {
    let mut out = format!(
        "{:<20}{:>12}{:>12}{:>12}{:>12}{:>12}{:>12}{:>12}",
        "", "mean", "std", "min", "25%", "50%", "75%", "max"
    );
    for s in summaries {
        out.push_str(&format!(
            "\n{:<20}{:>12.4}{:>12.4}{:>12.4}{:>12.4}{:>12.4}{:>12.4}{:>12.4}",
            s.name, s.mean, s.std, s.min, s.q25, s.q50, s.q75, s.max
        ));
    }
    out
}

pub fn format_labeled_matrix(names: &[String], matrix: &Array2<f64>) -> String {
    let mut out = format!("{:<20}", "");
    for name in names {
        out.push_str(&format!("{name:>14}"));
    }
    for (name, row) in names.iter().zip(matrix.rows()) {
        out.push_str(&format!("\n{name:<20}"));
        for v in row {
            out.push_str(&format!("{v:>14.4}"));
        }
    }
    out
}

pub fn format_vector(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:.4}"))
        .collect::<Vec<_>>()
        .join(" ")
}
