//! Block-jackknife LD Score regression estimators.
//!
//! All estimators share one weighted least-squares core: the SNPs are split
//! into contiguous blocks, per-block `XᵀX`/`Xᵀy` sums are accumulated once, and
//! each delete-one-block solution is obtained by subtracting a block from the
//! totals.

use anyhow::{Context, Result, anyhow};
use ndarray::{Array1, Array2, Axis, s};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use crate::error::LdscError;
use crate::matrix::{covariance, mean, median, solve_linear};

/// Contiguous block boundaries, `floor(linspace(0, n, n_blocks + 1))`.
pub fn block_separators(n: usize, n_blocks: usize) -> Vec<usize> {
    (0..=n_blocks)
        .map(|i| ((i as f64) * (n as f64) / (n_blocks as f64)).floor() as usize)
        .collect()
}

/// Weighted block-jackknife least squares on an already weighted design.
#[derive(Debug, Clone)]
pub struct LstsqJackknife {
    pub est: Array1<f64>,
    /// `n_blocks × p` estimates with one block held out.
    pub delete_values: Array2<f64>,
    pub pseudovalues: Array2<f64>,
    pub cov: Array2<f64>,
    pub se: Array1<f64>,
    pub n_blocks: usize,
}

impl LstsqJackknife {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, n_blocks: usize) -> Result<Self> {
        let all: Vec<usize> = (0..x.ncols()).collect();
        Self::fit_columns(x, y, n_blocks, &all)
    }

    /// Like `fit`, but coefficients listed in `constrained` may not be negative.
    /// The most negative one is pinned at zero and the fit repeated until none
    /// remain negative; every block reuses the final active set.
    pub fn fit_non_negative(
        x: &Array2<f64>,
        y: &Array1<f64>,
        n_blocks: usize,
        constrained: &[usize],
    ) -> Result<Self> {
        let mut active: Vec<usize> = (0..x.ncols()).collect();
        loop {
            let fit = Self::fit_columns(x, y, n_blocks, &active)?;
            let most_negative = constrained
                .iter()
                .copied()
                .filter(|j| active.contains(j) && fit.est[*j] < 0.0)
                .min_by(|a, b| fit.est[*a].total_cmp(&fit.est[*b]));
            match most_negative {
                Some(j) if active.len() > 1 => active.retain(|c| *c != j),
                _ => return Ok(fit),
            }
        }
    }

    fn fit_columns(
        x: &Array2<f64>,
        y: &Array1<f64>,
        n_blocks: usize,
        columns: &[usize],
    ) -> Result<Self> {
        let n = x.nrows();
        let p = x.ncols();
        if y.len() != n {
            return Err(anyhow!("design has {n} rows but response has {}", y.len()));
        }
        if n_blocks < 2 || n_blocks > n {
            return Err(LdscError::InvalidArgument(format!(
                "block jackknife needs between 2 and {n} blocks, got {n_blocks}"
            ))
            .into());
        }
        let x = x.select(Axis(1), columns);
        let k = columns.len();
        let separators = block_separators(n, n_blocks);

        let mut xtx_blocks = Vec::with_capacity(n_blocks);
        let mut xty_blocks = Vec::with_capacity(n_blocks);
        let mut xtx = Array2::<f64>::zeros((k, k));
        let mut xty = Array1::<f64>::zeros(k);
        for pair in separators.windows(2) {
            let xb = x.slice(s![pair[0]..pair[1], ..]);
            let yb = y.slice(s![pair[0]..pair[1]]);
            let block_xtx = xb.t().dot(&xb);
            let block_xty = xb.t().dot(&yb);
            xtx += &block_xtx;
            xty += &block_xty;
            xtx_blocks.push(block_xtx);
            xty_blocks.push(block_xty);
        }

        let reg = solve_linear(&xtx, &xty).context("jackknife full-data solve")?;
        let mut est = Array1::zeros(p);
        for (c, v) in columns.iter().zip(reg.iter()) {
            est[*c] = *v;
        }

        let nb = n_blocks as f64;
        let mut delete_values = Array2::zeros((n_blocks, p));
        let mut pseudovalues = Array2::zeros((n_blocks, p));
        for b in 0..n_blocks {
            let del = solve_linear(&(&xtx - &xtx_blocks[b]), &(&xty - &xty_blocks[b]))
                .with_context(|| format!("jackknife solve with block {b} removed"))?;
            for (c, v) in columns.iter().zip(del.iter()) {
                delete_values[[b, *c]] = *v;
                pseudovalues[[b, *c]] = nb * est[*c] - (nb - 1.0) * v;
            }
        }

        let cov = covariance(&pseudovalues) / nb;
        let se = cov.diag().mapv(|v| v.max(0.0).sqrt());
        Ok(Self {
            est,
            delete_values,
            pseudovalues,
            cov,
            se,
            n_blocks,
        })
    }
}

/// Jackknife standard error of a scalar from its full-data value and its
/// delete-one-block values.
pub fn jackknife_se(estimate: f64, delete_values: &[f64]) -> f64 {
    let nb = delete_values.len() as f64;
    let pseudo: Vec<f64> = delete_values
        .iter()
        .map(|d| nb * estimate - (nb - 1.0) * d)
        .collect();
    let mu = pseudo.iter().sum::<f64>() / nb;
    let var = pseudo.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / (nb - 1.0).max(1.0);
    (var / nb).sqrt()
}

/// Shared diagnostic surface of every estimator.
pub trait JackknifeSummary {
    fn summary(&self, names: &[String]) -> String;
    fn summary_intercept(&self) -> String;
    /// Covariance of the per-category estimates.
    fn covariance(&self) -> &Array2<f64>;
    /// Delete-one-block values, without the intercept column when the
    /// intercept was estimated.
    fn delete_values(&self) -> Array2<f64>;
    fn intercept_constrained(&self) -> Option<f64>;
}

/// Scales weights to sum to one.
fn normalize(weights: Vec<f64>) -> Result<Vec<f64>> {
    let sum: f64 = weights.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return Err(anyhow!("sum of regression weights is {sum}"));
    }
    Ok(weights.into_iter().map(|w| w / sum).collect())
}

fn row_totals(ld: &Array2<f64>) -> Vec<f64> {
    ld.sum_axis(Axis(1)).to_vec()
}

fn mean_of(values: &[f64]) -> f64 {
    mean(Array1::from(values.to_vec()).view())
}

fn mean_product(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>() / a.len() as f64
}

fn clamp_or_zero(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        0.0
    }
}

/// Heteroskedasticity weight times the inverse of the over-counting LD Score.
fn weights_for_h2(
    x_tot: &[f64],
    w_ld: &[f64],
    n: &[f64],
    m_tot: f64,
    h2: f64,
    intercept: f64,
) -> Result<Vec<f64>> {
    let weights = x_tot
        .iter()
        .zip(w_ld)
        .zip(n)
        .map(|((ld, wld), n)| {
            let ld = ld.max(1.0);
            let wld = wld.max(1.0);
            let c = h2 * n / m_tot;
            let het_w = 1.0 / (2.0 * (intercept + c * ld).powi(2)).max(f64::EPSILON);
            let oc_w = 1.0 / wld;
            (het_w * oc_w).sqrt()
        })
        .collect();
    normalize(weights)
}

struct GencovWeightInput<'a> {
    x_tot: &'a [f64],
    w_ld: &'a [f64],
    n1: &'a [f64],
    n2: &'a [f64],
    m_tot: f64,
    h1: f64,
    h2: f64,
    intercept_hsq1: f64,
    intercept_hsq2: f64,
    gencov: f64,
    intercept_gencov: &'a [f64],
}

fn weights_for_gencov(input: GencovWeightInput<'_>) -> Result<Vec<f64>> {
    let h1 = input.h1.clamp(0.0, 1.0);
    let h2 = input.h2.clamp(0.0, 1.0);
    let weights = (0..input.x_tot.len())
        .map(|i| {
            let ld = input.x_tot[i].max(1.0);
            let wld = input.w_ld[i].max(1.0);
            let a = input.n1[i] * h1 * ld / input.m_tot + input.intercept_hsq1;
            let b = input.n2[i] * h2 * ld / input.m_tot + input.intercept_hsq2;
            let c = (input.n1[i] * input.n2[i]).sqrt() * input.gencov * ld / input.m_tot
                + input.intercept_gencov[i];
            let het_w = 1.0 / (a * b + c * c).max(f64::EPSILON);
            let oc_w = 1.0 / wld;
            (het_w * oc_w).sqrt()
        })
        .collect();
    normalize(weights)
}

/// Per-category fit shared by the heritability and covariance estimators.
#[derive(Debug, Clone)]
pub struct LdscFit {
    pub n_annot: usize,
    pub m: Vec<f64>,
    pub n_bar: f64,
    pub coef: Array1<f64>,
    pub coef_cov: Array2<f64>,
    pub cat: Array1<f64>,
    pub cat_cov: Array2<f64>,
    pub tot: f64,
    pub tot_se: f64,
    /// Total estimate with each block held out.
    pub tot_delete_values: Vec<f64>,
    pub intercept: f64,
    pub intercept_se: Option<f64>,
    pub constrain_intercept: Option<f64>,
    pub jknife: LstsqJackknife,
}

struct DesignInput<'a> {
    y: &'a [f64],
    ld: &'a Array2<f64>,
    n: &'a [f64],
    m: &'a [f64],
    weights: &'a [f64],
    n_blocks: usize,
    intercept: Option<f64>,
    non_negative: bool,
}

fn fit_design(input: DesignInput<'_>) -> Result<LdscFit> {
    let n_snps = input.ld.nrows();
    let n_annot = input.ld.ncols();
    let n_bar = mean_of(input.n);
    let p = if input.intercept.is_some() {
        n_annot
    } else {
        n_annot + 1
    };

    let mut x = Array2::<f64>::zeros((n_snps, p));
    let mut y = Array1::<f64>::zeros(n_snps);
    for i in 0..n_snps {
        let w = input.weights[i];
        for j in 0..n_annot {
            x[[i, j]] = input.ld[[i, j]] * input.n[i] / n_bar * w;
        }
        if input.intercept.is_none() {
            x[[i, n_annot]] = w;
        }
        y[i] = (input.y[i] - input.intercept.unwrap_or(0.0)) * w;
    }

    let jknife = if input.non_negative {
        let slopes: Vec<usize> = (0..n_annot).collect();
        LstsqJackknife::fit_non_negative(&x, &y, input.n_blocks, &slopes)?
    } else {
        LstsqJackknife::fit(&x, &y, input.n_blocks)?
    };

    let coef = jknife.est.slice(s![..n_annot]).mapv(|v| v / n_bar);
    let coef_cov = jknife.cov.slice(s![..n_annot, ..n_annot]).mapv(|v| v / (n_bar * n_bar));
    let m = Array1::from(input.m.to_vec());
    let cat = &coef * &m;
    let m_diag = Array2::from_diag(&m);
    let cat_cov = m_diag.dot(&coef_cov).dot(&m_diag);
    let tot = cat.sum();
    let tot_se = m.dot(&coef_cov.dot(&m)).max(0.0).sqrt();
    let tot_delete_values = jknife
        .delete_values
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .take(n_annot)
                .zip(input.m)
                .map(|(c, m)| c / n_bar * m)
                .sum::<f64>()
        })
        .collect();

    let (intercept, intercept_se) = match input.intercept {
        Some(fixed) => (fixed, None),
        None => (jknife.est[n_annot], Some(jknife.se[n_annot])),
    };

    Ok(LdscFit {
        n_annot,
        m: input.m.to_vec(),
        n_bar,
        coef,
        coef_cov,
        cat,
        cat_cov,
        tot,
        tot_se,
        tot_delete_values,
        intercept,
        intercept_se,
        constrain_intercept: input.intercept,
        jknife,
    })
}

fn check_inputs(ld: &Array2<f64>, lens: &[(usize, &str)], m: &[f64]) -> Result<()> {
    for (len, name) in lens {
        if *len != ld.nrows() {
            return Err(LdscError::InvalidArgument(format!(
                "{name} has {len} rows but the LD Score matrix has {}",
                ld.nrows()
            ))
            .into());
        }
    }
    if m.len() != ld.ncols() {
        return Err(LdscError::InvalidArgument(format!(
            "M has {} entries but the LD Score matrix has {} columns",
            m.len(),
            ld.ncols()
        ))
        .into());
    }
    Ok(())
}

fn lambda_gc(chisq: &[f64]) -> Result<f64> {
    let expected = ChiSquared::new(1.0)
        .map_err(|e| anyhow!("chi-squared distribution: {e}"))?
        .inverse_cdf(0.5);
    Ok(median(chisq).unwrap_or(f64::NAN) / expected)
}

fn format_row(label: &str, values: &Array1<f64>) -> String {
    let body = values
        .iter()
        .map(|v| format!("{v:.4}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{label}: {body}")
}

fn intercept_line(fit: &LdscFit) -> String {
    match (fit.constrain_intercept, fit.intercept_se) {
        (Some(c), _) => format!("Intercept: constrained to {c}"),
        (None, Some(se)) => format!("Intercept: {:.4} ({:.4})", fit.intercept, se),
        (None, None) => format!("Intercept: {:.4}", fit.intercept),
    }
}

fn category_lines(fit: &LdscFit, names: &[String], scale_label: &str) -> Vec<String> {
    let se = fit.cat_cov.diag().mapv(|v| v.max(0.0).sqrt());
    let m_tot: f64 = fit.m.iter().sum();
    let prop_snps = Array1::from(fit.m.iter().map(|m| m / m_tot).collect::<Vec<_>>());
    let prop = fit.cat.mapv(|c| c / fit.tot);
    let enrichment = &prop / &prop_snps;
    vec![
        format!("Categories: {}", names.join(" ")),
        format_row(scale_label, &fit.cat),
        format_row(&format!("{scale_label} SE"), &se),
        format_row("Proportion of SNPs", &prop_snps),
        format_row("Proportion of total", &prop),
        format_row("Enrichment", &enrichment),
        format_row("Coefficients", &fit.coef),
    ]
}

fn trimmed_delete_values(fit: &LdscFit) -> Array2<f64> {
    match fit.constrain_intercept {
        Some(_) => fit.jknife.delete_values.clone(),
        None => fit
            .jknife
            .delete_values
            .slice(s![.., ..fit.n_annot])
            .to_owned(),
    }
}

/// Inputs of a heritability fit.
#[derive(Debug, Clone, Copy)]
pub struct HsqInput<'a> {
    pub chisq: &'a [f64],
    pub ref_ld: &'a Array2<f64>,
    pub w_ld: &'a [f64],
    pub n: &'a [f64],
    pub m: &'a [f64],
    pub n_blocks: usize,
    pub intercept: Option<f64>,
    pub non_negative: bool,
}

/// (Partitioned) heritability estimate.
#[derive(Debug, Clone)]
pub struct Hsq {
    pub fit: LdscFit,
    pub mean_chisq: f64,
    pub lambda_gc: f64,
}

impl Hsq {
    pub fn new(input: HsqInput<'_>) -> Result<Self> {
        check_inputs(
            input.ref_ld,
            &[
                (input.chisq.len(), "chi^2"),
                (input.w_ld.len(), "weight LD Scores"),
                (input.n.len(), "N"),
            ],
            input.m,
        )?;
        let m_tot: f64 = input.m.iter().sum();
        let x_tot = row_totals(input.ref_ld);
        let intercept_guess = input.intercept.unwrap_or(1.0);
        let h2_guess = clamp_or_zero(
            m_tot * (mean_of(input.chisq) - intercept_guess) / mean_product(&x_tot, input.n),
            0.0,
            1.0,
        );
        let weights =
            weights_for_h2(&x_tot, input.w_ld, input.n, m_tot, h2_guess, intercept_guess)?;

        let fit = fit_design(DesignInput {
            y: input.chisq,
            ld: input.ref_ld,
            n: input.n,
            m: input.m,
            weights: &weights,
            n_blocks: input.n_blocks,
            intercept: input.intercept,
            non_negative: input.non_negative,
        })?;

        Ok(Self {
            fit,
            mean_chisq: mean_of(input.chisq),
            lambda_gc: lambda_gc(input.chisq)?,
        })
    }

    /// `(intercept - 1) / (mean chi^2 - 1)`, defined only when mean chi^2 > 1.
    pub fn ratio(&self) -> Option<(f64, Option<f64>)> {
        if self.mean_chisq <= 1.0 || self.fit.constrain_intercept.is_some() {
            return None;
        }
        let denom = self.mean_chisq - 1.0;
        Some((
            (self.fit.intercept - 1.0) / denom,
            self.fit.intercept_se.map(|se| se / denom),
        ))
    }

    fn statistic_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Lambda GC: {:.4}", self.lambda_gc),
            format!("Mean Chi^2: {:.4}", self.mean_chisq),
            intercept_line(&self.fit),
        ];
        match self.ratio() {
            Some((ratio, Some(se))) => lines.push(format!("Ratio: {ratio:.4} ({se:.4})")),
            Some((ratio, None)) => lines.push(format!("Ratio: {ratio:.4}")),
            None if self.fit.constrain_intercept.is_none() => {
                lines.push("Ratio: NA (mean chi^2 < 1)".to_string())
            }
            None => {}
        }
        lines
    }
}

impl JackknifeSummary for Hsq {
    fn summary(&self, names: &[String]) -> String {
        let mut lines = vec![format!(
            "Total observed scale h2: {:.4} ({:.4})",
            self.fit.tot, self.fit.tot_se
        )];
        if self.fit.n_annot > 1 {
            lines.extend(category_lines(&self.fit, names, "Observed scale h2"));
        }
        lines.extend(self.statistic_lines());
        lines.join("\n")
    }

    fn summary_intercept(&self) -> String {
        self.statistic_lines().join("\n")
    }

    fn covariance(&self) -> &Array2<f64> {
        &self.fit.cat_cov
    }

    fn delete_values(&self) -> Array2<f64> {
        trimmed_delete_values(&self.fit)
    }

    fn intercept_constrained(&self) -> Option<f64> {
        self.fit.constrain_intercept
    }
}

/// Heritability of each annotation's SNP set, accounting for overlap between
/// annotations: `h2(C_i) = sum_j (AᵀA)_ij tau_j`.
#[derive(Debug, Clone)]
pub struct HsqAggregate {
    pub hsq: Hsq,
    pub overlap: Array2<f64>,
    pub cat: Array1<f64>,
    pub cat_cov: Array2<f64>,
}

impl HsqAggregate {
    pub fn new(input: HsqInput<'_>, annot: &Array2<f64>) -> Result<Self> {
        if annot.ncols() != input.ref_ld.ncols() {
            return Err(LdscError::InvalidArgument(format!(
                "annotation file has {} annotations but {} LD Score columns are in use",
                annot.ncols(),
                input.ref_ld.ncols()
            ))
            .into());
        }
        let hsq = Hsq::new(HsqInput {
            intercept: None,
            non_negative: false,
            ..input
        })?;
        let overlap = annot.t().dot(annot);
        let cat = overlap.dot(&hsq.fit.coef);
        let cat_cov = overlap.dot(&hsq.fit.coef_cov).dot(&overlap.t());
        Ok(Self {
            hsq,
            overlap,
            cat,
            cat_cov,
        })
    }
}

impl JackknifeSummary for HsqAggregate {
    fn summary(&self, names: &[String]) -> String {
        let se = self.cat_cov.diag().mapv(|v| v.max(0.0).sqrt());
        let mut lines = vec![
            format!(
                "Total observed scale h2: {:.4} ({:.4})",
                self.hsq.fit.tot, self.hsq.fit.tot_se
            ),
            format!("Categories: {}", names.join(" ")),
            format_row("Aggregate h2", &self.cat),
            format_row("Aggregate h2 SE", &se),
            format_row(
                "Proportion of total",
                &self.cat.mapv(|c| c / self.hsq.fit.tot),
            ),
        ];
        lines.extend(self.hsq.statistic_lines());
        lines.join("\n")
    }

    fn summary_intercept(&self) -> String {
        self.hsq.summary_intercept()
    }

    fn covariance(&self) -> &Array2<f64> {
        &self.cat_cov
    }

    fn delete_values(&self) -> Array2<f64> {
        self.hsq.delete_values()
    }

    fn intercept_constrained(&self) -> Option<f64> {
        None
    }
}

/// Inputs of a genetic covariance fit.
#[derive(Debug, Clone, Copy)]
pub struct GencovInput<'a> {
    pub betahat1: &'a [f64],
    pub betahat2: &'a [f64],
    pub ref_ld: &'a Array2<f64>,
    pub w_ld: &'a [f64],
    pub n1: &'a [f64],
    pub n2: &'a [f64],
    pub m: &'a [f64],
    pub n_blocks: usize,
    pub intercept: Option<f64>,
    pub overlap: f64,
    pub rho: f64,
}

#[derive(Debug, Clone)]
pub struct Gencov {
    pub fit: LdscFit,
    pub mean_z1z2: f64,
}

impl Gencov {
    pub fn new(input: GencovInput<'_>, hsq1: &Hsq, hsq2: &Hsq) -> Result<Self> {
        check_inputs(
            input.ref_ld,
            &[
                (input.betahat1.len(), "BETAHAT1"),
                (input.betahat2.len(), "BETAHAT2"),
                (input.w_ld.len(), "weight LD Scores"),
                (input.n1.len(), "N1"),
                (input.n2.len(), "N2"),
            ],
            input.m,
        )?;
        let n_geo: Vec<f64> = input
            .n1
            .iter()
            .zip(input.n2)
            .map(|(a, b)| (a * b).sqrt())
            .collect();
        let z1z2: Vec<f64> = (0..n_geo.len())
            .map(|i| input.betahat1[i] * input.betahat2[i] * n_geo[i])
            .collect();

        let m_tot: f64 = input.m.iter().sum();
        let x_tot = row_totals(input.ref_ld);
        let intercept_guess: Vec<f64> = match input.intercept {
            Some(fixed) => vec![fixed; n_geo.len()],
            None => n_geo.iter().map(|n| input.overlap * input.rho / n).collect(),
        };
        let residual: Vec<f64> = z1z2
            .iter()
            .zip(&intercept_guess)
            .map(|(z, i)| z - i)
            .collect();
        let gencov_guess = clamp_or_zero(
            m_tot * mean_of(&residual) / mean_product(&x_tot, &n_geo),
            -1.0,
            1.0,
        );
        let weights = weights_for_gencov(GencovWeightInput {
            x_tot: &x_tot,
            w_ld: input.w_ld,
            n1: input.n1,
            n2: input.n2,
            m_tot,
            h1: hsq1.fit.tot,
            h2: hsq2.fit.tot,
            intercept_hsq1: hsq1.fit.intercept,
            intercept_hsq2: hsq2.fit.intercept,
            gencov: gencov_guess,
            intercept_gencov: &intercept_guess,
        })?;

        let fit = fit_design(DesignInput {
            y: &z1z2,
            ld: input.ref_ld,
            n: &n_geo,
            m: input.m,
            weights: &weights,
            n_blocks: input.n_blocks,
            intercept: input.intercept,
            non_negative: false,
        })?;
        Ok(Self {
            fit,
            mean_z1z2: mean_of(&z1z2),
        })
    }
}

impl JackknifeSummary for Gencov {
    fn summary(&self, names: &[String]) -> String {
        let mut lines = vec![format!(
            "Total observed scale gencov: {:.4} ({:.4})",
            self.fit.tot, self.fit.tot_se
        )];
        if self.fit.n_annot > 1 {
            lines.extend(category_lines(&self.fit, names, "Observed scale gencov"));
        }
        lines.push(format!("Mean z1*z2: {:.4}", self.mean_z1z2));
        lines.push(intercept_line(&self.fit));
        lines.join("\n")
    }

    fn summary_intercept(&self) -> String {
        intercept_line(&self.fit)
    }

    fn covariance(&self) -> &Array2<f64> {
        &self.fit.cat_cov
    }

    fn delete_values(&self) -> Array2<f64> {
        trimmed_delete_values(&self.fit)
    }

    fn intercept_constrained(&self) -> Option<f64> {
        self.fit.constrain_intercept
    }
}

/// Inputs of a genetic correlation analysis; `intercepts` holds the optional
/// fixed intercepts for (h2 of phenotype 1, h2 of phenotype 2, gencov).
#[derive(Debug, Clone, Copy)]
pub struct GencorInput<'a> {
    pub betahat1: &'a [f64],
    pub betahat2: &'a [f64],
    pub ref_ld: &'a Array2<f64>,
    pub w_ld: &'a [f64],
    pub n1: &'a [f64],
    pub n2: &'a [f64],
    pub m: &'a [f64],
    pub intercepts: [Option<f64>; 3],
    pub overlap: f64,
    pub rho: f64,
    pub n_blocks: usize,
}

/// Genetic correlation built from two heritability fits and one covariance
/// fit over the same SNPs and blocks.
#[derive(Debug, Clone)]
pub struct Gencor {
    pub hsq1: Hsq,
    pub hsq2: Hsq,
    pub gencov: Gencov,
    /// `None` when either heritability is not positive.
    pub rg: Option<f64>,
    pub rg_se: Option<f64>,
    pub z: Option<f64>,
    pub p: Option<f64>,
}

impl Gencor {
    pub fn new(input: GencorInput<'_>) -> Result<Self> {
        let chisq1: Vec<f64> = input
            .betahat1
            .iter()
            .zip(input.n1)
            .map(|(b, n)| b * b * n)
            .collect();
        let chisq2: Vec<f64> = input
            .betahat2
            .iter()
            .zip(input.n2)
            .map(|(b, n)| b * b * n)
            .collect();
        let hsq = |chisq: &[f64], n: &[f64], intercept: Option<f64>| {
            Hsq::new(HsqInput {
                chisq,
                ref_ld: input.ref_ld,
                w_ld: input.w_ld,
                n,
                m: input.m,
                n_blocks: input.n_blocks,
                intercept,
                non_negative: false,
            })
        };
        let hsq1 = hsq(&chisq1, input.n1, input.intercepts[0]).context("h2 of phenotype 1")?;
        let hsq2 = hsq(&chisq2, input.n2, input.intercepts[1]).context("h2 of phenotype 2")?;
        let gencov = Gencov::new(
            GencovInput {
                betahat1: input.betahat1,
                betahat2: input.betahat2,
                ref_ld: input.ref_ld,
                w_ld: input.w_ld,
                n1: input.n1,
                n2: input.n2,
                m: input.m,
                n_blocks: input.n_blocks,
                intercept: input.intercepts[2],
                overlap: input.overlap,
                rho: input.rho,
            },
            &hsq1,
            &hsq2,
        )
        .context("genetic covariance")?;

        let h1 = hsq1.fit.tot;
        let h2 = hsq2.fit.tot;
        let (rg, rg_se, z, p) = if h1 > 0.0 && h2 > 0.0 {
            let rg = gencov.fit.tot / (h1 * h2).sqrt();
            let delete: Vec<f64> = (0..input.n_blocks)
                .map(|b| {
                    gencov.fit.tot_delete_values[b]
                        / (hsq1.fit.tot_delete_values[b] * hsq2.fit.tot_delete_values[b]).sqrt()
                })
                .collect();
            let se = jackknife_se(rg, &delete);
            let z = rg / se;
            let normal = Normal::new(0.0, 1.0).map_err(|e| anyhow!("normal distribution: {e}"))?;
            let p = 2.0 * (1.0 - normal.cdf(z.abs()));
            (Some(rg), Some(se), Some(z), Some(p))
        } else {
            (None, None, None, None)
        };

        Ok(Self {
            hsq1,
            hsq2,
            gencov,
            rg,
            rg_se,
            z,
            p,
        })
    }

    pub fn summary(&self) -> String {
        match (self.rg, self.rg_se, self.z, self.p) {
            (Some(rg), Some(se), Some(z), Some(p)) => format!(
                "Genetic Correlation: {rg:.4} ({se:.4})\nZ-score: {z:.4}\nP: {p:.4e}"
            ),
            _ => "Genetic Correlation: NA (h2 out of bounds)".to_string(),
        }
    }
}
