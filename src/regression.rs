//! LD Score regression: merges summary statistics with reference and weight
//! LD Scores, filters, checks conditioning and runs one estimator.

use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array2, Axis};
use polars::prelude::*;

use crate::error::LdscError;
use crate::filter::{Bound, filter_rows_logged, merge_on_snp};
use crate::io::{column_names, extract_f64_column, extract_matrix, write_matrix};
use crate::jackknife::{
    Gencor, GencorInput, Hsq, HsqAggregate, HsqInput, JackknifeSummary,
};
use crate::logging::RunLog;
use crate::matrix::{condition_number, format_vector, variance};
use crate::parse::{
    read_annot_file, read_betaprod, read_chisq, read_ldscore, read_ldscore_fromfile, read_m,
    read_m_fromfile, read_w_ld,
};
use crate::qc::check_min_rows;
use crate::request::{
    HeritabilityEstimator, LdSource, MSource, RegressionRequest, RowFilters, SumstatsConfig,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionThresholds {
    /// Lower bound of the chi^2 cutoff for the intercept-only fit.
    pub intercept_chisq_floor: f64,
    /// Lower bound of the chi^2 cutoff for heritability and genetic correlation.
    pub chisq_floor: f64,
    /// The chi^2 cutoff is `max(chisq_n_scale * N_max, floor)`.
    pub chisq_n_scale: f64,
    pub max_condition_number: f64,
    pub min_snps_warning: usize,
}

impl Default for RegressionThresholds {
    fn default() -> Self {
        Self {
            intercept_chisq_floor: 20.0,
            chisq_floor: 80.0,
            chisq_n_scale: 0.001,
            max_condition_number: 100_000.0,
            min_snps_warning: 200_000,
        }
    }
}

impl RegressionThresholds {
    pub fn chisq_max(&self, n_max: f64, floor: f64) -> f64 {
        (self.chisq_n_scale * n_max).max(floor)
    }
}

/// Reference LD Scores with their M vector, column-aligned.
#[derive(Debug, Clone)]
pub struct ReferenceLd {
    /// `SNP` plus one column per entry of `names`.
    pub table: DataFrame,
    pub names: Vec<String>,
    pub m: Vec<f64>,
    /// Position of each remaining column among the columns originally read.
    pub source_columns: Vec<usize>,
    /// Number of LD Score columns originally read.
    pub n_source: usize,
}

impl ReferenceLd {
    pub fn new(table: DataFrame, m: Vec<f64>) -> Result<Self> {
        let names: Vec<String> = column_names(&table)
            .into_iter()
            .filter(|c| c != "SNP")
            .collect();
        if names.len() != m.len() {
            return Err(LdscError::InvalidArgument(format!(
                "# terms in --M must match # of LD Scores in --ref-ld ({} vs {}).",
                m.len(),
                names.len()
            ))
            .into());
        }
        let source_columns = (0..names.len()).collect();
        Ok(Self {
            table,
            n_source: names.len(),
            names,
            m,
            source_columns,
        })
    }

    pub fn n_annot(&self) -> usize {
        self.names.len()
    }

    fn keep_columns(self, keep: &[usize]) -> Result<Self> {
        if let Some(bad) = keep.iter().find(|&&i| i >= self.names.len()) {
            return Err(LdscError::InvalidArgument(format!(
                "--keep-ld column {bad} out of range for {} LD Score columns",
                self.names.len()
            ))
            .into());
        }
        let names: Vec<String> = keep.iter().map(|&i| self.names[i].clone()).collect();
        let mut select = vec!["SNP".to_string()];
        select.extend(names.iter().cloned());
        Ok(Self {
            table: self.table.select(select)?,
            m: keep.iter().map(|&i| self.m[i]).collect(),
            source_columns: keep.iter().map(|&i| self.source_columns[i]).collect(),
            n_source: self.n_source,
            names,
        })
    }
}

/// Removes reference LD columns with zero variance along with their M entries.
pub fn drop_zero_variance(ref_ld: ReferenceLd, log: &mut RunLog) -> Result<ReferenceLd> {
    let values = extract_matrix(&ref_ld.table, &ref_ld.names)?;
    let keep: Vec<usize> = values
        .columns()
        .into_iter()
        .enumerate()
        .filter_map(|(j, col)| (variance(col) != 0.0).then_some(j))
        .collect();
    if keep.len() == ref_ld.n_annot() {
        return Ok(ref_ld);
    }
    if keep.is_empty() {
        return Err(LdscError::InvalidArgument(
            "All LD Scores have zero variance.".to_string(),
        )
        .into());
    }
    log.line(&format!(
        "Removing {} partitioned LD Scores with zero variance.",
        ref_ld.n_annot() - keep.len()
    ))?;
    ref_ld.keep_columns(&keep)
}

/// Result of a regression run, with the categories it was fitted over.
#[derive(Debug, Clone)]
pub struct RegressionOutcome {
    pub names: Vec<String>,
    pub m: Vec<f64>,
    pub n_snps: usize,
    pub n_blocks: usize,
    pub estimate: Estimate,
}

#[derive(Debug, Clone)]
pub enum Estimate {
    Intercept(Hsq),
    Heritability(Hsq),
    Aggregate(HsqAggregate),
    GeneticCorrelation(Box<Gencor>),
}

fn read_reference(source: &LdSource) -> Result<DataFrame> {
    let chromosomes = source.chromosomes();
    match source {
        LdSource::Prefix(p) | LdSource::PerChromosome(p) => read_ldscore(p, chromosomes),
        LdSource::FromFile(path) | LdSource::FromFileChr(path) => {
            read_ldscore_fromfile(path, chromosomes)
        }
    }
}

fn read_m_vector(m_source: &MSource, ref_ld: &LdSource) -> Result<Vec<f64>> {
    let chromosomes = ref_ld.chromosomes();
    match m_source {
        MSource::Explicit(values) => Ok(values.clone()),
        MSource::File(prefix) => read_m(prefix, chromosomes, false),
        MSource::ReferenceLd { common } => match ref_ld {
            LdSource::Prefix(p) | LdSource::PerChromosome(p) => read_m(p, chromosomes, *common),
            LdSource::FromFile(path) | LdSource::FromFileChr(path) => {
                read_m_fromfile(path, chromosomes, *common)
            }
        },
    }
}

fn read_weights(source: &LdSource) -> Result<DataFrame> {
    match source {
        LdSource::Prefix(p) | LdSource::PerChromosome(p) => read_w_ld(p, source.chromosomes()),
        LdSource::FromFile(_) | LdSource::FromFileChr(_) => Err(LdscError::InvalidArgument(
            "regression weights must be given as an LD Score prefix".to_string(),
        )
        .into()),
    }
}

fn read_sumstats(request: &RegressionRequest, log: &mut RunLog) -> Result<DataFrame> {
    let df = match request {
        RegressionRequest::Intercept { prefix } | RegressionRequest::Heritability { prefix, .. } => {
            let path = format!("{prefix}.chisq.gz");
            read_chisq(Path::new(&path)).with_context(|| format!("read {path}"))?
        }
        RegressionRequest::GeneticCorrelation {
            prefix1, prefix2, ..
        } => read_betaprod(prefix1, prefix2)?,
    };
    log.line(&format!("Read summary statistics for {} SNPs.", df.height()))?;
    Ok(df)
}

fn apply_row_filters(
    mut df: DataFrame,
    filters: &RowFilters,
    suffixes: &[&str],
    log: &mut RunLog,
) -> Result<DataFrame> {
    for suffix in suffixes {
        let info = format!("INFO{suffix}");
        let maf = format!("MAF{suffix}");
        if let Some(max) = filters.info_max {
            df = filter_rows_logged(&df, &info, Bound::Below(max), log)?;
        }
        if let Some(min) = filters.info_min {
            df = filter_rows_logged(&df, &info, Bound::Above(min), log)?;
        }
        if let Some(min) = filters.maf_min {
            df = filter_rows_logged(&df, &maf, Bound::Above(min), log)?;
        }
    }
    Ok(df)
}

/// Keeps rows where every phenotype's chi^2 is below its own cutoff
/// `max(scale * N_max, floor)`.
pub fn filter_large_chisq(
    df: &DataFrame,
    phenotypes: &[(Vec<f64>, Vec<f64>)],
    floor: f64,
    thresholds: &RegressionThresholds,
    log: &mut RunLog,
) -> Result<DataFrame> {
    let mut keep = vec![true; df.height()];
    for (chisq, n) in phenotypes {
        let n_max = n.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let chisq_max = thresholds.chisq_max(n_max, floor);
        for (flag, c) in keep.iter_mut().zip(chisq) {
            *flag &= *c < chisq_max;
        }
        log.line(&format!("Removing SNPs with chi^2 >= {chisq_max}."))?;
    }
    let mask: BooleanChunked = keep.iter().copied().collect();
    let out = df.filter(&mask)?;
    log.line(&format!(
        "Removed {} SNPs with chi^2 >= cutoff ({} SNPs remain)",
        df.height() - out.height(),
        out.height()
    ))?;
    Ok(out)
}

fn clamp_blocks(requested: usize, n_snps: usize, log: &mut RunLog) -> Result<usize> {
    if requested > n_snps {
        log.line(&format!(
            "Reducing the number of jackknife blocks from {requested} to {n_snps}"
        ))?;
        return Ok(n_snps);
    }
    Ok(requested)
}

/// Fails when the reference LD matrix is too ill-conditioned to invert,
/// unless `invert_anyway` is set.
pub fn check_conditioning(
    ref_ld: &Array2<f64>,
    thresholds: &RegressionThresholds,
    invert_anyway: bool,
    log: &mut RunLog,
) -> Result<()> {
    if ref_ld.ncols() < 2 {
        return Ok(());
    }
    let cond = condition_number(ref_ld)?;
    if cond > thresholds.max_condition_number {
        if !invert_anyway {
            return Err(LdscError::IllConditioned(format!(
                "Attempting to invert a matrix with condition number {cond:.1}. \
                 Remove collinear LD Scores, or use --invert-anyway to proceed."
            ))
            .into());
        }
        log.warn(&format!(
            "WARNING: LD Score matrix condition number is {cond:.1}. Inverting anyway \
             because the --invert-anyway flag is set."
        ))?;
    }
    Ok(())
}

/// Runs the regression described by `config`.
pub fn sumstats(config: &SumstatsConfig, log: &mut RunLog) -> Result<RegressionOutcome> {
    let min_rows = config.request.min_rows();
    let sumstats = read_sumstats(&config.request, log)?;

    let table = read_reference(&config.ref_ld).context("read reference panel LD Scores")?;
    log.line(&format!(
        "Read reference panel LD Scores for {} SNPs.",
        table.height()
    ))?;
    let m = read_m_vector(&config.m_source, &config.ref_ld)?;
    let mut ref_ld = ReferenceLd::new(table, m)?;
    if let Some(keep) = &config.keep_ld {
        ref_ld = ref_ld.keep_columns(keep)?;
    }
    ref_ld = drop_zero_variance(ref_ld, log)?;

    let weights = read_weights(&config.w_ld).context("read regression weight LD Scores")?;
    log.line(&format!(
        "Read LD Scores for {} SNPs to be retained for regression.",
        weights.height()
    ))?;

    let merged = merge_on_snp(&sumstats, &ref_ld.table, "reference panel LD", min_rows, log)?;
    let merged = merge_on_snp(&merged, &weights, "regression SNP LD", min_rows, log)?;

    let suffixes: &[&str] = if config.request.is_genetic_correlation() {
        &["1", "2"]
    } else {
        &[""]
    };
    let merged = apply_row_filters(merged, &config.filters, suffixes, log)?;

    let ld_matrix = extract_matrix(&merged, &ref_ld.names)?;
    check_conditioning(
        &ld_matrix,
        &config.thresholds,
        config.invert_anyway,
        log,
    )?;

    let n_snps = merged.height();
    let n_blocks = clamp_blocks(config.n_blocks, n_snps, log)?;
    if n_snps < config.thresholds.min_snps_warning {
        log.warn(&format!(
            "WARNING: number of SNPs less than {}; this is almost always bad.",
            config.thresholds.min_snps_warning
        ))?;
    }

    let outcome = match &config.request {
        RegressionRequest::Intercept { .. } => {
            estimate_intercept(config, &ref_ld, n_blocks, merged, log)?
        }
        RegressionRequest::Heritability { estimator, .. } => {
            estimate_h2(config, &ref_ld, estimator, n_blocks, merged, log)?
        }
        RegressionRequest::GeneticCorrelation {
            intercepts,
            overlap,
            rho,
            ..
        } => estimate_rg(
            config,
            &ref_ld,
            RgWeighting {
                intercepts: *intercepts,
                overlap: *overlap,
                rho: *rho,
            },
            n_blocks,
            merged,
            log,
        )?,
    };
    write_outputs(config, &outcome, log)?;
    Ok(outcome)
}

/// Regression inputs pulled out of the filtered table.
struct Design {
    ld: Array2<f64>,
    w_ld: Vec<f64>,
    n_blocks: usize,
}

fn design(
    ref_ld: &ReferenceLd,
    df: &DataFrame,
    n_blocks: usize,
    min_rows: usize,
    log: &mut RunLog,
) -> Result<Design> {
    check_min_rows(df.height(), min_rows, "chi^2 filter")?;
    Ok(Design {
        ld: extract_matrix(df, &ref_ld.names)?,
        w_ld: extract_f64_column(df, "LD_weights")?,
        n_blocks: clamp_blocks(n_blocks, df.height(), log)?,
    })
}

fn chisq_columns(df: &DataFrame) -> Result<(Vec<f64>, Vec<f64>)> {
    Ok((extract_f64_column(df, "CHISQ")?, extract_f64_column(df, "N")?))
}

fn estimate_intercept(
    config: &SumstatsConfig,
    ref_ld: &ReferenceLd,
    n_blocks: usize,
    mut df: DataFrame,
    log: &mut RunLog,
) -> Result<RegressionOutcome> {
    if config.filter_chisq {
        let columns = chisq_columns(&df)?;
        df = filter_large_chisq(
            &df,
            &[columns],
            config.thresholds.intercept_chisq_floor,
            &config.thresholds,
            log,
        )?;
    }
    let d = design(ref_ld, &df, n_blocks, config.request.min_rows(), log)?;
    let (chisq, n) = chisq_columns(&df)?;
    let ld_tot = d.ld.sum_axis(Axis(1)).insert_axis(Axis(1));
    let m_tot = [ref_ld.m.iter().sum::<f64>()];
    let hsq = Hsq::new(HsqInput {
        chisq: &chisq,
        ref_ld: &ld_tot,
        w_ld: &d.w_ld,
        n: &n,
        m: &m_tot,
        n_blocks: d.n_blocks,
        intercept: None,
        non_negative: false,
    })?;
    log.line("")?;
    log.line(&hsq.summary_intercept())?;
    Ok(RegressionOutcome {
        names: vec!["L2".to_string()],
        m: m_tot.to_vec(),
        n_snps: df.height(),
        n_blocks: d.n_blocks,
        estimate: Estimate::Intercept(hsq),
    })
}

fn estimate_h2(
    config: &SumstatsConfig,
    ref_ld: &ReferenceLd,
    estimator: &HeritabilityEstimator,
    n_blocks: usize,
    mut df: DataFrame,
    log: &mut RunLog,
) -> Result<RegressionOutcome> {
    if config.filter_chisq {
        let columns = chisq_columns(&df)?;
        df = filter_large_chisq(
            &df,
            &[columns],
            config.thresholds.chisq_floor,
            &config.thresholds,
            log,
        )?;
    }
    let d = design(ref_ld, &df, n_blocks, config.request.min_rows(), log)?;
    let (chisq, n) = chisq_columns(&df)?;
    let input = |intercept: Option<f64>, non_negative: bool| HsqInput {
        chisq: &chisq,
        ref_ld: &d.ld,
        w_ld: &d.w_ld,
        n: &n,
        m: &ref_ld.m,
        n_blocks: d.n_blocks,
        intercept,
        non_negative,
    };

    log.line("")?;
    let estimate = match estimator {
        HeritabilityEstimator::Free { non_negative } => {
            let hsq = Hsq::new(input(None, *non_negative))?;
            log.line(&hsq.summary(&ref_ld.names))?;
            Estimate::Heritability(hsq)
        }
        HeritabilityEstimator::Constrained {
            intercept,
            non_negative,
        } => {
            log.line(&format!("Constraining the intercept to {intercept}."))?;
            let hsq = Hsq::new(input(Some(*intercept), *non_negative))?;
            log.line(&hsq.summary(&ref_ld.names))?;
            Estimate::Heritability(hsq)
        }
        HeritabilityEstimator::Aggregate { annot } => {
            let (_, overlay) = read_annot_file(annot)?;
            if overlay.n_annot() != ref_ld.n_source {
                return Err(LdscError::InvalidArgument(format!(
                    "{} has {} annotations but --ref-ld has {} LD Score columns",
                    annot.display(),
                    overlay.n_annot(),
                    ref_ld.n_source
                ))
                .into());
            }
            let values = overlay.values.select(Axis(1), &ref_ld.source_columns);
            log.line(&format!(
                "Aggregating heritability over {} annotations from {}",
                values.ncols(),
                annot.display()
            ))?;
            let agg = HsqAggregate::new(input(None, false), &values)?;
            log.line(&agg.summary(&ref_ld.names))?;
            Estimate::Aggregate(agg)
        }
    };
    Ok(RegressionOutcome {
        names: ref_ld.names.clone(),
        m: ref_ld.m.clone(),
        n_snps: df.height(),
        n_blocks: d.n_blocks,
        estimate,
    })
}

fn betahat_chisq(df: &DataFrame, suffix: &str) -> Result<(Vec<f64>, Vec<f64>)> {
    let beta = extract_f64_column(df, &format!("BETAHAT{suffix}"))?;
    let n = extract_f64_column(df, &format!("N{suffix}"))?;
    let chisq = beta.iter().zip(&n).map(|(b, n)| b * b * n).collect();
    Ok((chisq, n))
}

/// Intercept constraints and sample-overlap inputs of a genetic correlation.
#[derive(Debug, Clone, Copy)]
struct RgWeighting {
    intercepts: [Option<f64>; 3],
    overlap: f64,
    rho: f64,
}

fn estimate_rg(
    config: &SumstatsConfig,
    ref_ld: &ReferenceLd,
    weighting: RgWeighting,
    n_blocks: usize,
    mut df: DataFrame,
    log: &mut RunLog,
) -> Result<RegressionOutcome> {
    if config.filter_chisq {
        let phenotypes = [betahat_chisq(&df, "1")?, betahat_chisq(&df, "2")?];
        df = filter_large_chisq(
            &df,
            &phenotypes,
            config.thresholds.chisq_floor,
            &config.thresholds,
            log,
        )?;
    }
    let d = design(ref_ld, &df, n_blocks, config.request.min_rows(), log)?;
    let betahat1 = extract_f64_column(&df, "BETAHAT1")?;
    let betahat2 = extract_f64_column(&df, "BETAHAT2")?;
    let n1 = extract_f64_column(&df, "N1")?;
    let n2 = extract_f64_column(&df, "N2")?;

    let gencor = Gencor::new(GencorInput {
        betahat1: &betahat1,
        betahat2: &betahat2,
        ref_ld: &d.ld,
        w_ld: &d.w_ld,
        n1: &n1,
        n2: &n2,
        m: &ref_ld.m,
        intercepts: weighting.intercepts,
        overlap: weighting.overlap,
        rho: weighting.rho,
        n_blocks: d.n_blocks,
    })?;

    log.line("")?;
    log.line("Heritability of first phenotype")?;
    log.line(&gencor.hsq1.summary(&ref_ld.names))?;
    log.line("")?;
    log.line("Heritability of second phenotype")?;
    log.line(&gencor.hsq2.summary(&ref_ld.names))?;
    log.line("")?;
    log.line("Genetic Covariance")?;
    log.line(&gencor.gencov.summary(&ref_ld.names))?;
    log.line("")?;
    log.line(&gencor.summary())?;

    Ok(RegressionOutcome {
        names: ref_ld.names.clone(),
        m: ref_ld.m.clone(),
        n_snps: df.height(),
        n_blocks: d.n_blocks,
        estimate: Estimate::GeneticCorrelation(Box::new(gencor)),
    })
}

/// Output files of one estimator: `<out><cov_suffix>` and
/// `<out><delete_suffix>`.
struct OutputSuffixes {
    cov: &'static str,
    delete: &'static str,
}

const HSQ_FILES: OutputSuffixes = OutputSuffixes {
    cov: ".hsq.cov",
    delete: ".delete_k",
};

fn write_estimator(
    estimator: &dyn JackknifeSummary,
    files: OutputSuffixes,
    config: &SumstatsConfig,
    n_annot: usize,
    log: &mut RunLog,
) -> Result<()> {
    if n_annot > 1 && !config.human_only {
        let path = format!("{}{}", config.out, files.cov);
        log.line(&format!("Printing covariance matrix of the estimates to {path}."))?;
        write_matrix(estimator.covariance(), Path::new(&path))?;
    }
    if config.print_delete_vals {
        let path = format!("{}{}", config.out, files.delete);
        log.line(&format!("Printing block jackknife delete-k values to {path}."))?;
        write_matrix(&estimator.delete_values(), Path::new(&path))?;
    }
    Ok(())
}

fn write_outputs(config: &SumstatsConfig, outcome: &RegressionOutcome, log: &mut RunLog) -> Result<()> {
    let n_annot = outcome.names.len();
    match &outcome.estimate {
        Estimate::Intercept(_) => {}
        Estimate::Heritability(hsq) => write_estimator(hsq, HSQ_FILES, config, n_annot, log)?,
        Estimate::Aggregate(agg) => write_estimator(agg, HSQ_FILES, config, n_annot, log)?,
        Estimate::GeneticCorrelation(gencor) => {
            let parts: [(&dyn JackknifeSummary, OutputSuffixes); 3] = [
                (
                    &gencor.hsq1,
                    OutputSuffixes {
                        cov: ".hsq1.cov",
                        delete: ".hsq1.delete_k",
                    },
                ),
                (
                    &gencor.hsq2,
                    OutputSuffixes {
                        cov: ".hsq2.cov",
                        delete: ".hsq2.delete_k",
                    },
                ),
                (
                    &gencor.gencov,
                    OutputSuffixes {
                        cov: ".gencov.cov",
                        delete: ".gencov.delete_k",
                    },
                ),
            ];
            for (estimator, files) in parts {
                write_estimator(estimator, files, config, n_annot, log)?;
            }
        }
    }
    log.line(&format!("M: {}", format_vector(&outcome.m)))?;
    Ok(())
}
