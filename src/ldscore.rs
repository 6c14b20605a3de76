//! LD Score estimation from a PLINK reference panel.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::{Array2, Axis, concatenate};
use polars::prelude::*;

use crate::binning::{Covariate, bin_covariates};
use crate::error::LdscError;
use crate::filter::{filter_by_ids, read_filter_list};
use crate::genotype::{GenotypeArray, GenotypeSource, PlinkBed};
use crate::io::{read_id_list, write_gz_table, write_tab_line};
use crate::kernel::{block_lefts, ld_scores};
use crate::logging::RunLog;
use crate::matrix::{condition_number, correlation, describe, format_labeled_matrix, format_summary_table};
use crate::parse::{read_annot, read_cts};
use crate::qc::check_file_exists;
use crate::request::{AnnotationSource, FreqConfig, FrequencyScaling, LdScoreConfig, WindowSize};
use crate::types::{AnnotationMatrix, KeepMask, SnpList};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LdScoreThresholds {
    /// Condition number of the score matrix above which a warning is logged.
    pub ld_condition_warning: f64,
    /// MAF above which a SNP counts towards `M_5_50`.
    pub common_maf: f64,
}

impl Default for LdScoreThresholds {
    fn default() -> Self {
        Self {
            ld_condition_warning: 10_000.0,
            common_maf: 0.05,
        }
    }
}

/// Everything an LD Score run wrote, kept in memory for the caller.
#[derive(Debug, Clone)]
pub struct LdScoreOutcome {
    /// SNPs in the printed table.
    pub snps: SnpList,
    pub maf: Vec<f64>,
    pub names: Vec<String>,
    /// Printed SNPs × score columns.
    pub scores: Array2<f64>,
    pub m: Vec<f64>,
    pub m_5_50: Vec<f64>,
    pub condition_number: Option<f64>,
    pub ldscore_path: PathBuf,
}

/// Annotation matrix for the whole `.bim`, plus the SNPs to read.
struct ResolvedAnnotation {
    annot: Option<AnnotationMatrix>,
    keep_snps: KeepMask,
    binned: bool,
}

fn resolve_annotation(
    source: &AnnotationSource,
    snps: &SnpList,
    log: &mut RunLog,
) -> Result<ResolvedAnnotation> {
    let all = KeepMask::all(snps.len());
    Ok(match source {
        AnnotationSource::File(path) => {
            check_file_exists(path, "--annot")?;
            let annot = read_annot(path, snps)?;
            log.line(&format!(
                "Read {} annotations for {} SNPs from {}",
                annot.n_annot(),
                annot.n_snps(),
                path.display()
            ))?;
            ResolvedAnnotation {
                annot: Some(annot),
                keep_snps: all,
                binned: false,
            }
        }
        AnnotationSource::Extract(path) => {
            let idx = read_filter_list(path, "SNPs", "extract", &snps.ids(), log)?;
            ResolvedAnnotation {
                annot: None,
                keep_snps: KeepMask::from_indices(snps.len(), &idx),
                binned: false,
            }
        }
        AnnotationSource::Continuous {
            files,
            breaks,
            names,
            mode,
        } => {
            let ids = snps.ids();
            let mut covariates = Vec::with_capacity(files.len());
            for ((file, cuts), name) in files.iter().zip(breaks).zip(names) {
                check_file_exists(file, "--cts-bin")?;
                log.line(&format!("Reading continuous annotation {name} from {}", file.display()))?;
                covariates.push(Covariate {
                    name: name.clone(),
                    values: read_cts(file, &ids)?,
                    breaks: cuts.clone(),
                });
            }
            let annot = bin_covariates(&covariates, *mode)?;
            log.line(&format!(
                "Binned {} continuous annotations into {} categories ({mode:?})",
                covariates.len(),
                annot.n_annot()
            ))?;
            ResolvedAnnotation {
                annot: Some(annot),
                keep_snps: all,
                binned: true,
            }
        }
        AnnotationSource::None => ResolvedAnnotation {
            annot: None,
            keep_snps: all,
            binned: false,
        },
    })
}

/// Left window boundaries over the kept SNPs. A window spanning the whole
/// chromosome is refused unless `yes_really` is set.
pub fn window_boundaries(
    snps: &SnpList,
    window: WindowSize,
    yes_really: bool,
) -> Result<Vec<usize>> {
    let coords: Vec<f64> = match window {
        WindowSize::Snps(_) => (0..snps.len()).map(|i| i as f64).collect(),
        WindowSize::Kb(_) => snps.records.iter().map(|r| r.bp as f64).collect(),
        WindowSize::Cm(_) => snps.records.iter().map(|r| r.cm).collect(),
    };
    let block_left = block_lefts(&coords, window.max_distance());
    if block_left.last() == Some(&0) && !yes_really {
        return Err(LdscError::InvalidArgument(
            "Do you really want to compute whole-chromosome LD Score? If so, set the \
             --yes-really flag (warning: it will use a lot of time / memory)"
                .to_string(),
        )
        .into());
    }
    Ok(block_left)
}

fn score_names(annot: Option<&AnnotationMatrix>, scaling: FrequencyScaling) -> Vec<String> {
    let suffix = scaling.suffix();
    match annot {
        Some(a) if a.n_annot() > 1 => a.names.iter().map(|n| format!("{n}L2{suffix}")).collect(),
        _ => vec![format!("L2{suffix}")],
    }
}

fn snp_frame(snps: &SnpList) -> Vec<Column> {
    let records = &snps.records;
    vec![
        Column::from(Series::new(
            "CHR".into(),
            records.iter().map(|r| r.chr.clone()).collect::<Vec<_>>(),
        )),
        Column::from(Series::new("SNP".into(), snps.ids())),
        Column::from(Series::new(
            "BP".into(),
            records.iter().map(|r| r.bp).collect::<Vec<_>>(),
        )),
        Column::from(Series::new(
            "CM".into(),
            records.iter().map(|r| r.cm).collect::<Vec<_>>(),
        )),
    ]
}

fn matrix_columns(names: &[String], values: &Array2<f64>) -> Vec<Column> {
    names
        .iter()
        .zip(values.columns())
        .map(|(name, col)| Column::from(Series::new(name.as_str().into(), col.to_vec())))
        .collect()
}

/// Runs the LD Score pipeline on the PLINK fileset named in `config`.
pub fn ldscore(config: &LdScoreConfig, log: &mut RunLog) -> Result<LdScoreOutcome> {
    let mut bed = PlinkBed::open(&config.bfile)?;
    log.line(&format!(
        "Read list of {} SNPs from {}.bim",
        bed.snps().len(),
        config.bfile
    ))?;
    log.line(&format!(
        "Read list of {} individuals from {}.fam",
        bed.individuals().len(),
        config.bfile
    ))?;
    ldscore_from_source(&mut bed, config, log)
}

/// LD Score pipeline over any genotype source.
pub fn ldscore_from_source<G: GenotypeSource>(
    source: &mut G,
    config: &LdScoreConfig,
    log: &mut RunLog,
) -> Result<LdScoreOutcome> {
    let resolved = resolve_annotation(&config.annotation, source.snps(), log)?;

    let keep_indivs = match &config.keep {
        Some(path) => {
            let iids = source.individuals().to_vec();
            Some(read_filter_list(path, "individuals", "include", &iids, log)?)
        }
        None => None,
    };

    log.line(&format!(
        "Reading genotypes from {} SNPs",
        resolved.keep_snps.kept()
    ))?;
    let geno = source.read(&resolved.keep_snps, keep_indivs.as_deref(), config.maf_min)?;
    log.line(&format!(
        "After filtering, {} SNPs remain for {} individuals",
        geno.n_snps(),
        geno.n_indiv
    ))?;
    if geno.n_snps() == 0 {
        return Err(LdscError::empty_stage(
            "genotype filtering",
            "No SNPs retained for analysis",
        )
        .into());
    }

    let kept_idx = geno.kept.indices();
    let kept_snps = source.snps().subset(&kept_idx);
    let annot = resolved.annot.as_ref().map(|a| a.select_rows(&kept_idx));
    let block_left = window_boundaries(&kept_snps, config.window, config.yes_really)?;

    let names = score_names(annot.as_ref(), config.scaling);
    let effective = AnnotationMatrix::new(
        scaled_annotation(annot.as_ref(), &geno, config.scaling, log)?,
        names.clone(),
    )?;

    log.line(&format!(
        "Estimating LD Score for {} SNPs in chunks of {}",
        geno.n_snps(),
        config.chunk_size
    ))?;
    let scores = ld_scores(&geno.standardized, &block_left, config.chunk_size, Some(&effective.values))?;

    let m = effective.column_sums();
    let common: Vec<bool> = geno
        .maf
        .iter()
        .map(|f| *f > config.thresholds.common_maf)
        .collect();
    let m_5_50 = effective.column_sums_where(&common);

    let mut columns = snp_frame(&kept_snps);
    columns.push(Column::from(Series::new("MAF".into(), geno.maf.clone())));
    columns.extend(matrix_columns(&names, &scores));
    let mut table: DataFrame = columns.into_iter().collect();

    let mut printed_idx: Vec<usize> = (0..kept_snps.len()).collect();
    if let Some(path) = &config.print_snps {
        let allowed = read_id_list(path)?;
        log.line(&format!(
            "Reading list of {} SNPs for which to print LD Scores from {}",
            allowed.len(),
            path.display()
        ))?;
        table = filter_by_ids(&table, "SNP", &allowed)?;
        if table.height() == 0 {
            return Err(LdscError::empty_stage(
                format!("--print-snps {}", path.display()),
                "After merging with --print-snps, no SNPs remain.",
            )
            .into());
        }
        let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
        printed_idx.retain(|&i| allowed.contains(kept_snps.records[i].id.as_str()));
        log.line(&format!(
            "After merging with --print-snps, LD Scores for {} SNPs will be printed.",
            table.height()
        ))?;
    }

    let ldscore_path = PathBuf::from(format!("{}.l2.ldscore.gz", config.out));
    log.line(&format!(
        "Writing LD Scores for {} SNPs to {}",
        table.height(),
        ldscore_path.display()
    ))?;
    write_gz_table(&table, &ldscore_path)?;
    write_tab_line(&m, Path::new(&format!("{}.l2.M", config.out)))?;
    write_tab_line(&m_5_50, Path::new(&format!("{}.l2.M_5_50", config.out)))?;

    if resolved.binned
        && config.print_annot
        && let Some(annot) = &annot
    {
        let annot_path = PathBuf::from(format!("{}.annot.gz", config.out));
        log.line(&format!("Writing annot matrix to {}", annot_path.display()))?;
        let mut columns = snp_frame(&kept_snps);
        columns.extend(matrix_columns(&annot.names, &annot.values));
        let df: DataFrame = columns.into_iter().collect();
        write_gz_table(&df, &annot_path)?;
    }

    let printed_snps = kept_snps.subset(&printed_idx);
    let printed_maf: Vec<f64> = printed_idx.iter().map(|&i| geno.maf[i]).collect();
    let printed_scores = scores.select(Axis(0), &printed_idx);
    let cond = report_diagnostics(
        &ldscore_path,
        &names,
        &printed_maf,
        &printed_scores,
        config.thresholds,
        log,
    )?;

    Ok(LdScoreOutcome {
        snps: printed_snps,
        maf: printed_maf,
        names,
        scores: printed_scores,
        m,
        m_5_50,
        condition_number: cond,
        ldscore_path,
    })
}

/// Annotation matrix after frequency scaling; an all-ones column stands in
/// for a missing annotation.
fn scaled_annotation(
    annot: Option<&AnnotationMatrix>,
    geno: &GenotypeArray,
    scaling: FrequencyScaling,
    log: &mut RunLog,
) -> Result<Array2<f64>> {
    let mut values = match annot {
        Some(a) => a.values.clone(),
        None => Array2::ones((geno.n_snps(), 1)),
    };
    match scaling {
        FrequencyScaling::None => {}
        FrequencyScaling::Pq(exp) => log.line(&format!("Computing LD with pq ^ {exp}."))?,
        FrequencyScaling::Maf(exp) => log.line(&format!("Computing LD with MAF ^ {exp}."))?,
    }
    if scaling != FrequencyScaling::None {
        for (mut row, maf) in values.rows_mut().into_iter().zip(&geno.maf) {
            row *= scaling.factor(*maf);
        }
    }
    Ok(values)
}

fn report_diagnostics(
    path: &Path,
    names: &[String],
    maf: &[f64],
    scores: &Array2<f64>,
    thresholds: LdScoreThresholds,
    log: &mut RunLog,
) -> Result<Option<f64>> {
    let maf_col = Array2::from_shape_vec((maf.len(), 1), maf.to_vec())
        .context("MAF column shape")?;
    let table = concatenate(Axis(1), &[maf_col.view(), scores.view()])
        .context("join MAF and LD Scores")?;
    let mut labels = vec!["MAF".to_string()];
    labels.extend(names.iter().cloned());

    log.line("")?;
    log.line(&format!("Summary of LD Scores in {}", path.display()))?;
    log.line(&format_summary_table(&describe(&labels, &table)))?;
    log.line("")?;
    log.line("MAF/LD Score Correlation Matrix")?;
    log.line(&format_labeled_matrix(&labels, &correlation(&table)))?;

    if names.len() < 2 {
        return Ok(None);
    }
    let cond = condition_number(scores)?;
    log.line("")?;
    log.line(&format!("LD Score Matrix Condition Number {cond:.4}"))?;
    if cond > thresholds.ld_condition_warning {
        log.warn("WARNING: LD Score matrix is nearly singular. Use LD Scores with caution.")?;
    }
    Ok(Some(cond))
}

/// Writes `<out>.frq.gz` with `CHR SNP A1 A2 FRQ` for the extracted SNPs.
pub fn freq(config: &FreqConfig, log: &mut RunLog) -> Result<PathBuf> {
    let mut bed = PlinkBed::open(&config.bfile)?;
    log.line(&format!(
        "Read list of {} SNPs from {}.bim",
        bed.snps().len(),
        config.bfile
    ))?;
    log.line(&format!(
        "Read list of {} individuals from {}.fam",
        bed.individuals().len(),
        config.bfile
    ))?;

    let keep_indivs = match &config.keep {
        Some(path) => {
            let iids = bed.individuals().to_vec();
            Some(read_filter_list(path, "individuals", "include", &iids, log)?)
        }
        None => None,
    };
    let mut report = bed.frequency_report(keep_indivs.as_deref())?;
    if let Some(path) = &config.extract {
        let ids = bed.snps().ids();
        let idx = read_filter_list(path, "SNPs", "extract", &ids, log)?;
        let allowed: Vec<String> = idx.iter().map(|&i| ids[i].clone()).collect();
        report = filter_by_ids(&report, "SNP", &allowed)?;
    }

    let path = PathBuf::from(format!("{}.frq.gz", config.out));
    log.line(&format!(
        "Writing allele frequencies for {} SNPs to {}",
        report.height(),
        path.display()
    ))?;
    write_gz_table(&report, &path)?;
    Ok(path)
}
