//! Validation of raw flag sets into the configurations the pipelines run on.
//!
//! Every cross-flag rule is checked once here; the pipelines only ever see
//! closed enums of well-formed requests.

use std::path::PathBuf;

use crate::binning::{BinningMode, covariate_names, parse_breaks};
use crate::error::{LdscError, Result};
use crate::ldscore::LdScoreThresholds;
use crate::parse::N_CHROMOSOMES;
use crate::qc::check_range_f64;
use crate::regression::RegressionThresholds;

fn invalid(message: impl Into<String>) -> LdscError {
    LdscError::InvalidArgument(message.into())
}

fn count_set(flags: &[bool]) -> usize {
    flags.iter().filter(|f| **f).count()
}

/// Where the per-SNP annotation matrix comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationSource {
    /// `CHR SNP BP CM <annotations>` file aligned to the `.bim`.
    File(PathBuf),
    /// Single implicit annotation over the listed SNPs only.
    Extract(PathBuf),
    Continuous {
        files: Vec<PathBuf>,
        breaks: Vec<Vec<f64>>,
        names: Vec<String>,
        mode: BinningMode,
    },
    /// Single implicit annotation over all SNPs.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowSize {
    Snps(usize),
    Kb(f64),
    Cm(f64),
}

impl WindowSize {
    /// Maximum coordinate distance in the window's own unit (bp for `Kb`).
    pub fn max_distance(&self) -> f64 {
        match *self {
            WindowSize::Snps(n) => n as f64,
            WindowSize::Kb(kb) => kb * 1000.0,
            WindowSize::Cm(cm) => cm,
        }
    }
}

/// Per-SNP rescaling of the annotation matrix by allele frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrequencyScaling {
    None,
    /// `(maf * (1 - maf))^exp`
    Pq(f64),
    /// `maf^exp`
    Maf(f64),
}

impl FrequencyScaling {
    /// Column-name suffix marking rescaled scores.
    pub fn suffix(&self) -> String {
        match self {
            FrequencyScaling::None => String::new(),
            FrequencyScaling::Pq(exp) | FrequencyScaling::Maf(exp) => format!("_S{exp}"),
        }
    }

    pub fn factor(&self, maf: f64) -> f64 {
        match *self {
            FrequencyScaling::None => 1.0,
            FrequencyScaling::Pq(exp) => (maf * (1.0 - maf)).powf(exp),
            FrequencyScaling::Maf(exp) => maf.powf(exp),
        }
    }
}

/// Raw LD Score flags as given on the command line.
#[derive(Debug, Clone)]
pub struct LdScoreFlags {
    pub bfile: String,
    pub out: String,
    pub annot: Option<PathBuf>,
    pub extract: Option<PathBuf>,
    pub keep: Option<PathBuf>,
    pub cts_bin: Option<Vec<PathBuf>>,
    pub cts_bin_add: Option<Vec<PathBuf>>,
    pub cts_breaks: Option<String>,
    pub cts_names: Option<Vec<String>>,
    pub ld_wind_snps: Option<usize>,
    pub ld_wind_kb: Option<f64>,
    pub ld_wind_cm: Option<f64>,
    pub chunk_size: usize,
    pub maf: Option<f64>,
    pub per_allele: bool,
    pub pq_exp: Option<f64>,
    pub maf_exp: Option<f64>,
    pub print_snps: Option<PathBuf>,
    pub yes_really: bool,
    pub no_print_annot: bool,
}

impl LdScoreFlags {
    pub fn new(bfile: impl Into<String>, out: impl Into<String>) -> Self {
        Self {
            bfile: bfile.into(),
            out: out.into(),
            annot: None,
            extract: None,
            keep: None,
            cts_bin: None,
            cts_bin_add: None,
            cts_breaks: None,
            cts_names: None,
            ld_wind_snps: None,
            ld_wind_kb: None,
            ld_wind_cm: None,
            chunk_size: 50,
            maf: None,
            per_allele: false,
            pq_exp: None,
            maf_exp: None,
            print_snps: None,
            yes_really: false,
            no_print_annot: false,
        }
    }

    pub fn validate(&self) -> Result<LdScoreConfig> {
        let annotation = self.annotation_source()?;
        let window = self.window()?;
        let scaling = self.scaling()?;

        let maf_min = self.maf.unwrap_or(0.0);
        check_range_f64(maf_min, 0.0, 0.5, false, "--maf")?;
        if self.chunk_size == 0 {
            return Err(invalid("--chunk-size must be positive"));
        }

        Ok(LdScoreConfig {
            bfile: self.bfile.clone(),
            out: self.out.clone(),
            annotation,
            keep: self.keep.clone(),
            window,
            yes_really: self.yes_really,
            maf_min,
            chunk_size: self.chunk_size,
            scaling,
            print_snps: self.print_snps.clone(),
            print_annot: !self.no_print_annot,
            thresholds: LdScoreThresholds::default(),
        })
    }

    fn annotation_source(&self) -> Result<AnnotationSource> {
        let cts = self.cts_bin.is_some() || self.cts_bin_add.is_some();
        let sources = count_set(&[self.annot.is_some(), self.extract.is_some(), cts]);
        if sources > 1 {
            return Err(invalid(
                "--annot, --extract and --cts-bin/--cts-bin-add are mutually exclusive",
            ));
        }
        if self.cts_bin.is_some() && self.cts_bin_add.is_some() {
            return Err(invalid("Cannot set both --cts-bin and --cts-bin-add."));
        }
        if cts != self.cts_breaks.is_some() {
            return Err(invalid("Must set both or neither of --cts-bin and --cts-breaks."));
        }
        if !cts && self.cts_names.is_some() {
            return Err(invalid("--cts-names requires --cts-bin or --cts-bin-add."));
        }

        if let Some(path) = &self.annot {
            return Ok(AnnotationSource::File(path.clone()));
        }
        if let Some(path) = &self.extract {
            return Ok(AnnotationSource::Extract(path.clone()));
        }
        let (files, mode) = match (&self.cts_bin, &self.cts_bin_add) {
            (Some(files), _) => (files.clone(), BinningMode::Multiplicative),
            (None, Some(files)) => (files.clone(), BinningMode::Additive),
            (None, None) => return Ok(AnnotationSource::None),
        };
        let breaks = parse_breaks(self.cts_breaks.as_deref().unwrap_or_default())?;
        if breaks.len() != files.len() {
            return Err(invalid(
                "Need to specify one set of breaks for each file in --cts-bin.",
            ));
        }
        let names = covariate_names(files.len(), self.cts_names.as_deref())?;
        Ok(AnnotationSource::Continuous {
            files,
            breaks,
            names,
            mode,
        })
    }

    fn window(&self) -> Result<WindowSize> {
        let set = count_set(&[
            self.ld_wind_snps.is_some(),
            self.ld_wind_kb.is_some(),
            self.ld_wind_cm.is_some(),
        ]);
        if set != 1 {
            return Err(invalid("Must specify exactly one --ld-wind option"));
        }
        let window = match (self.ld_wind_snps, self.ld_wind_kb, self.ld_wind_cm) {
            (Some(n), _, _) => WindowSize::Snps(n),
            (_, Some(kb), _) => WindowSize::Kb(kb),
            (_, _, Some(cm)) => WindowSize::Cm(cm),
            _ => return Err(LdscError::Internal("window flag vanished".into())),
        };
        let dist = window.max_distance();
        if !dist.is_finite() || dist < 0.0 {
            return Err(invalid("--ld-wind must be a non-negative number"));
        }
        Ok(window)
    }

    fn scaling(&self) -> Result<FrequencyScaling> {
        if self.per_allele && self.pq_exp.is_some() {
            return Err(invalid(
                "Cannot set both --per-allele and --pq-exp (--per-allele is equivalent to --pq-exp 1).",
            ));
        }
        let pq = if self.per_allele {
            Some(1.0)
        } else {
            self.pq_exp
        };
        match (pq, self.maf_exp) {
            (Some(_), Some(_)) => Err(invalid("Cannot set both --pq-exp and --maf-exp.")),
            (Some(exp), None) => Ok(FrequencyScaling::Pq(exp)),
            (None, Some(exp)) => Ok(FrequencyScaling::Maf(exp)),
            (None, None) => Ok(FrequencyScaling::None),
        }
    }
}

/// Validated LD Score request.
#[derive(Debug, Clone)]
pub struct LdScoreConfig {
    pub bfile: String,
    pub out: String,
    pub annotation: AnnotationSource,
    pub keep: Option<PathBuf>,
    pub window: WindowSize,
    pub yes_really: bool,
    pub maf_min: f64,
    pub chunk_size: usize,
    pub scaling: FrequencyScaling,
    pub print_snps: Option<PathBuf>,
    pub print_annot: bool,
    pub thresholds: LdScoreThresholds,
}

/// Allele frequency report request.
#[derive(Debug, Clone)]
pub struct FreqConfig {
    pub bfile: String,
    pub out: String,
    pub extract: Option<PathBuf>,
    pub keep: Option<PathBuf>,
}

/// LD Score files, optionally split by chromosome or listed in a file of
/// prefixes.
#[derive(Debug, Clone, PartialEq)]
pub enum LdSource {
    Prefix(String),
    PerChromosome(String),
    FromFile(PathBuf),
    FromFileChr(PathBuf),
}

impl LdSource {
    pub fn chromosomes(&self) -> Option<u8> {
        match self {
            LdSource::Prefix(_) | LdSource::FromFile(_) => None,
            LdSource::PerChromosome(_) | LdSource::FromFileChr(_) => Some(N_CHROMOSOMES),
        }
    }
}

/// Origin of the M vector.
#[derive(Debug, Clone, PartialEq)]
pub enum MSource {
    Explicit(Vec<f64>),
    /// `.l2.M` files under another prefix.
    File(String),
    /// The `.l2.M_5_50` (`common`) or `.l2.M` files next to the reference LD.
    ReferenceLd { common: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeritabilityEstimator {
    Free { non_negative: bool },
    Constrained { intercept: f64, non_negative: bool },
    Aggregate { annot: PathBuf },
}

/// The single analysis a regression run performs.
#[derive(Debug, Clone, PartialEq)]
pub enum RegressionRequest {
    Intercept {
        prefix: String,
    },
    Heritability {
        prefix: String,
        estimator: HeritabilityEstimator,
    },
    GeneticCorrelation {
        prefix1: String,
        prefix2: String,
        /// h2 of phenotype 1, h2 of phenotype 2, genetic covariance.
        intercepts: [Option<f64>; 3],
        overlap: f64,
        rho: f64,
    },
}

impl RegressionRequest {
    /// Fewest SNPs the merges may leave.
    pub fn min_rows(&self) -> usize {
        match self {
            RegressionRequest::Intercept { .. } => 1,
            _ => 2,
        }
    }

    pub fn is_genetic_correlation(&self) -> bool {
        matches!(self, RegressionRequest::GeneticCorrelation { .. })
    }
}

/// Optional row filters on INFO and MAF.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RowFilters {
    pub info_min: Option<f64>,
    pub info_max: Option<f64>,
    pub maf_min: Option<f64>,
}

/// Raw regression flags as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct SumstatsFlags {
    pub out: String,
    pub intercept: Option<String>,
    pub h2: Option<String>,
    pub rg: Option<Vec<String>>,
    pub ref_ld: Option<String>,
    pub ref_ld_chr: Option<String>,
    pub ref_ld_fromfile: Option<PathBuf>,
    pub ref_ld_fromfile_chr: Option<PathBuf>,
    pub w_ld: Option<String>,
    pub w_ld_chr: Option<String>,
    pub m: Option<String>,
    pub m_file: Option<String>,
    pub not_m_5_50: bool,
    pub keep_ld: Option<String>,
    pub invert_anyway: bool,
    pub no_filter_chisq: bool,
    pub no_intercept: bool,
    pub constrain_intercept: Option<String>,
    pub non_negative: bool,
    pub aggregate: bool,
    pub annot: Option<PathBuf>,
    pub info_min: Option<f64>,
    pub info_max: Option<f64>,
    pub maf: Option<f64>,
    pub overlap: f64,
    pub rho: f64,
    pub num_blocks: usize,
    pub human_only: bool,
    pub print_delete_vals: bool,
}

fn parse_floats(text: &str, flag: &str) -> Result<Vec<f64>> {
    text.split(',')
        .map(|t| {
            t.trim().parse::<f64>().map_err(|e| {
                LdscError::Parse(format!("Could not coerce argument to {flag} to floats: {t:?} ({e})"))
            })
        })
        .collect()
}

impl SumstatsFlags {
    pub fn new(out: impl Into<String>) -> Self {
        Self {
            out: out.into(),
            num_blocks: 200,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<SumstatsConfig> {
        let ref_ld = self.ref_ld_source()?;
        let w_ld = self.w_ld_source()?;
        let m_source = self.m_source(&ref_ld)?;
        let request = self.request()?;

        let keep_ld = match &self.keep_ld {
            None => None,
            Some(text) => {
                let cols = text
                    .split(',')
                    .filter(|t| !t.trim().is_empty())
                    .map(|t| {
                        t.trim().parse::<usize>().map_err(|e| {
                            LdscError::Parse(format!(
                                "--keep-ld must be a comma-separated list of column numbers: {t:?} ({e})"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                if cols.is_empty() {
                    return Err(invalid("No reference LD columns retained by --keep-ld"));
                }
                Some(cols)
            }
        };

        if self.num_blocks < 2 {
            return Err(invalid("--num-blocks must be at least 2"));
        }
        if let (Some(lo), Some(hi)) = (self.info_min, self.info_max)
            && lo >= hi
        {
            return Err(invalid("--info-min must be below --info-max"));
        }
        if let Some(maf) = self.maf {
            check_range_f64(maf, 0.0, 0.5, false, "--maf")?;
        }

        Ok(SumstatsConfig {
            out: self.out.clone(),
            request,
            ref_ld,
            w_ld,
            m_source,
            keep_ld,
            filters: RowFilters {
                info_min: self.info_min,
                info_max: self.info_max,
                maf_min: self.maf,
            },
            invert_anyway: self.invert_anyway,
            filter_chisq: !self.no_filter_chisq,
            n_blocks: self.num_blocks,
            human_only: self.human_only,
            print_delete_vals: self.print_delete_vals,
            thresholds: RegressionThresholds::default(),
        })
    }

    fn ref_ld_source(&self) -> Result<LdSource> {
        let sources = count_set(&[
            self.ref_ld.is_some(),
            self.ref_ld_chr.is_some(),
            self.ref_ld_fromfile.is_some(),
            self.ref_ld_fromfile_chr.is_some(),
        ]);
        if sources != 1 {
            return Err(invalid(
                "Must specify exactly one of --ref-ld, --ref-ld-chr, --ref-ld-fromfile, \
                 --ref-ld-fromfile-chr.",
            ));
        }
        Ok(match (
            &self.ref_ld,
            &self.ref_ld_chr,
            &self.ref_ld_fromfile,
            &self.ref_ld_fromfile_chr,
        ) {
            (Some(p), _, _, _) => LdSource::Prefix(p.clone()),
            (_, Some(p), _, _) => LdSource::PerChromosome(p.clone()),
            (_, _, Some(p), _) => LdSource::FromFile(p.clone()),
            (_, _, _, Some(p)) => LdSource::FromFileChr(p.clone()),
            _ => return Err(LdscError::Internal("reference LD flag vanished".into())),
        })
    }

    fn w_ld_source(&self) -> Result<LdSource> {
        match (&self.w_ld, &self.w_ld_chr) {
            (Some(_), Some(_)) => Err(invalid("Cannot specify both --w-ld and --w-ld-chr.")),
            (Some(p), None) => Ok(LdSource::Prefix(p.clone())),
            (None, Some(p)) => Ok(LdSource::PerChromosome(p.clone())),
            (None, None) => Err(invalid("Must specify one of --w-ld or --w-ld-chr.")),
        }
    }

    fn m_source(&self, ref_ld: &LdSource) -> Result<MSource> {
        if self.m.is_some() && self.m_file.is_some() {
            return Err(invalid("Cannot specify both --M and --M-file."));
        }
        if let Some(text) = &self.m {
            return Ok(MSource::Explicit(parse_floats(text, "--M")?));
        }
        if let Some(prefix) = &self.m_file {
            if matches!(ref_ld, LdSource::FromFile(_) | LdSource::FromFileChr(_)) {
                return Err(invalid(
                    "--M-file cannot be combined with --ref-ld-fromfile; use --M instead.",
                ));
            }
            return Ok(MSource::File(prefix.clone()));
        }
        Ok(MSource::ReferenceLd {
            common: !self.not_m_5_50,
        })
    }

    fn request(&self) -> Result<RegressionRequest> {
        let modes = count_set(&[
            self.intercept.is_some(),
            self.h2.is_some(),
            self.rg.is_some(),
        ]);
        if modes > 1 {
            return Err(invalid("Cannot specify more than one of --h2, --rg, --intercept."));
        }
        if modes == 0 {
            return Err(invalid("Must specify one of --h2, --rg, --intercept."));
        }
        if self.no_intercept && self.constrain_intercept.is_some() {
            return Err(invalid("Cannot set both --no-intercept and --constrain-intercept."));
        }
        if (self.rho != 0.0 || self.overlap != 0.0) && self.rg.is_none() {
            return Err(invalid("--rho and --overlap can only be used with --rg."));
        }
        if self.rg.is_none() && self.non_negative && self.aggregate {
            return Err(invalid("--non-negative cannot be combined with --aggregate."));
        }

        if let Some(prefix) = &self.intercept {
            if self.no_intercept || self.constrain_intercept.is_some() || self.aggregate {
                return Err(invalid(
                    "--intercept estimates the intercept; it cannot be constrained or aggregated.",
                ));
            }
            return Ok(RegressionRequest::Intercept {
                prefix: prefix.clone(),
            });
        }

        if let Some(prefix) = &self.h2 {
            let constrained = if self.no_intercept {
                Some(1.0)
            } else {
                match &self.constrain_intercept {
                    Some(text) => {
                        let values = parse_floats(text, "--constrain-intercept")?;
                        if values.len() != 1 {
                            return Err(invalid(
                                "--constrain-intercept with --h2 takes a single value.",
                            ));
                        }
                        Some(values[0])
                    }
                    None => None,
                }
            };
            let estimator = match (constrained, self.aggregate) {
                (Some(_), true) => {
                    return Err(invalid(
                        "--aggregate cannot be combined with a constrained intercept.",
                    ));
                }
                (Some(intercept), false) => HeritabilityEstimator::Constrained {
                    intercept,
                    non_negative: self.non_negative,
                },
                (None, true) => match &self.annot {
                    Some(annot) => HeritabilityEstimator::Aggregate {
                        annot: annot.clone(),
                    },
                    None => return Err(invalid("No annot file specified.")),
                },
                (None, false) => HeritabilityEstimator::Free {
                    non_negative: self.non_negative,
                },
            };
            return Ok(RegressionRequest::Heritability {
                prefix: prefix.clone(),
                estimator,
            });
        }

        let prefixes = self.rg.as_deref().unwrap_or_default();
        let [prefix1, prefix2] = prefixes else {
            return Err(invalid(
                "argument to --rg must be two .chisq/.allele fileset prefixes separated by a comma.",
            ));
        };
        if (self.rho != 0.0) != (self.overlap != 0.0) {
            return Err(invalid("Must specify either both or neither of --rho and --overlap."));
        }
        if self.aggregate || self.non_negative {
            return Err(invalid("--aggregate and --non-negative apply only to --h2."));
        }
        check_range_f64(self.rho, -1.0, 1.0, false, "--rho")?;
        if self.overlap < 0.0 {
            return Err(invalid("--overlap must be non-negative"));
        }
        let intercepts = if self.no_intercept {
            [Some(1.0), Some(1.0), Some(0.0)]
        } else {
            match &self.constrain_intercept {
                Some(text) => {
                    let values = parse_floats(text, "--constrain-intercept")?;
                    let [a, b, c] = values[..] else {
                        return Err(invalid(
                            "If using --constrain-intercept with --rg, must specify a \
                             comma-separated list of three intercepts. The first two for the h2 \
                             estimates; the third for the gencov estimate.",
                        ));
                    };
                    [Some(a), Some(b), Some(c)]
                }
                None => [None, None, None],
            }
        };
        Ok(RegressionRequest::GeneticCorrelation {
            prefix1: prefix1.clone(),
            prefix2: prefix2.clone(),
            intercepts,
            overlap: self.overlap,
            rho: self.rho,
        })
    }
}

/// Validated regression request.
#[derive(Debug, Clone)]
pub struct SumstatsConfig {
    pub out: String,
    pub request: RegressionRequest,
    pub ref_ld: LdSource,
    pub w_ld: LdSource,
    pub m_source: MSource,
    /// Zero-based reference LD columns to keep, applied to M as well.
    pub keep_ld: Option<Vec<usize>>,
    pub filters: RowFilters,
    pub invert_anyway: bool,
    pub filter_chisq: bool,
    pub n_blocks: usize,
    pub human_only: bool,
    pub print_delete_vals: bool,
    pub thresholds: RegressionThresholds,
}
