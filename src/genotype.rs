use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use bed_reader::{Bed, ReadOptions};
use ndarray::Array2;
use polars::prelude::*;

use crate::error::LdscError;
use crate::types::{KeepMask, SnpList, SnpRecord};

/// Genotypes of the retained SNPs for the retained individuals.
#[derive(Debug, Clone)]
pub struct GenotypeArray {
    pub n_indiv: usize,
    /// Retained SNPs over the original SNP order.
    pub kept: KeepMask,
    /// Minor allele frequency of each retained SNP.
    pub maf: Vec<f64>,
    /// Individuals × retained SNPs, centered and scaled by the observed
    /// standard deviation.
    pub standardized: Array2<f64>,
}

impl GenotypeArray {
    pub fn n_snps(&self) -> usize {
        self.standardized.ncols()
    }
}

/// Source of genotypes for the LD Score pipeline.
pub trait GenotypeSource {
    fn snps(&self) -> &SnpList;
    fn individuals(&self) -> &[String];
    /// Reads `keep_snps` for `keep_indivs` (all individuals when `None`),
    /// dropping SNPs whose MAF is not above `maf_min`.
    fn read(
        &mut self,
        keep_snps: &KeepMask,
        keep_indivs: Option<&[usize]>,
        maf_min: f64,
    ) -> Result<GenotypeArray>;
}

/// PLINK `.bed/.bim/.fam` fileset.
pub struct PlinkBed {
    bed: Bed,
    path: PathBuf,
    snps: SnpList,
    iids: Vec<String>,
    allele_1: Vec<String>,
    allele_2: Vec<String>,
}

fn bed_error(path: &Path, e: impl std::fmt::Display) -> anyhow::Error {
    anyhow!("PLINK fileset {}: {e}", path.display())
}

impl PlinkBed {
    /// Opens `<prefix>.bed` together with its `.bim` and `.fam`.
    pub fn open(prefix: &str) -> Result<Self> {
        let path = PathBuf::from(format!("{prefix}.bed"));
        let mut bed = Bed::new(&path).map_err(|e| bed_error(&path, e))?;

        let chromosome = bed.chromosome().map_err(|e| bed_error(&path, e))?.to_owned();
        let sid = bed.sid().map_err(|e| bed_error(&path, e))?.to_owned();
        let bp = bed.bp_position().map_err(|e| bed_error(&path, e))?.to_owned();
        let cm = bed.cm_position().map_err(|e| bed_error(&path, e))?.to_owned();
        let allele_1 = bed.allele_1().map_err(|e| bed_error(&path, e))?.to_vec();
        let allele_2 = bed.allele_2().map_err(|e| bed_error(&path, e))?.to_vec();
        let iids = bed.iid().map_err(|e| bed_error(&path, e))?.to_vec();

        let records = (0..sid.len())
            .map(|i| SnpRecord {
                chr: chromosome[i].clone(),
                id: sid[i].clone(),
                bp: i64::from(bp[i]),
                cm: f64::from(cm[i]),
            })
            .collect();

        Ok(Self {
            bed,
            path,
            snps: SnpList::new(records),
            iids,
            allele_1,
            allele_2,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Allele-1 dosages (0, 1, 2; NaN when missing), individuals × SNPs.
    fn read_dosages(&mut self, snp_idx: &[usize], indiv_idx: &[usize]) -> Result<Array2<f64>> {
        let sid_index: Vec<isize> = snp_idx.iter().map(|&i| i as isize).collect();
        let iid_index: Vec<isize> = indiv_idx.iter().map(|&i| i as isize).collect();
        ReadOptions::builder()
            .iid_index(&iid_index)
            .sid_index(&sid_index)
            .f64()
            .read(&mut self.bed)
            .map_err(|e| bed_error(&self.path, e))
    }

    fn indiv_indices(&self, keep_indivs: Option<&[usize]>) -> Vec<usize> {
        match keep_indivs {
            Some(idx) => idx.to_vec(),
            None => (0..self.iids.len()).collect(),
        }
    }

    /// Allele-1 frequency of every SNP over the kept individuals.
    pub fn allele_frequencies(&mut self, keep_indivs: Option<&[usize]>) -> Result<Vec<f64>> {
        let indivs = self.indiv_indices(keep_indivs);
        let snp_idx: Vec<usize> = (0..self.snps.len()).collect();
        let dosages = self.read_dosages(&snp_idx, &indivs)?;
        Ok(dosages
            .columns()
            .into_iter()
            .map(|col| column_stats(col.iter().copied()).freq)
            .collect())
    }

    /// `CHR SNP A1 A2 FRQ` table for the kept individuals.
    pub fn frequency_report(&mut self, keep_indivs: Option<&[usize]>) -> Result<DataFrame> {
        let freq = self.allele_frequencies(keep_indivs)?;
        let chr: Vec<String> = self.snps.records.iter().map(|r| r.chr.clone()).collect();
        let df: DataFrame = [
            Column::from(Series::new("CHR".into(), chr)),
            Column::from(Series::new("SNP".into(), self.snps.ids())),
            Column::from(Series::new("A1".into(), self.allele_1.clone())),
            Column::from(Series::new("A2".into(), self.allele_2.clone())),
            Column::from(Series::new("FRQ".into(), freq)),
        ]
        .into_iter()
        .collect();
        Ok(df)
    }
}

struct ColumnStats {
    freq: f64,
    mean: f64,
    sd: f64,
}

fn column_stats(values: impl Iterator<Item = f64>) -> ColumnStats {
    let observed: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if observed.is_empty() {
        return ColumnStats {
            freq: 0.0,
            mean: 0.0,
            sd: 0.0,
        };
    }
    let n = observed.len() as f64;
    let mean = observed.iter().sum::<f64>() / n;
    let var = observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    ColumnStats {
        freq: mean / 2.0,
        mean,
        sd: var.sqrt(),
    }
}

impl GenotypeSource for PlinkBed {
    fn snps(&self) -> &SnpList {
        &self.snps
    }

    fn individuals(&self) -> &[String] {
        &self.iids
    }

    fn read(
        &mut self,
        keep_snps: &KeepMask,
        keep_indivs: Option<&[usize]>,
        maf_min: f64,
    ) -> Result<GenotypeArray> {
        if keep_snps.len() != self.snps.len() {
            return Err(LdscError::InvalidArgument(format!(
                "SNP keep mask has {} entries for {} SNPs",
                keep_snps.len(),
                self.snps.len()
            ))
            .into());
        }
        let indivs = self.indiv_indices(keep_indivs);
        let candidates = keep_snps.indices();
        let dosages = self.read_dosages(&candidates, &indivs)?;
        let n_indiv = dosages.nrows();

        let mut mask = vec![false; self.snps.len()];
        let mut maf = Vec::new();
        let mut columns = Vec::new();
        for (j, col) in dosages.columns().into_iter().enumerate() {
            let stats = column_stats(col.iter().copied());
            let snp_maf = stats.freq.min(1.0 - stats.freq);
            if snp_maf <= maf_min || stats.sd == 0.0 {
                continue;
            }
            let standardized: Vec<f64> = col
                .iter()
                .map(|v| {
                    let v = if v.is_finite() { *v } else { stats.mean };
                    (v - stats.mean) / stats.sd
                })
                .collect();
            mask[candidates[j]] = true;
            maf.push(snp_maf);
            columns.push(standardized);
        }

        let mut standardized = Array2::zeros((n_indiv, columns.len()));
        for (j, col) in columns.iter().enumerate() {
            for (i, v) in col.iter().enumerate() {
                standardized[[i, j]] = *v;
            }
        }

        Ok(GenotypeArray {
            n_indiv,
            kept: KeepMask::from_bools(mask),
            maf,
            standardized,
        })
    }
}
