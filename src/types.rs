use ndarray::Array2;

use crate::error::{LdscError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct SnpRecord {
    pub chr: String,
    pub id: String,
    pub bp: i64,
    pub cm: f64,
}

/// Ordered SNP list as read from a `.bim` file.
#[derive(Debug, Clone, Default)]
pub struct SnpList {
    pub records: Vec<SnpRecord>,
}

impl SnpList {
    pub fn new(records: Vec<SnpRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    pub fn subset(&self, idx: &[usize]) -> SnpList {
        SnpList {
            records: idx.iter().map(|&i| self.records[i].clone()).collect(),
        }
    }
}

/// Boolean filter aligned to the original SNP (or individual) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepMask {
    mask: Vec<bool>,
}

impl KeepMask {
    pub fn all(len: usize) -> Self {
        Self {
            mask: vec![true; len],
        }
    }

    pub fn from_indices(len: usize, idx: &[usize]) -> Self {
        let mut mask = vec![false; len];
        for &i in idx {
            mask[i] = true;
        }
        Self { mask }
    }

    pub fn from_bools(mask: Vec<bool>) -> Self {
        Self { mask }
    }

    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn kept(&self) -> usize {
        self.mask.iter().filter(|v| **v).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.mask
    }

    pub fn indices(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect()
    }

    /// Keeps a position only where both masks keep it.
    pub fn and(&self, other: &KeepMask) -> Result<KeepMask> {
        if self.len() != other.len() {
            return Err(LdscError::InvalidArgument(format!(
                "keep masks of different length ({} vs {})",
                self.len(),
                other.len()
            )));
        }
        Ok(KeepMask {
            mask: self
                .mask
                .iter()
                .zip(&other.mask)
                .map(|(a, b)| *a && *b)
                .collect(),
        })
    }
}

/// SNP × category matrix with one name per column.
#[derive(Debug, Clone)]
pub struct AnnotationMatrix {
    pub values: Array2<f64>,
    pub names: Vec<String>,
}

impl AnnotationMatrix {
    pub fn new(values: Array2<f64>, names: Vec<String>) -> Result<Self> {
        if values.ncols() != names.len() {
            return Err(LdscError::InvalidArgument(format!(
                "annotation matrix has {} columns but {} names",
                values.ncols(),
                names.len()
            )));
        }
        Ok(Self { values, names })
    }

    pub fn n_snps(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_annot(&self) -> usize {
        self.values.ncols()
    }

    pub fn select_rows(&self, idx: &[usize]) -> AnnotationMatrix {
        AnnotationMatrix {
            values: self.values.select(ndarray::Axis(0), idx),
            names: self.names.clone(),
        }
    }

    /// Per-column totals (the `.M` vector).
    pub fn column_sums(&self) -> Vec<f64> {
        self.values.sum_axis(ndarray::Axis(0)).to_vec()
    }

    /// Per-column totals over the rows where `keep` is set.
    pub fn column_sums_where(&self, keep: &[bool]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_annot()];
        for (row, flag) in self.values.rows().into_iter().zip(keep) {
            if *flag {
                for (acc, v) in out.iter_mut().zip(row.iter()) {
                    *acc += v;
                }
            }
        }
        out
    }

    /// Index of the first row summing to zero, if any.
    pub fn first_zero_row(&self) -> Option<usize> {
        self.values
            .rows()
            .into_iter()
            .position(|row| row.sum() == 0.0)
    }
}
