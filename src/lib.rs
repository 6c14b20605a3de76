//! LD Score estimation and LD Score regression.
//!
//! `ldscore` computes annotation-stratified LD Scores from a PLINK reference
//! panel; `regression` fits heritability, partitioned heritability and genetic
//! correlation from GWAS summary statistics against those scores.

pub mod error;
pub mod logging;
pub mod types;

pub mod filter;
pub mod io;
pub mod matrix;
pub mod parse;
pub mod qc;

pub mod binning;
pub mod genotype;
pub mod jackknife;
pub mod kernel;
pub mod ldscore;
pub mod regression;
pub mod request;
