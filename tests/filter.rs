mod common;

use ldsc::error::LdscError;
use ldsc::filter::{Bound, filter_by_ids, filter_rows, merge_id_list, merge_on_snp};
use ldsc::io::{extract_f64_column, extract_string_column};
use ldsc::request::RegressionRequest;
use polars::prelude::*;

fn frame(snps: &[&str], values: &[f64], value_name: &str) -> DataFrame {
    let snps: Vec<String> = snps.iter().map(|s| s.to_string()).collect();
    [
        Column::from(Series::new("SNP".into(), snps)),
        Column::from(Series::new(value_name.into(), values.to_vec())),
    ]
    .into_iter()
    .collect()
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn id_list_merge_keeps_left_order() {
    let left = ids(&["rs3", "rs1", "rs2", "rs9"]);
    let keep = ids(&["rs2", "rs3", "rs7"]);
    assert_eq!(merge_id_list(&left, &keep), vec![0, 2]);
}

#[test]
fn row_filters_are_strict_and_drop_missing() {
    let df = frame(&["a", "b", "c", "d"], &[0.5, 0.9, f64::NAN, 0.95], "INFO");
    let kept = filter_rows(&df, "INFO", Bound::Above(0.9)).expect("filter");
    assert_eq!(extract_string_column(&kept, "SNP").expect("snp"), ids(&["d"]));

    let kept = filter_rows(&df, "INFO", Bound::Below(0.9)).expect("filter");
    assert_eq!(extract_string_column(&kept, "SNP").expect("snp"), ids(&["a"]));
    assert_eq!(df.height(), 4);
}

#[test]
fn filtering_on_an_absent_column_fails() {
    let df = frame(&["a"], &[1.0], "INFO");
    let err = filter_rows(&df, "MAF", Bound::Above(0.01)).expect_err("no MAF");
    assert!(matches!(
        err.downcast_ref::<LdscError>(),
        Some(LdscError::MissingColumn(_))
    ));
}

#[test]
fn id_filter_keeps_listed_rows() {
    let df = frame(&["a", "b", "c"], &[1.0, 2.0, 3.0], "L2");
    let kept = filter_by_ids(&df, "SNP", &ids(&["c", "a", "z"])).expect("filter");
    assert_eq!(extract_f64_column(&kept, "L2").expect("l2"), vec![1.0, 3.0]);
}

#[test]
fn merge_preserves_summary_statistic_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let left = frame(&["rs5", "rs1", "rs3"], &[5.0, 1.0, 3.0], "CHISQ");
    let right = frame(&["rs1", "rs3", "rs5"], &[10.0, 30.0, 50.0], "L2");
    let merged = merge_on_snp(&left, &right, "reference panel LD", 1, &mut log).expect("merge");
    assert_eq!(
        extract_string_column(&merged, "SNP").expect("snp"),
        ids(&["rs5", "rs1", "rs3"])
    );
    assert_eq!(
        extract_f64_column(&merged, "L2").expect("l2"),
        vec![50.0, 10.0, 30.0]
    );
}

#[test]
fn single_surviving_snp_is_enough_only_for_the_intercept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let sumstats = frame(&["rs1", "rs2", "rs3"], &[1.2, 3.4, 0.8], "CHISQ");
    let ref_ld = frame(&["rs2"], &[12.0], "L2");

    let intercept = RegressionRequest::Intercept {
        prefix: "p".to_string(),
    };
    let merged = merge_on_snp(
        &sumstats,
        &ref_ld,
        "reference panel LD",
        intercept.min_rows(),
        &mut log,
    )
    .expect("intercept merge");
    assert_eq!(merged.height(), 1);

    let rg = RegressionRequest::GeneticCorrelation {
        prefix1: "p1".to_string(),
        prefix2: "p2".to_string(),
        intercepts: [None; 3],
        overlap: 0.0,
        rho: 0.0,
    };
    let err = merge_on_snp(&sumstats, &ref_ld, "reference panel LD", rg.min_rows(), &mut log)
        .expect_err("too few rows");
    match err.downcast_ref::<LdscError>() {
        Some(LdscError::EmptyStage { stage, .. }) => assert!(stage.contains("reference panel LD")),
        other => panic!("unexpected error {other:?}"),
    }
}
