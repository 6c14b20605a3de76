mod common;

use std::path::Path;

use approx::assert_abs_diff_eq;
use ndarray::{Array2, array};
use polars::prelude::*;

use ldsc::error::LdscError;
use ldsc::regression::{
    Estimate, ReferenceLd, RegressionThresholds, check_conditioning, drop_zero_variance,
    filter_large_chisq, sumstats,
};
use ldsc::request::SumstatsFlags;

fn prefix(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

#[test]
fn zero_variance_column_drops_matching_m_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let snps: Vec<String> = (0..1000).map(|i| format!("rs{i}")).collect();
    let table: DataFrame = [
        Column::from(Series::new("SNP".into(), snps)),
        Column::from(Series::new("L2_a".into(), common::ld_values(1000))),
        Column::from(Series::new("L2_b".into(), vec![3.0; 1000])),
    ]
    .into_iter()
    .collect();

    let ref_ld = ReferenceLd::new(table, vec![600.0, 400.0]).expect("ref ld");
    let kept = drop_zero_variance(ref_ld, &mut log).expect("drop");
    assert_eq!(kept.names, vec!["L2_a".to_string()]);
    assert_eq!(kept.m, vec![600.0]);
    assert_eq!(kept.source_columns, vec![0]);
    assert_eq!(kept.table.width(), 2);
}

#[test]
fn m_length_must_match_reference_columns() {
    let table: DataFrame = [
        Column::from(Series::new("SNP".into(), vec!["rs1".to_string()])),
        Column::from(Series::new("L2".into(), vec![1.0])),
    ]
    .into_iter()
    .collect();
    assert!(ReferenceLd::new(table, vec![1.0, 2.0]).is_err());
}

#[test]
fn ill_conditioned_reference_ld_needs_override() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let ld: Array2<f64> = array![[1.0, 0.0], [0.0, 1.0 / 150_000.0], [0.0, 0.0]];
    let thresholds = RegressionThresholds::default();

    let err = check_conditioning(&ld, &thresholds, false, &mut log).expect_err("ill-conditioned");
    assert!(matches!(
        err.downcast_ref::<LdscError>(),
        Some(LdscError::IllConditioned(_))
    ));
    check_conditioning(&ld, &thresholds, true, &mut log).expect("override");

    let well: Array2<f64> = array![[2.0, 1.0], [1.0, 3.0]];
    check_conditioning(&well, &thresholds, false, &mut log).expect("well conditioned");
}

#[test]
fn chisq_cutoff_scales_with_sample_size() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let thresholds = RegressionThresholds::default();
    assert_eq!(thresholds.chisq_max(10_000.0, 80.0), 80.0);
    assert_eq!(thresholds.chisq_max(200_000.0, 80.0), 200.0);

    let df: DataFrame = [Column::from(Series::new(
        "SNP".into(),
        vec!["a".to_string(), "b".to_string(), "c".to_string()],
    ))]
    .into_iter()
    .collect();
    let chisq = vec![10.0, 90.0, 79.0];
    let n = vec![10_000.0; 3];
    let kept = filter_large_chisq(&df, &[(chisq, n)], 80.0, &thresholds, &mut log).expect("filter");
    assert_eq!(kept.height(), 2);

    let at_cutoff = vec![80.0, 1.0, 1.0];
    let kept = filter_large_chisq(&df, &[(at_cutoff, vec![10_000.0; 3])], 80.0, &thresholds, &mut log)
        .expect("filter");
    assert_eq!(kept.height(), 2);

    log.close().expect("close log");
    let transcript = std::fs::read_to_string(dir.path().join("test.log")).expect("read log");
    assert!(transcript.contains("chi^2 >= 80"));
}

fn h2_fixture(dir: &Path) -> SumstatsFlags {
    let ld = common::ld_values(1000);
    common::write_ldscore(&dir.join("ref"), &[("L2", ld.clone())]);
    common::write_m(&dir.join("ref"), &[1000.0]);
    common::write_ldscore(&dir.join("w"), &[("L2", ld.clone())]);
    common::write_chisq(&dir.join("trait"), &ld, 10_000.0, 0.5, 1000.0);

    let mut flags = SumstatsFlags::new(prefix(dir, "out"));
    flags.h2 = Some(prefix(dir, "trait"));
    flags.ref_ld = Some(prefix(dir, "ref"));
    flags.w_ld = Some(prefix(dir, "w"));
    flags.num_blocks = 20;
    flags
}

#[test]
fn heritability_recovers_exact_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let config = h2_fixture(dir.path()).validate().expect("valid");

    let outcome = sumstats(&config, &mut log).expect("regression");
    assert_eq!(outcome.n_snps, 1000);
    assert_eq!(outcome.n_blocks, 20);
    match outcome.estimate {
        Estimate::Heritability(hsq) => {
            assert_abs_diff_eq!(hsq.fit.tot, 0.5, epsilon = 1e-6);
            assert_abs_diff_eq!(hsq.fit.intercept, 1.0, epsilon = 1e-6);
            assert_abs_diff_eq!(hsq.mean_chisq, 1.0 + 5.0 * 5.05, epsilon = 1e-9);
        }
        other => panic!("unexpected estimate {other:?}"),
    }
}

#[test]
fn constrained_intercept_is_reported_fixed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let mut flags = h2_fixture(dir.path());
    flags.no_intercept = true;
    flags.print_delete_vals = true;
    let config = flags.validate().expect("valid");

    let outcome = sumstats(&config, &mut log).expect("regression");
    match outcome.estimate {
        Estimate::Heritability(hsq) => {
            assert_eq!(hsq.fit.constrain_intercept, Some(1.0));
            assert_abs_diff_eq!(hsq.fit.tot, 0.5, epsilon = 1e-6);
        }
        other => panic!("unexpected estimate {other:?}"),
    }
    assert!(dir.path().join("out.delete_k").exists());
    assert!(!dir.path().join("out.hsq.cov").exists());
}

#[test]
fn partitioned_heritability_drops_constant_annotation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let ld = common::ld_values(1000);
    common::write_ldscore(
        &dir.path().join("ref"),
        &[("L2_a", ld.clone()), ("L2_b", vec![2.0; 1000])],
    );
    common::write_m(&dir.path().join("ref"), &[600.0, 400.0]);
    common::write_ldscore(&dir.path().join("w"), &[("L2", ld.clone())]);
    common::write_chisq(&dir.path().join("trait"), &ld, 10_000.0, 0.5, 600.0);

    let mut flags = SumstatsFlags::new(prefix(dir.path(), "out"));
    flags.h2 = Some(prefix(dir.path(), "trait"));
    flags.ref_ld = Some(prefix(dir.path(), "ref"));
    flags.w_ld = Some(prefix(dir.path(), "w"));
    flags.num_blocks = 20;
    let outcome = sumstats(&flags.validate().expect("valid"), &mut log).expect("regression");

    assert_eq!(outcome.m, vec![600.0]);
    assert_eq!(outcome.names, vec!["L2_a".to_string()]);
    match outcome.estimate {
        Estimate::Heritability(hsq) => assert_abs_diff_eq!(hsq.fit.tot, 0.5, epsilon = 1e-6),
        other => panic!("unexpected estimate {other:?}"),
    }
}

#[test]
fn too_few_merged_snps_names_the_stage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let flags = h2_fixture(dir.path());
    common::write_ldscore(&dir.path().join("w"), &[("L2", vec![1.0])]);

    let err = sumstats(&flags.validate().expect("valid"), &mut log).expect_err("one SNP");
    match err.downcast_ref::<LdscError>() {
        Some(LdscError::EmptyStage { stage, .. }) => {
            assert!(stage.contains("regression SNP LD"))
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn intercept_mode_reports_the_intercept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let mut flags = h2_fixture(dir.path());
    flags.intercept = flags.h2.take();

    let outcome = sumstats(&flags.validate().expect("valid"), &mut log).expect("regression");
    match outcome.estimate {
        Estimate::Intercept(hsq) => assert_abs_diff_eq!(hsq.fit.intercept, 1.0, epsilon = 1e-6),
        other => panic!("unexpected estimate {other:?}"),
    }
}

#[test]
fn genetic_correlation_of_identical_traits_is_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let ld = common::ld_values(1000);
    common::write_ldscore(&dir.path().join("ref"), &[("L2", ld.clone())]);
    common::write_m(&dir.path().join("ref"), &[1000.0]);
    common::write_ldscore(&dir.path().join("w"), &[("L2", ld.clone())]);
    for name in ["t1", "t2"] {
        common::write_chisq(&dir.path().join(name), &ld, 10_000.0, 0.5, 1000.0);
        common::write_allele(&dir.path().join(name), 1000, "A");
    }

    let mut flags = SumstatsFlags::new(prefix(dir.path(), "out"));
    flags.rg = Some(vec![prefix(dir.path(), "t1"), prefix(dir.path(), "t2")]);
    flags.ref_ld = Some(prefix(dir.path(), "ref"));
    flags.w_ld = Some(prefix(dir.path(), "w"));
    flags.num_blocks = 20;
    flags.print_delete_vals = true;

    let outcome = sumstats(&flags.validate().expect("valid"), &mut log).expect("regression");
    match outcome.estimate {
        Estimate::GeneticCorrelation(gencor) => {
            assert_abs_diff_eq!(gencor.hsq1.fit.tot, 0.5, epsilon = 1e-6);
            assert_abs_diff_eq!(gencor.gencov.fit.tot, 0.5, epsilon = 1e-6);
            assert_abs_diff_eq!(gencor.rg.expect("rg defined"), 1.0, epsilon = 1e-6);
        }
        other => panic!("unexpected estimate {other:?}"),
    }
    for file in ["out.hsq1.delete_k", "out.hsq2.delete_k", "out.gencov.delete_k"] {
        assert!(dir.path().join(file).exists(), "{file} missing");
    }
}

#[test]
fn flipped_increasing_allele_negates_the_correlation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let ld = common::ld_values(1000);
    common::write_ldscore(&dir.path().join("ref"), &[("L2", ld.clone())]);
    common::write_m(&dir.path().join("ref"), &[1000.0]);
    common::write_ldscore(&dir.path().join("w"), &[("L2", ld.clone())]);
    for (name, allele) in [("t1", "A"), ("t2", "g")] {
        common::write_chisq(&dir.path().join(name), &ld, 10_000.0, 0.5, 1000.0);
        common::write_allele(&dir.path().join(name), 1000, allele);
    }

    let mut flags = SumstatsFlags::new(prefix(dir.path(), "out"));
    flags.rg = Some(vec![prefix(dir.path(), "t1"), prefix(dir.path(), "t2")]);
    flags.ref_ld = Some(prefix(dir.path(), "ref"));
    flags.w_ld = Some(prefix(dir.path(), "w"));
    flags.num_blocks = 20;
    flags.no_intercept = true;

    let outcome = sumstats(&flags.validate().expect("valid"), &mut log).expect("regression");
    match outcome.estimate {
        Estimate::GeneticCorrelation(gencor) => {
            assert_eq!(gencor.gencov.fit.constrain_intercept, Some(0.0));
            assert!(gencor.rg.expect("rg defined") < 0.0);
        }
        other => panic!("unexpected estimate {other:?}"),
    }
}

/// Second LD Score column, not collinear with `common::ld_values`.
fn second_ld(n: usize) -> Vec<f64> {
    (0..n).map(|i| 1.0 + 0.5 * (i % 7) as f64).collect()
}

fn partitioned_fixture(dir: &Path) -> SumstatsFlags {
    let ld = common::ld_values(1000);
    common::write_ldscore(
        &dir.join("ref"),
        &[("L2_a", ld.clone()), ("L2_b", second_ld(1000))],
    );
    common::write_m(&dir.join("ref"), &[600.0, 400.0]);
    common::write_ldscore(&dir.join("w"), &[("L2", ld.clone())]);
    common::write_chisq(&dir.join("trait"), &ld, 10_000.0, 0.5, 600.0);

    let mut flags = SumstatsFlags::new(prefix(dir, "out"));
    flags.h2 = Some(prefix(dir, "trait"));
    flags.ref_ld = Some(prefix(dir, "ref"));
    flags.w_ld = Some(prefix(dir, "w"));
    flags.num_blocks = 20;
    flags
}

#[test]
fn aggregate_heritability_sums_over_category_members() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let overlay = dir.path().join("overlay.annot");
    let first: Vec<f64> = (0..1000).map(|i| if i < 600 { 1.0 } else { 0.0 }).collect();
    let rest: Vec<f64> = first.iter().map(|v| 1.0 - v).collect();
    common::write_annot(&overlay, &[("A", first), ("B", rest)]);

    let mut flags = partitioned_fixture(dir.path());
    flags.aggregate = true;
    flags.annot = Some(overlay);
    let outcome = sumstats(&flags.validate().expect("valid"), &mut log).expect("regression");

    match outcome.estimate {
        Estimate::Aggregate(agg) => {
            assert_eq!(agg.overlap, array![[600.0, 0.0], [0.0, 400.0]]);
            assert_abs_diff_eq!(agg.cat[0], 0.5, epsilon = 1e-6);
            assert_abs_diff_eq!(agg.cat[1], 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(agg.hsq.fit.tot, 0.5, epsilon = 1e-6);
        }
        other => panic!("unexpected estimate {other:?}"),
    }
    assert!(dir.path().join("out.hsq.cov").exists());
}

#[test]
fn aggregate_overlay_must_match_reference_columns() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let overlay = dir.path().join("overlay.annot");
    common::write_annot(&overlay, &[("A", vec![1.0; 1000])]);

    let mut flags = partitioned_fixture(dir.path());
    flags.aggregate = true;
    flags.annot = Some(overlay);
    let err = sumstats(&flags.validate().expect("valid"), &mut log).expect_err("one column");
    assert!(matches!(
        err.downcast_ref::<LdscError>(),
        Some(LdscError::InvalidArgument(_))
    ));
}

#[test]
fn aggregate_overlay_follows_dropped_reference_columns() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let ld = common::ld_values(1000);
    common::write_ldscore(
        &dir.path().join("ref"),
        &[("L2_a", ld.clone()), ("L2_b", vec![2.0; 1000])],
    );
    common::write_m(&dir.path().join("ref"), &[600.0, 400.0]);
    common::write_ldscore(&dir.path().join("w"), &[("L2", ld.clone())]);
    common::write_chisq(&dir.path().join("trait"), &ld, 10_000.0, 0.5, 600.0);
    let overlay = dir.path().join("overlay.annot");
    let first: Vec<f64> = (0..1000).map(|i| if i < 600 { 1.0 } else { 0.0 }).collect();
    common::write_annot(&overlay, &[("A", first), ("B", vec![1.0; 1000])]);

    let mut flags = SumstatsFlags::new(prefix(dir.path(), "out"));
    flags.h2 = Some(prefix(dir.path(), "trait"));
    flags.ref_ld = Some(prefix(dir.path(), "ref"));
    flags.w_ld = Some(prefix(dir.path(), "w"));
    flags.num_blocks = 20;
    flags.aggregate = true;
    flags.annot = Some(overlay);
    let outcome = sumstats(&flags.validate().expect("valid"), &mut log).expect("regression");

    match outcome.estimate {
        Estimate::Aggregate(agg) => assert_eq!(agg.overlap, array![[600.0]]),
        other => panic!("unexpected estimate {other:?}"),
    }
}

#[test]
fn keep_ld_selects_reference_columns_and_m() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let mut flags = partitioned_fixture(dir.path());
    flags.keep_ld = Some("0".to_string());

    let outcome = sumstats(&flags.validate().expect("valid"), &mut log).expect("regression");
    assert_eq!(outcome.names, vec!["L2_a".to_string()]);
    assert_eq!(outcome.m, vec![600.0]);
    match outcome.estimate {
        Estimate::Heritability(hsq) => assert_abs_diff_eq!(hsq.fit.tot, 0.5, epsilon = 1e-6),
        other => panic!("unexpected estimate {other:?}"),
    }

    flags.keep_ld = Some("2".to_string());
    assert!(sumstats(&flags.validate().expect("valid"), &mut log).is_err());
}

fn rg_info_fixture(dir: &Path, info2: &[f64]) -> SumstatsFlags {
    let ld = common::ld_values(1000);
    common::write_ldscore(&dir.join("ref"), &[("L2", ld.clone())]);
    common::write_m(&dir.join("ref"), &[1000.0]);
    common::write_ldscore(&dir.join("w"), &[("L2", ld.clone())]);
    common::write_chisq_info(&dir.join("t1"), &ld, 10_000.0, 0.5, 1000.0, &[0.95; 1000]);
    common::write_chisq_info(&dir.join("t2"), &ld, 10_000.0, 0.5, 1000.0, info2);
    for name in ["t1", "t2"] {
        common::write_allele(&dir.join(name), 1000, "A");
    }

    let mut flags = SumstatsFlags::new(prefix(dir, "out"));
    flags.rg = Some(vec![prefix(dir, "t1"), prefix(dir, "t2")]);
    flags.ref_ld = Some(prefix(dir, "ref"));
    flags.w_ld = Some(prefix(dir, "w"));
    flags.num_blocks = 20;
    flags.info_min = Some(0.9);
    flags
}

#[test]
fn genetic_correlation_filters_each_phenotype_on_info() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let info2: Vec<f64> = (0..1000).map(|i| if i % 2 == 0 { 0.95 } else { 0.5 }).collect();
    let flags = rg_info_fixture(dir.path(), &info2);

    let outcome = sumstats(&flags.validate().expect("valid"), &mut log).expect("regression");
    assert_eq!(outcome.n_snps, 500);
    match outcome.estimate {
        Estimate::GeneticCorrelation(gencor) => {
            assert_abs_diff_eq!(gencor.rg.expect("rg defined"), 1.0, epsilon = 1e-6)
        }
        other => panic!("unexpected estimate {other:?}"),
    }
}

#[test]
fn genetic_correlation_fails_when_second_info_filter_empties() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = common::open_log(dir.path());
    let flags = rg_info_fixture(dir.path(), &[0.5; 1000]);

    let err = sumstats(&flags.validate().expect("valid"), &mut log).expect_err("empty");
    match err.downcast_ref::<LdscError>() {
        Some(LdscError::EmptyStage { stage, .. }) => assert!(stage.contains("INFO2")),
        other => panic!("unexpected error {other:?}"),
    }
}
